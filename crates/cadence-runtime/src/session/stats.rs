//! Lock-free session counters and the activity clock.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::ports::policy::PolicyKind;

/// Core counters reported in every status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Successful policy calls.
    pub inference_count: u64,
    /// Commands published to the joint-output room.
    pub commands_sent: u64,
    /// Steps currently queued.
    pub actions_in_queue: usize,
    /// Failed policy calls, failed publishes, and rejected frames.
    pub errors: u64,
    /// Frames accepted into the cache.
    pub images_received: u64,
    /// Joint readings accepted into the cache.
    pub joints_received: u64,
}

/// Inference diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InferenceStats {
    /// Policy family.
    pub policy_type: PolicyKind,
    /// Ticks skipped because the snapshot was incomplete.
    pub skipped_ticks: u64,
    /// Ticks suppressed because a call was still in flight.
    pub suppressed_ticks: u64,
    /// Control ticks that found the queue empty.
    pub control_underruns: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Latency of the last successful call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_inference_ms: Option<u64>,
    /// Calls abandoned at the predict timeout.
    pub timeouts: u64,
    /// Chunks pushed into the queue.
    pub chunks_received: u64,
    /// Policy-provided model description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_info: Option<serde_json::Value>,
}

const NO_LATENCY: u64 = u64::MAX;

/// Counters shared by the loops, transport handlers, and status readers.
pub struct StatsCounters {
    inference_count: AtomicU64,
    commands_sent: AtomicU64,
    errors: AtomicU64,
    images_received: AtomicU64,
    joints_received: AtomicU64,
    skipped_ticks: AtomicU64,
    suppressed_ticks: AtomicU64,
    underruns: AtomicU64,
    consecutive_failures: AtomicU32,
    timeouts: AtomicU64,
    chunks_received: AtomicU64,
    last_latency_ms: AtomicU64,
}

impl StatsCounters {
    /// All counters at zero.
    pub fn new() -> Self {
        Self {
            inference_count: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            images_received: AtomicU64::new(0),
            joints_received: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            suppressed_ticks: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            timeouts: AtomicU64::new(0),
            chunks_received: AtomicU64::new(0),
            last_latency_ms: AtomicU64::new(NO_LATENCY),
        }
    }

    /// A policy call succeeded and its chunk was queued.
    pub fn record_inference(&self, latency: Duration) {
        let _ = self.inference_count.fetch_add(1, Ordering::Relaxed);
        let _ = self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let ms = u64::try_from(latency.as_millis()).unwrap_or(NO_LATENCY - 1);
        self.last_latency_ms.store(ms, Ordering::Relaxed);
    }

    /// A policy call failed. Returns the consecutive failure count.
    pub fn record_inference_failure(&self, timed_out: bool) -> u32 {
        let _ = self.errors.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            let _ = self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The snapshot was incomplete.
    pub fn record_skip(&self) {
        let _ = self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// A tick fired while a call was in flight.
    pub fn record_suppressed(&self) {
        let _ = self.suppressed_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// A command was published.
    pub fn record_command(&self) {
        let _ = self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// The control loop found nothing to send.
    pub fn record_underrun(&self) {
        let _ = self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    /// A publish failed or a frame was rejected.
    pub fn record_error(&self) {
        let _ = self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame was accepted.
    pub fn record_image(&self) {
        let _ = self.images_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A joint reading was accepted.
    pub fn record_joints(&self) {
        let _ = self.joints_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Underruns so far.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Skipped ticks so far.
    pub fn skipped(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Core counters with the current queue length filled in.
    pub fn snapshot(&self, actions_in_queue: usize) -> SessionStats {
        SessionStats {
            inference_count: self.inference_count.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            actions_in_queue,
            errors: self.errors.load(Ordering::Relaxed),
            images_received: self.images_received.load(Ordering::Relaxed),
            joints_received: self.joints_received.load(Ordering::Relaxed),
        }
    }

    /// Inference diagnostics.
    pub fn inference_snapshot(
        &self,
        policy_type: PolicyKind,
        model_info: Option<serde_json::Value>,
    ) -> InferenceStats {
        let latency = self.last_latency_ms.load(Ordering::Relaxed);
        InferenceStats {
            policy_type,
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            suppressed_ticks: self.suppressed_ticks.load(Ordering::Relaxed),
            control_underruns: self.underruns.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_inference_ms: (latency != NO_LATENCY).then_some(latency),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            chunks_received: self.chunks_received.load(Ordering::Relaxed),
            model_info,
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.inference_count,
            &self.commands_sent,
            &self.errors,
            &self.images_received,
            &self.joints_received,
            &self.skipped_ticks,
            &self.suppressed_ticks,
            &self.underruns,
            &self.timeouts,
            &self.chunks_received,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_latency_ms.store(NO_LATENCY, Ordering::Relaxed);
    }
}

impl Default for StatsCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Last time the session did something useful.
///
/// Lifecycle operations, accepted inputs, successful inference, and sent
/// commands count as activity. Underruns and skipped ticks do not.
pub struct Activity {
    last: Mutex<Instant>,
}

impl Activity {
    /// Clock starting now.
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    /// Record activity now.
    pub fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    /// Time since the last activity, measured at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last.lock())
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_reset_on_success() {
        let stats = StatsCounters::new();
        assert_eq!(stats.record_inference_failure(false), 1);
        assert_eq!(stats.record_inference_failure(true), 2);
        stats.record_inference(Duration::from_millis(40));
        assert_eq!(stats.record_inference_failure(false), 1);

        let snap = stats.snapshot(0);
        assert_eq!(snap.inference_count, 1);
        assert_eq!(snap.errors, 3);

        let inf = stats.inference_snapshot(PolicyKind::Act, None);
        assert_eq!(inf.timeouts, 1);
        assert_eq!(inf.consecutive_failures, 1);
        assert_eq!(inf.last_inference_ms, Some(40));
        assert_eq!(inf.chunks_received, 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let stats = StatsCounters::new();
        stats.record_inference(Duration::from_millis(5));
        stats.record_command();
        stats.record_underrun();
        stats.record_image();
        stats.record_joints();
        stats.record_skip();
        stats.record_suppressed();
        stats.reset();

        assert_eq!(stats.snapshot(0), SessionStats::default());
        let inf = stats.inference_snapshot(PolicyKind::Pi0, None);
        assert_eq!(inf.last_inference_ms, None);
        assert_eq!(inf.control_underruns, 0);
        assert_eq!(inf.skipped_ticks, 0);
        assert_eq!(inf.suppressed_ticks, 0);
    }

    #[test]
    fn stats_serialize_snake_case() {
        let json = serde_json::to_value(SessionStats::default()).unwrap();
        for key in [
            "inference_count",
            "commands_sent",
            "actions_in_queue",
            "errors",
            "images_received",
            "joints_received",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn activity_tracks_idle_time() {
        let activity = Activity::new();
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(activity.idle_for(Instant::now()), Duration::from_secs(30));
        activity.touch();
        assert_eq!(activity.idle_for(Instant::now()), Duration::ZERO);
    }
}
