//! Loop cadence, queue, and timeout settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fastest loop cadence accepted (1 ms period).
pub const MAX_LOOP_HZ: f64 = 1_000.0;
/// Slowest loop cadence accepted (100 s period).
pub const MIN_LOOP_HZ: f64 = 0.01;

/// Cadence of the two per-session loops and the action queue policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopSettings {
    /// Control loop frequency (commands per second).
    pub control_frequency_hz: f64,
    /// Inference loop frequency (policy calls per second, upper bound).
    pub inference_frequency_hz: f64,
    /// Steps taken from the front of each predicted chunk.
    pub n_action_steps: usize,
    /// Append-with-cap bound: steps kept before a new chunk is appended.
    pub queue_cap: usize,
    /// Hard ceiling on queue length.
    pub max_queue_len: usize,
    /// Consecutive inference failures before the session enters `Error`.
    pub max_consecutive_failures: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            control_frequency_hz: 20.0,
            inference_frequency_hz: 2.0,
            n_action_steps: 10,
            queue_cap: 10,
            max_queue_len: 100,
            max_consecutive_failures: 5,
        }
    }
}

impl LoopSettings {
    /// Control tick period.
    ///
    /// Always within `[1ms, 100s]`, even for settings that skipped
    /// validation.
    pub fn control_period(&self) -> Duration {
        period_for(self.control_frequency_hz, Self::default().control_frequency_hz)
    }

    /// Inference tick period. Bounded like [`control_period`](Self::control_period).
    pub fn inference_period(&self) -> Duration {
        period_for(self.inference_frequency_hz, Self::default().inference_frequency_hz)
    }
}

/// Clamp `hz` into the accepted cadence range.
///
/// Non-finite and non-positive values fall back to `fallback`.
pub fn clamp_hz(hz: f64, fallback: f64) -> f64 {
    if hz.is_finite() && hz > 0.0 {
        hz.clamp(MIN_LOOP_HZ, MAX_LOOP_HZ)
    } else {
        fallback
    }
}

fn period_for(hz: f64, fallback: f64) -> Duration {
    let min = Duration::from_secs_f64(1.0 / MAX_LOOP_HZ);
    Duration::try_from_secs_f64(1.0 / clamp_hz(hz, fallback)).map_or(min, |p| p.max(min))
}

/// Core-enforced bounds on every external call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutSettings {
    /// Upper bound on one policy call.
    pub predict_timeout_ms: u64,
    /// Upper bound on room creation, subscription, and workspace teardown.
    pub transport_timeout_ms: u64,
    /// Upper bound on one command publish.
    pub publish_timeout_ms: u64,
    /// Grace period for loops to exit after cancellation.
    pub stop_grace_ms: u64,
    /// Upper bound on loading a policy during session creation.
    pub policy_load_timeout_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            predict_timeout_ms: 5_000,
            transport_timeout_ms: 3_000,
            publish_timeout_ms: 200,
            stop_grace_ms: 2_000,
            policy_load_timeout_ms: 30_000,
        }
    }
}

impl TimeoutSettings {
    /// Policy call bound.
    pub fn predict_timeout(&self) -> Duration {
        Duration::from_millis(self.predict_timeout_ms)
    }

    /// Transport setup bound.
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }

    /// Publish bound.
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Stop grace period.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Policy load bound.
    pub fn policy_load_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_load_timeout_ms)
    }
}
