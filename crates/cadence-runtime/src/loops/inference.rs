//! Inference loop: slow cadence, at most one policy call in flight.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::{ActionChunk, PolicyError};
use metrics::{counter, histogram};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::loops::{ErrorSink, LoopExit};
use crate::metrics::{INFERENCE_DURATION_SECONDS, INFERENCE_ERRORS_TOTAL, INFERENCE_TOTAL};
use crate::ports::policy::{PolicyKind, PolicyPort};
use crate::session::action_queue::ActionQueue;
use crate::session::frame_cache::{FrameSnapshot, JointFrameCache, SnapshotResult};
use crate::session::stats::{Activity, StatsCounters};

enum PredictOutcome {
    Chunk(ActionChunk, Duration),
    Failed(PolicyError),
    TimedOut,
}

/// Everything the inference loop reads and writes.
pub struct InferenceLoop {
    /// Owning session, for logs.
    pub session_id: String,
    /// Model to call.
    pub policy: Arc<dyn PolicyPort>,
    /// Policy family, for metric labels.
    pub policy_type: PolicyKind,
    /// Instruction passed through to the policy, already capability-filtered.
    pub instruction: Option<String>,
    /// Input source.
    pub cache: Arc<JointFrameCache>,
    /// Output sink.
    pub queue: Arc<ActionQueue>,
    /// Shared counters.
    pub stats: Arc<StatsCounters>,
    /// Idle tracking.
    pub activity: Arc<Activity>,
    /// Where failures below the threshold are reported.
    pub errors: Arc<dyn ErrorSink>,
    /// Tick period.
    pub period: Duration,
    /// Bound on one policy call.
    pub predict_timeout: Duration,
    /// Steps kept from the front of each chunk.
    pub n_action_steps: usize,
    /// Failures in a row before giving up.
    pub max_consecutive_failures: u32,
}

impl InferenceLoop {
    /// Run until cancelled or until failures reach the threshold.
    ///
    /// The first tick fires immediately. A tick that finds a call still in
    /// flight is suppressed, never queued.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn run(self, cancel: CancellationToken) -> LoopExit {
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: JoinSet<PredictOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    in_flight.abort_all();
                    debug!("inference loop cancelled");
                    return LoopExit::Cancelled;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    let outcome = joined.unwrap_or_else(|e| {
                        PredictOutcome::Failed(PolicyError::Inference(format!("policy task failed: {e}")))
                    });
                    if let Some(exit) = self.complete(outcome) {
                        return exit;
                    }
                }
                _ = ticker.tick() => {
                    if !in_flight.is_empty() {
                        self.stats.record_suppressed();
                        trace!("tick suppressed, call in flight");
                        continue;
                    }
                    match self.cache.snapshot() {
                        SnapshotResult::Ready(snapshot) => {
                            let _ = in_flight.spawn(self.predict(snapshot));
                        }
                        SnapshotResult::Incomplete { missing_cameras, missing_joints } => {
                            self.stats.record_skip();
                            trace!(?missing_cameras, missing_joints, "snapshot incomplete, tick skipped");
                        }
                    }
                }
            }
        }
    }

    fn predict(
        &self,
        snapshot: FrameSnapshot,
    ) -> impl std::future::Future<Output = PredictOutcome> + Send + 'static {
        let policy = Arc::clone(&self.policy);
        let instruction = self.instruction.clone();
        let bound = self.predict_timeout;
        async move {
            let started = Instant::now();
            let call = policy.predict(snapshot.images, snapshot.joint_state, instruction);
            match time::timeout(bound, call).await {
                Ok(Ok(chunk)) => PredictOutcome::Chunk(chunk, started.elapsed()),
                Ok(Err(e)) => PredictOutcome::Failed(e),
                Err(_) => PredictOutcome::TimedOut,
            }
        }
    }

    /// Apply a finished call. Returns an exit when the failure threshold is hit.
    fn complete(&self, outcome: PredictOutcome) -> Option<LoopExit> {
        let kind = self.policy_type.as_str();
        let (reason, message) = match outcome {
            PredictOutcome::Chunk(mut chunk, latency) => {
                let received = chunk.len();
                chunk.truncate(self.n_action_steps);
                let pushed = self.queue.push_chunk(chunk.into_steps(), received);
                self.stats.record_inference(latency);
                self.activity.touch();
                counter!(INFERENCE_TOTAL, "policy_type" => kind).increment(1);
                histogram!(INFERENCE_DURATION_SECONDS, "policy_type" => kind)
                    .record(latency.as_secs_f64());
                debug!(
                    received,
                    queued = pushed.appended,
                    trimmed = pushed.trimmed,
                    queue_len = pushed.len,
                    latency_ms = latency.as_millis() as u64,
                    "chunk queued"
                );
                return None;
            }
            PredictOutcome::Failed(e) => ("error", e.to_string()),
            PredictOutcome::TimedOut => (
                "timeout",
                format!("policy call timed out after {}ms", self.predict_timeout.as_millis()),
            ),
        };

        let failures = self.stats.record_inference_failure(reason == "timeout");
        counter!(INFERENCE_ERRORS_TOTAL, "policy_type" => kind, "reason" => reason).increment(1);
        if failures >= self.max_consecutive_failures {
            error!(failures, error = %message, "inference failure threshold reached");
            return Some(LoopExit::Failed {
                failures,
                last_error: message,
            });
        }
        warn!(failures, error = %message, "inference failed");
        self.errors.report(message);
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use cadence_core::{ImageFrame, JointValue, SO100_TABLE};
    use chrono::Utc;

    use super::*;
    use crate::loops::test_support::ErrorLog;
    use crate::ports::policy::MockPolicyPort;

    fn chunk(len: usize) -> ActionChunk {
        let rows: Vec<Vec<f32>> = (0..len).map(|i| vec![i as f32; 6]).collect();
        ActionChunk::from_rows(&SO100_TABLE, &rows)
    }

    fn cache(cameras: &[&str]) -> Arc<JointFrameCache> {
        Arc::new(JointFrameCache::new(
            cameras.iter().map(|c| (*c).to_owned()).collect(),
            &SO100_TABLE,
        ))
    }

    fn fill(cache: &JointFrameCache, cameras: &[&str]) {
        for cam in cameras {
            cache
                .update_image(cam, ImageFrame::rgb24(1, 1, vec![0u8; 3]), Utc::now())
                .unwrap();
        }
        let _ = cache.update_joints(
            &[JointValue {
                name: "gripper".into(),
                value: 50.0,
            }],
            Utc::now(),
        );
    }

    fn make_loop(policy: Arc<dyn PolicyPort>, cache: Arc<JointFrameCache>) -> InferenceLoop {
        InferenceLoop {
            session_id: "s1".into(),
            policy,
            policy_type: PolicyKind::Act,
            instruction: None,
            cache,
            queue: Arc::new(ActionQueue::new(10, 100)),
            stats: Arc::new(StatsCounters::new()),
            activity: Arc::new(Activity::new()),
            errors: Arc::new(ErrorLog::default()),
            period: Duration::from_millis(500),
            predict_timeout: Duration::from_secs(5),
            n_action_steps: 10,
            max_consecutive_failures: 5,
        }
    }

    /// Sleeps for `delay` per call and tracks concurrency.
    struct SlowPolicy {
        delay: Duration,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl SlowPolicy {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PolicyPort for SlowPolicy {
        async fn predict(
            &self,
            _images: HashMap<String, ImageFrame>,
            _joint_state: Vec<f32>,
            _instruction: Option<String>,
        ) -> Result<ActionChunk, PolicyError> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.max_active.fetch_max(now, Ordering::SeqCst);
            time::sleep(self.delay).await;
            let _ = self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(chunk(3))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn incomplete_snapshot_skips_without_calling_policy() {
        let mut mock = MockPolicyPort::new();
        let _ = mock.expect_predict().never();
        let cache = cache(&["front", "wrist", "top"]);
        fill(&cache, &["front", "wrist"]);

        let lp = make_loop(Arc::new(mock), cache);
        let stats = Arc::clone(&lp.stats);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(lp.run(cancel.clone()));

        time::sleep(Duration::from_millis(1_200)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), LoopExit::Cancelled);
        assert_eq!(stats.skipped(), 3);
        assert_eq!(stats.snapshot(0).inference_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_call_queues_first_n_steps() {
        let mut mock = MockPolicyPort::new();
        let _ = mock
            .expect_predict()
            .times(1)
            .withf(|images, joints, instruction| {
                images.len() == 2 && joints[5] == 50.0 && instruction.is_none()
            })
            .returning(|_, _, _| Ok(chunk(15)));
        let cache = cache(&["front", "wrist"]);
        fill(&cache, &["front", "wrist"]);

        let lp = make_loop(Arc::new(mock), cache);
        let (stats, queue) = (Arc::clone(&lp.stats), Arc::clone(&lp.queue));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(lp.run(cancel.clone()));

        time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let _ = handle.await.unwrap();

        assert_eq!(stats.snapshot(queue.len()).inference_count, 1);
        assert_eq!(queue.len(), 10);
        let record = &queue.recent_chunks()[0];
        assert_eq!(record.steps_received, 15);
        assert_eq!(record.steps_queued, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_failures_end_the_loop() {
        let mut mock = MockPolicyPort::new();
        let _ = mock
            .expect_predict()
            .times(3)
            .returning(|_, _, _| Err(PolicyError::Inference("cuda oom".into())));
        let cache = cache(&["front"]);
        fill(&cache, &["front"]);

        let errors = Arc::new(ErrorLog::default());
        let mut lp = make_loop(Arc::new(mock), cache);
        lp.max_consecutive_failures = 3;
        lp.errors = Arc::clone(&errors) as Arc<dyn ErrorSink>;
        let stats = Arc::clone(&lp.stats);

        let exit = lp.run(CancellationToken::new()).await;
        assert_eq!(
            exit,
            LoopExit::Failed {
                failures: 3,
                last_error: "inference failed: cuda oom".into()
            }
        );
        assert_eq!(stats.snapshot(0).errors, 3);
        // the last failure becomes the exit reason instead
        assert_eq!(*errors.0.lock(), vec!["inference failed: cuda oom"; 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_as_failure() {
        let policy = Arc::new(SlowPolicy::new(Duration::from_secs(30)));
        let cache = cache(&["front"]);
        fill(&cache, &["front"]);

        let mut lp = make_loop(policy, cache);
        lp.predict_timeout = Duration::from_secs(1);
        lp.max_consecutive_failures = 1;
        let stats = Arc::clone(&lp.stats);

        let exit = lp.run(CancellationToken::new()).await;
        assert!(matches!(exit, LoopExit::Failed { failures: 1, .. }));
        let inf = stats.inference_snapshot(PolicyKind::Act, None);
        assert_eq!(inf.timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_are_suppressed_while_call_in_flight() {
        let policy = Arc::new(SlowPolicy::new(Duration::from_millis(1_200)));
        let cache = cache(&["front"]);
        fill(&cache, &["front"]);

        let lp = make_loop(Arc::clone(&policy) as Arc<dyn PolicyPort>, cache);
        let stats = Arc::clone(&lp.stats);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(lp.run(cancel.clone()));

        // call at 0 returns at 1200; ticks at 500 and 1000 are suppressed
        time::sleep(Duration::from_millis(1_300)).await;
        cancel.cancel();
        let _ = handle.await.unwrap();

        assert_eq!(policy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(policy.max_active.load(Ordering::SeqCst), 1);
        let inf = stats.inference_snapshot(PolicyKind::Act, None);
        assert_eq!(inf.suppressed_ticks, 2);
        assert_eq!(inf.chunks_received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_in_flight_call() {
        let policy = Arc::new(SlowPolicy::new(Duration::from_secs(60)));
        let cache = cache(&["front"]);
        fill(&cache, &["front"]);

        let lp = make_loop(Arc::clone(&policy) as Arc<dyn PolicyPort>, cache);
        let queue = Arc::clone(&lp.queue);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(lp.run(cancel.clone()));

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(policy.active.load(Ordering::SeqCst), 1);
        cancel.cancel();

        let exit = time::timeout(Duration::from_millis(10), handle)
            .await
            .expect("loop should exit promptly")
            .unwrap();
        assert_eq!(exit, LoopExit::Cancelled);
        assert!(queue.is_empty());
    }
}
