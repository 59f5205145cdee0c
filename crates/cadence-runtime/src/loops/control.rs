//! Control loop: fixed cadence, one queued step per tick.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::{JointTable, RoomId};
use metrics::counter;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::loops::{ErrorSink, LoopExit};
use crate::metrics::{COMMANDS_SENT_TOTAL, CONTROL_UNDERRUNS_TOTAL, TRANSPORT_ERRORS_TOTAL};
use crate::ports::transport::{Payload, TransportPort};
use crate::session::action_queue::ActionQueue;
use crate::session::stats::{Activity, StatsCounters};

/// Everything the control loop reads and writes.
pub struct ControlLoop {
    /// Owning session, for logs.
    pub session_id: String,
    /// Where commands go.
    pub transport: Arc<dyn TransportPort>,
    /// The session's joint-output room.
    pub output_room: RoomId,
    /// Clamp limits and robot names.
    pub table: &'static JointTable,
    /// Step source.
    pub queue: Arc<ActionQueue>,
    /// Shared counters.
    pub stats: Arc<StatsCounters>,
    /// Idle tracking.
    pub activity: Arc<Activity>,
    /// Where publish failures are reported.
    pub errors: Arc<dyn ErrorSink>,
    /// Tick period.
    pub period: Duration,
    /// Bound on one publish.
    pub publish_timeout: Duration,
}

impl ControlLoop {
    /// Run until cancelled.
    ///
    /// The first tick fires one period after start so the inference loop has
    /// a chance to fill the queue. A failed publish is counted and the loop
    /// moves on; the step is not retried.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn run(self, cancel: CancellationToken) -> LoopExit {
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("control loop cancelled");
                    return LoopExit::Cancelled;
                }
                _ = ticker.tick() => {
                    if self.tick(&cancel).await.is_break() {
                        debug!("control loop cancelled mid-publish");
                        return LoopExit::Cancelled;
                    }
                }
            }
        }
    }

    async fn tick(&self, cancel: &CancellationToken) -> std::ops::ControlFlow<()> {
        let Some(step) = self.queue.pop() else {
            self.stats.record_underrun();
            counter!(CONTROL_UNDERRUNS_TOTAL).increment(1);
            trace!("queue empty, nothing to send");
            return std::ops::ControlFlow::Continue(());
        };

        let commands = self.table.to_commands(&step);
        let publish = self
            .transport
            .publish(&self.output_room, Payload::Commands(commands));

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return std::ops::ControlFlow::Break(()),
            result = time::timeout(self.publish_timeout, publish) => result,
        };

        match result {
            Ok(Ok(())) => {
                self.stats.record_command();
                self.activity.touch();
                counter!(COMMANDS_SENT_TOTAL).increment(1);
            }
            Ok(Err(e)) => {
                warn!(room = %self.output_room, error = %e, "command publish failed");
                self.publish_failed(format!("command publish failed: {e}"));
            }
            Err(_) => {
                let timeout_ms = self.publish_timeout.as_millis() as u64;
                warn!(room = %self.output_room, timeout_ms, "command publish timed out");
                self.publish_failed(format!("command publish timed out after {timeout_ms}ms"));
            }
        }
        std::ops::ControlFlow::Continue(())
    }

    fn publish_failed(&self, message: String) {
        self.stats.record_error();
        counter!(TRANSPORT_ERRORS_TOTAL, "operation" => "publish").increment(1);
        self.errors.report(message);
    }
}
