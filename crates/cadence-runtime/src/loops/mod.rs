//! The two periodic loops of a running session.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `inference` | Snapshot → `PolicyPort::predict` → `ActionQueue`, one call in flight |
//! | `control` | `ActionQueue` → clamp → `TransportPort::publish`, fixed cadence |
//!
//! Both loops run as independent tokio tasks and stop when their
//! `CancellationToken` fires. Neither holds a lock across an await.
//! Failures a loop recovers from are passed to an [`ErrorSink`] so the
//! session can surface the latest one.

pub mod control;
pub mod inference;

pub use control::ControlLoop;
pub use inference::InferenceLoop;

/// Why a loop returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// The cancellation token fired.
    Cancelled,
    /// Too many consecutive failures.
    Failed {
        /// Consecutive failures at exit.
        failures: u32,
        /// Last failure, for the session's error message.
        last_error: String,
    },
}

/// Receives failures a loop survives.
pub trait ErrorSink: Send + Sync {
    /// Record `message` as the session's latest error.
    fn report(&self, message: String);
}

#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::Mutex;

    use super::ErrorSink;

    /// Keeps every reported error, in order.
    #[derive(Default)]
    pub(crate) struct ErrorLog(pub(crate) Mutex<Vec<String>>);

    impl ErrorSink for ErrorLog {
        fn report(&self, message: String) {
            self.0.lock().push(message);
        }
    }
}
