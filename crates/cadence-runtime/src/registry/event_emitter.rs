//! Lifecycle event fan-out.
//!
//! Every state change of every session goes through one broadcast channel.
//! Hosts either watch the whole stream ([`EventEmitter::subscribe`]) or follow
//! a single session ([`EventEmitter::subscribe_session`]).

use chrono::Utc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};

use crate::session::types::{SessionEvent, SessionState};

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcasts [`SessionEvent`]s to any number of watchers.
///
/// `emit` never awaits. A watcher that falls more than the channel capacity
/// behind loses the oldest events.
pub struct EventEmitter {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventEmitter {
    /// Emitter with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Emitter holding at most `capacity` undelivered events per watcher.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Announce that `session_id` entered `state`.
    pub fn emit(&self, session_id: &str, state: SessionState, error_message: Option<String>) {
        let event = SessionEvent {
            session_id: session_id.to_owned(),
            state,
            error_message,
            at: Utc::now(),
        };
        let receivers = self.tx.send(event).unwrap_or(0);
        trace!(session_id, %state, receivers, "session event emitted");
    }

    /// Events of every session, from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Events of `session_id` only, from now on.
    pub fn subscribe_session(&self, session_id: impl Into<String>) -> SessionEvents {
        SessionEvents {
            session_id: session_id.into(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// A watcher scoped to one session. Lagged events are skipped with a warning.
pub struct SessionEvents {
    session_id: String,
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionEvents {
    /// Session being watched.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the next event of this session.
    ///
    /// Returns `None` once the emitter is gone.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.session_id == self.session_id => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next pending event of this session, without waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.session_id == self.session_id => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every pending state of this session, oldest first.
    pub fn drain_states(&mut self) -> Vec<SessionState> {
        std::iter::from_fn(|| self.try_recv()).map(|e| e.state).collect()
    }

    fn lagged(&self, skipped: u64) {
        warn!(session_id = %self.session_id, skipped, "session event watcher lagged, events lost");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn emit_without_watchers_is_fine() {
        let emitter = EventEmitter::new();
        emitter.emit("s1", SessionState::Created, None);
    }

    #[tokio::test]
    async fn watchers_see_every_session() {
        let emitter = EventEmitter::new();
        let mut all = emitter.subscribe();
        emitter.emit("s1", SessionState::Running, None);
        emitter.emit("s2", SessionState::Error, Some("camera gone".into()));

        let first = all.recv().await.unwrap();
        assert_eq!((first.session_id.as_str(), first.state), ("s1", SessionState::Running));
        let second = all.recv().await.unwrap();
        assert_eq!(second.error_message.as_deref(), Some("camera gone"));
    }

    #[tokio::test]
    async fn session_watcher_filters_other_sessions() {
        let emitter = EventEmitter::new();
        let mut s2 = emitter.subscribe_session("s2");
        assert_eq!(s2.session_id(), "s2");

        emitter.emit("s1", SessionState::Starting, None);
        emitter.emit("s2", SessionState::Starting, None);
        emitter.emit("s1", SessionState::Running, None);
        emitter.emit("s2", SessionState::Running, None);

        assert_eq!(s2.drain_states(), vec![SessionState::Starting, SessionState::Running]);
        assert!(s2.try_recv().is_none());
    }

    #[tokio::test]
    async fn session_watcher_skips_lagged_events() {
        let emitter = EventEmitter::with_capacity(2);
        let mut s1 = emitter.subscribe_session("s1");
        emitter.emit("s1", SessionState::Created, None);
        emitter.emit("s1", SessionState::Starting, None);
        emitter.emit("s1", SessionState::Running, None);

        // the oldest event was overwritten
        assert_eq!(s1.recv().await.unwrap().state, SessionState::Starting);
        assert_eq!(s1.recv().await.unwrap().state, SessionState::Running);
    }

    #[tokio::test]
    async fn session_watcher_ends_with_emitter() {
        let emitter = EventEmitter::new();
        let mut s1 = emitter.subscribe_session("s1");
        emitter.emit("s1", SessionState::Deleted, None);
        drop(emitter);

        assert_eq!(s1.recv().await.unwrap().state, SessionState::Deleted);
        let ended = tokio::time::timeout(Duration::from_secs(1), s1.recv()).await;
        assert_eq!(ended.unwrap(), None);
    }
}
