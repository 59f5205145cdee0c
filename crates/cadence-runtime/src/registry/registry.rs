//! `SessionRegistry`: the entry point for every session operation.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use cadence_core::{JointTable, SO100_TABLE};
use cadence_settings::CadenceSettings;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use futures::future::join_all;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::RuntimeError;
use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_IDLE_DELETED_TOTAL};
use crate::ports::catalog::PolicyCatalog;
use crate::ports::policy::PolicyKind;
use crate::ports::transport::TransportPort;
use crate::registry::event_emitter::{EventEmitter, SessionEvents};
use crate::session::manager::{SessionDeps, SessionManager};
use crate::session::types::{QueueInfo, SessionConfig, SessionEvent, SessionStatus};

/// Registry occupancy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistryHealth {
    /// Registered sessions.
    pub active_sessions: usize,
    /// Their ids, sorted.
    pub session_ids: Vec<String>,
    /// Capacity limit.
    pub max_sessions: usize,
}

struct Entry {
    manager: Arc<SessionManager>,
    /// RAII guard, released when the session leaves the registry.
    _permit: OwnedSemaphorePermit,
}

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Holds an id while its session is being created.
struct Reservation<'a> {
    pending: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let _ = self.pending.lock().remove(&self.id);
    }
}

/// Concurrency-safe table of sessions keyed by id.
pub struct SessionRegistry {
    sessions: DashMap<String, Entry>,
    pending: Mutex<HashSet<String>>,
    permits: Arc<Semaphore>,
    max_sessions: usize,
    deps: SessionDeps,
    idle_timeout: Duration,
    sweep_interval: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl SessionRegistry {
    /// Registry backed by `catalog` and `transport`, configured by `settings`.
    ///
    /// `settings` are validated again here, so hand-built values cannot
    /// reach the loops out of range.
    pub fn new(
        catalog: PolicyCatalog,
        transport: Arc<dyn TransportPort>,
        settings: &CadenceSettings,
    ) -> Self {
        let mut settings = settings.clone();
        settings.validate();
        let max_sessions = settings.registry.max_sessions;
        Self {
            sessions: DashMap::new(),
            pending: Mutex::new(HashSet::new()),
            permits: Arc::new(Semaphore::new(max_sessions)),
            max_sessions,
            deps: SessionDeps {
                catalog,
                transport,
                events: Arc::new(EventEmitter::new()),
                loops: settings.loops.clone(),
                timeouts: settings.timeouts.clone(),
                table: &SO100_TABLE,
            },
            idle_timeout: settings.registry.idle_timeout(),
            sweep_interval: settings.registry.sweep_interval(),
            sweeper: Mutex::new(None),
        }
    }

    /// Use a different robot joint table for sessions created from now on.
    #[must_use]
    pub fn with_joint_table(mut self, table: &'static JointTable) -> Self {
        self.deps.table = table;
        self
    }

    /// Lifecycle event emitter.
    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.deps.events
    }

    /// Subscribe to lifecycle events of every session.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.deps.events.subscribe()
    }

    /// Subscribe to lifecycle events of one session.
    pub fn subscribe_session(&self, session_id: &str) -> SessionEvents {
        self.deps.events.subscribe_session(session_id)
    }

    /// Registered session count.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Create and register a session. The session is left `Created`.
    #[instrument(skip_all, fields(session_id = %config.session_id))]
    pub async fn create(&self, config: SessionConfig) -> Result<SessionStatus, RuntimeError> {
        let reservation = self.reserve(&config.session_id)?;
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| RuntimeError::RegistryFull {
                max: self.max_sessions,
            })?;

        let manager = Arc::new(SessionManager::create(config, self.deps.clone()).await?);
        self.register_created(Arc::clone(&manager), permit).await?;
        drop(reservation);
        Ok(manager.status())
    }

    /// Register an existing session.
    ///
    /// Fails with `AlreadyExists` while a session with the same id is still
    /// being created.
    pub fn insert(&self, manager: Arc<SessionManager>) -> Result<(), RuntimeError> {
        let _reservation = self.reserve(manager.id())?;
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| RuntimeError::RegistryFull {
                max: self.max_sessions,
            })?;
        self.insert_with_permit(manager, permit)
    }

    /// Session by id.
    pub fn lookup(&self, session_id: &str) -> Result<Arc<SessionManager>, RuntimeError> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(&entry.manager))
            .ok_or_else(|| RuntimeError::NotFound(session_id.to_owned()))
    }

    /// Unregister a session without stopping it.
    pub fn remove(&self, session_id: &str) -> Result<Arc<SessionManager>, RuntimeError> {
        let (_, entry) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| RuntimeError::NotFound(session_id.to_owned()))?;
        self.update_gauge();
        debug!(session_id, "session unregistered");
        Ok(entry.manager)
    }

    /// Status of every session, sorted by id.
    pub fn list(&self) -> Vec<SessionStatus> {
        let managers: Vec<Arc<SessionManager>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(&entry.manager))
            .collect();
        let mut statuses: Vec<SessionStatus> = managers.iter().map(|m| m.status()).collect();
        statuses.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        statuses
    }

    /// Start a session.
    pub async fn start(&self, session_id: &str) -> Result<SessionStatus, RuntimeError> {
        let manager = self.lookup(session_id)?;
        manager.start().await?;
        Ok(manager.status())
    }

    /// Stop a session.
    pub async fn stop(&self, session_id: &str) -> Result<SessionStatus, RuntimeError> {
        let manager = self.lookup(session_id)?;
        manager.stop().await?;
        Ok(manager.status())
    }

    /// Restart a session.
    pub async fn restart(&self, session_id: &str) -> Result<SessionStatus, RuntimeError> {
        let manager = self.lookup(session_id)?;
        manager.restart().await?;
        Ok(manager.status())
    }

    /// Unregister, stop, and delete a session.
    ///
    /// The id is unregistered first, so further operations fail with
    /// `NotFound` even while teardown is still running.
    pub async fn delete(&self, session_id: &str) -> Result<(), RuntimeError> {
        let manager = self.remove(session_id)?;
        manager.delete().await
    }

    /// Status of one session.
    pub fn status(&self, session_id: &str) -> Result<SessionStatus, RuntimeError> {
        Ok(self.lookup(session_id)?.status())
    }

    /// Clear a session's queue, counters, and camera flags.
    pub fn reset_debug(&self, session_id: &str) -> Result<SessionStatus, RuntimeError> {
        let manager = self.lookup(session_id)?;
        manager.reset_debug()?;
        Ok(manager.status())
    }

    /// Queue diagnostics of one session.
    pub fn queue_info(&self, session_id: &str) -> Result<QueueInfo, RuntimeError> {
        Ok(self.lookup(session_id)?.queue_info())
    }

    /// Occupancy summary.
    pub fn health(&self) -> RegistryHealth {
        let mut session_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        session_ids.sort();
        RegistryHealth {
            active_sessions: session_ids.len(),
            session_ids,
            max_sessions: self.max_sessions,
        }
    }

    /// Policy kinds sessions can be created with.
    pub fn supported_policies(&self) -> Vec<PolicyKind> {
        self.deps.catalog.kinds()
    }

    /// Delete every session idle for at least the idle timeout.
    ///
    /// Activity timestamps are read from a snapshot of the table; no registry
    /// lock is held while sessions are torn down. Returns the deleted ids.
    #[instrument(skip(self))]
    pub async fn sweep_idle(&self) -> Vec<String> {
        let now = Instant::now();
        let candidates: Vec<Arc<SessionManager>> = self
            .sessions
            .iter()
            .filter(|entry| entry.manager.idle_for(now) >= self.idle_timeout)
            .map(|entry| Arc::clone(&entry.manager))
            .collect();

        let mut deleted = Vec::with_capacity(candidates.len());
        for manager in candidates {
            // activity may have happened since the snapshot
            if manager.idle_for(Instant::now()) < self.idle_timeout {
                continue;
            }
            let id = manager.id().to_owned();
            match self.delete(&id).await {
                Ok(()) => {
                    counter!(SESSIONS_IDLE_DELETED_TOTAL).increment(1);
                    info!(session_id = %id, idle_secs = self.idle_timeout.as_secs(), "idle session deleted");
                    deleted.push(id);
                }
                Err(RuntimeError::NotFound(_)) => {}
                Err(e) => warn!(session_id = %id, error = %e, "failed to delete idle session"),
            }
        }
        deleted
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every sweep interval until
    /// [`shutdown`](Self::shutdown). Calling it twice has no effect.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            return;
        }
        let registry: Weak<Self> = Arc::downgrade(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let period = self.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(registry) = registry.upgrade() else { break };
                        let _ = registry.sweep_idle().await;
                    }
                }
            }
            debug!("idle sweeper stopped");
        });
        *slot = Some(Sweeper { cancel, handle });
        info!(
            interval_secs = period.as_secs(),
            idle_timeout_secs = self.idle_timeout.as_secs(),
            "idle sweeper started"
        );
    }

    /// Stop the idle sweeper and delete every session.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        info!(sessions = self.sessions.len(), "registry shutdown initiated");
        let sweeper = self.sweeper.lock().take();
        if let Some(Sweeper { cancel, handle }) = sweeper {
            cancel.cancel();
            let _ = handle.await;
        }

        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let results = join_all(ids.iter().map(|id| self.delete(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                warn!(session_id = %id, error = %e, "failed to delete session during shutdown");
            }
        }
        info!("registry shutdown complete");
    }

    fn reserve(&self, session_id: &str) -> Result<Reservation<'_>, RuntimeError> {
        let mut pending = self.pending.lock();
        if self.sessions.contains_key(session_id) || !pending.insert(session_id.to_owned()) {
            return Err(RuntimeError::AlreadyExists(session_id.to_owned()));
        }
        Ok(Reservation {
            pending: &self.pending,
            id: session_id.to_owned(),
        })
    }

    /// Insert a freshly created session, deleting it if the insert fails so
    /// its rooms do not outlive it.
    async fn register_created(
        &self,
        manager: Arc<SessionManager>,
        permit: OwnedSemaphorePermit,
    ) -> Result<(), RuntimeError> {
        let Err(e) = self.insert_with_permit(Arc::clone(&manager), permit) else {
            return Ok(());
        };
        warn!(session_id = %manager.id(), error = %e, "could not register new session, deleting it");
        if let Err(cleanup) = manager.delete().await {
            warn!(session_id = %manager.id(), error = %cleanup, "failed to delete unregistered session");
        }
        Err(e)
    }

    fn insert_with_permit(
        &self,
        manager: Arc<SessionManager>,
        permit: OwnedSemaphorePermit,
    ) -> Result<(), RuntimeError> {
        let id = manager.id().to_owned();
        match self.sessions.entry(id.clone()) {
            MapEntry::Occupied(_) => return Err(RuntimeError::AlreadyExists(id)),
            MapEntry::Vacant(slot) => {
                let _ = slot.insert(Entry {
                    manager,
                    _permit: permit,
                });
            }
        }
        self.update_gauge();
        info!(session_id = %id, "session registered");
        Ok(())
    }

    fn update_gauge(&self) {
        #[allow(clippy::cast_precision_loss)]
        gauge!(SESSIONS_ACTIVE).set(self.sessions.len() as f64);
    }
}
