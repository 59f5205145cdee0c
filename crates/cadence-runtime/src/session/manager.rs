//! `SessionManager`: one session's state machine, rooms, and loops.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──start──▶ Starting ──subscribed──▶ Running ──stop──▶ Stopping ──▶ Stopped
//!                       │                        │                              │
//!                       └─transport error──▶ Error ◀──inference threshold───────┘ (start)
//! any ──delete──▶ Deleted
//! ```
//!
//! Lifecycle operations of one session are serialized by an async mutex held
//! across the whole operation. Status reads never take it.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cadence_core::{JointTable, PolicyError, RoomId, WorkspaceId};
use cadence_settings::{LoopSettings, TimeoutSettings};
use chrono::Utc;
use futures::future::join_all;
use metrics::counter;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::errors::RuntimeError;
use crate::loops::{ControlLoop, ErrorSink, InferenceLoop, LoopExit};
use crate::metrics::{SESSION_TRANSITIONS_TOTAL, TRANSPORT_ERRORS_TOTAL};
use crate::ports::catalog::PolicyCatalog;
use crate::ports::policy::{PolicyDescriptor, PolicyKind, PolicyLoadRequest, PolicyPort};
use crate::ports::transport::{MessageHandler, Payload, RoomKind, SubscriptionId, TransportPort};
use crate::registry::event_emitter::EventEmitter;
use crate::session::action_queue::ActionQueue;
use crate::session::frame_cache::JointFrameCache;
use crate::session::stats::{Activity, StatsCounters};
use crate::session::types::{
    QueueInfo, RoomIds, SessionConfig, SessionState, SessionStatus,
    camera_room_name, joint_input_room_name, joint_output_room_name,
};

/// Shared collaborators handed to every session.
#[derive(Clone)]
pub struct SessionDeps {
    /// Policy factories by kind.
    pub catalog: PolicyCatalog,
    /// Pub/sub transport.
    pub transport: Arc<dyn TransportPort>,
    /// Lifecycle event sink.
    pub events: Arc<EventEmitter>,
    /// Loop cadence and queue policy.
    pub loops: LoopSettings,
    /// External call bounds.
    pub timeouts: TimeoutSettings,
    /// Robot joint table.
    pub table: &'static JointTable,
}

/// State shared with the loop supervisor so it can fail the session.
struct SessionShared {
    id: String,
    lifecycle: Mutex<(SessionState, Option<String>)>,
    events: Arc<EventEmitter>,
}

impl SessionShared {
    fn state(&self) -> SessionState {
        self.lifecycle.lock().0
    }

    fn snapshot(&self) -> (SessionState, Option<String>) {
        self.lifecycle.lock().clone()
    }

    /// Enter `to`. Entering `Starting` clears the error message.
    fn transition(&self, to: SessionState) {
        let error_message = {
            let mut guard = self.lifecycle.lock();
            guard.0 = to;
            if to == SessionState::Starting {
                guard.1 = None;
            }
            guard.1.clone()
        };
        self.announce(to, error_message);
    }

    /// Enter `Error` with `message`, but only from `Starting` or `Running`.
    fn fail(&self, message: String) -> bool {
        {
            let mut guard = self.lifecycle.lock();
            if !matches!(guard.0, SessionState::Starting | SessionState::Running) {
                return false;
            }
            guard.0 = SessionState::Error;
            guard.1 = Some(message.clone());
        }
        self.announce(SessionState::Error, Some(message));
        true
    }

    /// Supervise both loops of one run until they have all exited.
    ///
    /// A loop that gives up, panics, or returns before `cancel` fires fails
    /// the session and cancels the other one.
    async fn supervise(
        self: Arc<Self>,
        mut loops: JoinSet<(&'static str, LoopExit)>,
        cancel: CancellationToken,
    ) {
        while let Some(joined) = loops.join_next().await {
            let message = match joined {
                Ok((_, LoopExit::Failed { failures, last_error })) => {
                    format!("inference failed {failures} times in a row: {last_error}")
                }
                Ok((name, LoopExit::Cancelled)) if !cancel.is_cancelled() => {
                    format!("{name} loop exited unexpectedly")
                }
                Ok((_, LoopExit::Cancelled)) => continue,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => format!("session loop crashed: {e}"),
            };
            if self.fail(message.clone()) {
                error!(session_id = %self.id, error = %message, "session entered error state");
            }
            cancel.cancel();
        }
    }

    fn announce(&self, state: SessionState, error_message: Option<String>) {
        counter!(SESSION_TRANSITIONS_TOTAL, "state" => state.as_str()).increment(1);
        debug!(session_id = %self.id, %state, "session transition");
        self.events.emit(&self.id, state, error_message);
    }
}

impl ErrorSink for SessionShared {
    /// Keep `message` as the latest error without leaving `Running`.
    fn report(&self, message: String) {
        let mut guard = self.lifecycle.lock();
        if matches!(guard.0, SessionState::Starting | SessionState::Running) {
            guard.1 = Some(message);
        }
    }
}

/// Tracks the loops and subscriptions of a started session.
struct ActiveRun {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    subscriptions: Vec<SubscriptionId>,
}

/// Owns one session: its policy, rooms, cache, queue, and loops.
pub struct SessionManager {
    shared: Arc<SessionShared>,
    descriptor: PolicyDescriptor,
    camera_names: Vec<String>,
    instruction: Option<String>,
    policy: Arc<dyn PolicyPort>,
    transport: Arc<dyn TransportPort>,
    table: &'static JointTable,
    loops: LoopSettings,
    timeouts: TimeoutSettings,
    rooms: RoomIds,
    cache: Arc<JointFrameCache>,
    queue: Arc<ActionQueue>,
    stats: Arc<StatsCounters>,
    activity: Arc<Activity>,
    run: tokio::sync::Mutex<Option<ActiveRun>>,
    started: AtomicBool,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("session_id", &self.shared.id)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Validate `config`, load the policy, and create the session's rooms.
    ///
    /// On success the session is `Created`. Nothing outlives a failure: a
    /// partially created workspace is closed best-effort.
    #[instrument(skip_all, fields(session_id = %config.session_id))]
    pub async fn create(config: SessionConfig, deps: SessionDeps) -> Result<Self, RuntimeError> {
        let kind = validate(&config, &deps.catalog)?;
        let descriptor = PolicyDescriptor {
            path: config.policy_path.clone(),
            kind,
        };
        let instruction = match config.language_instruction.clone() {
            Some(text) if text.trim().is_empty() => None,
            Some(text) if kind.supports_language() => Some(text),
            Some(_) => {
                info!(policy_type = %kind, "policy takes no language instruction, ignoring it");
                None
            }
            None => None,
        };

        let policy = load_policy(&deps, &descriptor, &config.camera_names, instruction.clone()).await?;
        let rooms = create_rooms(&*deps.transport, &config, deps.timeouts.transport_timeout()).await?;

        let shared = Arc::new(SessionShared {
            id: config.session_id.clone(),
            lifecycle: Mutex::new((SessionState::Created, None)),
            events: deps.events,
        });
        let manager = Self {
            cache: Arc::new(JointFrameCache::new(config.camera_names.clone(), deps.table)),
            queue: Arc::new(ActionQueue::new(deps.loops.queue_cap, deps.loops.max_queue_len)),
            stats: Arc::new(StatsCounters::new()),
            activity: Arc::new(Activity::new()),
            shared,
            descriptor,
            camera_names: config.camera_names,
            instruction,
            policy,
            transport: deps.transport,
            table: deps.table,
            loops: deps.loops,
            timeouts: deps.timeouts,
            rooms,
            run: tokio::sync::Mutex::new(None),
            started: AtomicBool::new(false),
        };
        info!(
            workspace = %manager.rooms.workspace_id,
            policy_type = %kind,
            cameras = manager.camera_names.len(),
            "session created"
        );
        manager.shared.transition(SessionState::Created);
        Ok(manager)
    }

    /// Session id.
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Transport rooms owned by this session.
    pub fn rooms(&self) -> &RoomIds {
        &self.rooms
    }

    /// Workspace holding the session's rooms.
    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.rooms.workspace_id
    }

    /// Time since the last activity, measured at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        self.activity.idle_for(now)
    }

    /// Subscribe to inputs and spawn both loops.
    ///
    /// A no-op while `Starting` or `Running`. A transport failure leaves the
    /// session in `Error` with the failure as its message.
    #[instrument(skip(self), fields(session_id = %self.shared.id))]
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let mut run = self.run.lock().await;
        self.start_locked(&mut run).await
    }

    /// Cancel both loops, release subscriptions, and clear the queue.
    ///
    /// Idempotent on `Created` and `Stopped` sessions.
    #[instrument(skip(self), fields(session_id = %self.shared.id))]
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        let mut run = self.run.lock().await;
        self.stop_locked(&mut run).await
    }

    /// Stop, reset the frame cache and policy state, then start again.
    #[instrument(skip(self), fields(session_id = %self.shared.id))]
    pub async fn restart(&self) -> Result<(), RuntimeError> {
        let mut run = self.run.lock().await;
        self.stop_locked(&mut run).await?;
        self.cache.reset();
        self.policy.reset();
        self.start_locked(&mut run).await
    }

    /// Stop if needed, close the workspace, and enter `Deleted`.
    ///
    /// Closing the workspace is best-effort; a transport failure is logged.
    #[instrument(skip(self), fields(session_id = %self.shared.id))]
    pub async fn delete(&self) -> Result<(), RuntimeError> {
        let mut run = self.run.lock().await;
        if self.state() == SessionState::Deleted {
            return Ok(());
        }
        self.stop_locked(&mut run).await?;

        let bound = self.timeouts.transport_timeout();
        let workspace = &self.rooms.workspace_id;
        match time::timeout(bound, self.transport.close_workspace(workspace)).await {
            Ok(Ok(())) => debug!(%workspace, "workspace closed"),
            Ok(Err(e)) => {
                counter!(TRANSPORT_ERRORS_TOTAL, "operation" => "close_workspace").increment(1);
                warn!(%workspace, error = %e, "failed to close workspace");
            }
            Err(_) => {
                counter!(TRANSPORT_ERRORS_TOTAL, "operation" => "close_workspace").increment(1);
                warn!(%workspace, "timed out closing workspace");
            }
        }
        self.shared.transition(SessionState::Deleted);
        info!("session deleted");
        Ok(())
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        let (status, error_message) = self.shared.snapshot();
        let inference_stats = self.started.load(Ordering::Acquire).then(|| {
            self.stats
                .inference_snapshot(self.descriptor.kind, self.policy.model_info())
        });
        SessionStatus {
            session_id: self.shared.id.clone(),
            status,
            policy: self.descriptor.clone(),
            camera_names: self.camera_names.clone(),
            rooms: self.rooms.clone(),
            stats: self.stats.snapshot(self.queue.len()),
            inference_stats,
            joint_state: self.cache.joint_state(),
            error_message,
        }
    }

    /// Clear the queue, counters, camera flags, and policy state.
    ///
    /// Rooms, subscriptions, and the lifecycle state are untouched.
    pub fn reset_debug(&self) -> Result<(), RuntimeError> {
        self.ensure_not_deleted("reset")?;
        self.queue.clear();
        self.stats.reset();
        self.cache.clear_frames();
        self.policy.reset();
        self.activity.touch();
        info!(session_id = %self.shared.id, "session debug state reset");
        Ok(())
    }

    /// Queue diagnostics.
    pub fn queue_info(&self) -> QueueInfo {
        QueueInfo {
            session_id: self.shared.id.clone(),
            queue_length: self.queue.len(),
            queue_cap: self.queue.cap(),
            max_queue_len: self.queue.max_len(),
            n_action_steps: self.loops.n_action_steps,
            control_frequency_hz: self.loops.control_frequency_hz,
            inference_frequency_hz: self.loops.inference_frequency_hz,
            recent_chunks: self.queue.recent_chunks(),
            data_status: self.cache.data_status(),
        }
    }

    // ── lifecycle internals ────────────────────────────────────────────

    fn ensure_not_deleted(&self, operation: &'static str) -> Result<(), RuntimeError> {
        match self.state() {
            SessionState::Deleted => Err(self.invalid_state(operation, SessionState::Deleted)),
            _ => Ok(()),
        }
    }

    fn invalid_state(&self, operation: &'static str, state: SessionState) -> RuntimeError {
        RuntimeError::InvalidState {
            session_id: self.shared.id.clone(),
            operation,
            state,
        }
    }

    async fn start_locked(&self, run: &mut Option<ActiveRun>) -> Result<(), RuntimeError> {
        match self.state() {
            SessionState::Starting | SessionState::Running => {
                debug!("session already running");
                return Ok(());
            }
            state @ (SessionState::Stopping | SessionState::Deleted) => {
                return Err(self.invalid_state("start", state));
            }
            SessionState::Created | SessionState::Stopped | SessionState::Error => {}
        }
        self.activity.touch();

        // A run left behind by an inference failure still holds subscriptions.
        if let Some(stale) = run.take() {
            self.teardown(stale).await;
        }
        self.shared.transition(SessionState::Starting);

        let subscriptions = match self.subscribe_inputs().await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                error!(error = %e, "session start failed");
                let _ = self.shared.fail(e.to_string());
                return Err(e);
            }
        };

        self.started.store(true, Ordering::Release);
        self.shared.transition(SessionState::Running);

        let cancel = CancellationToken::new();
        let mut loops = JoinSet::new();
        let (inference, control) = (self.inference_loop(), self.control_loop());
        let token = cancel.clone();
        let _ = loops.spawn(async move { ("inference", inference.run(token).await) });
        let token = cancel.clone();
        let _ = loops.spawn(async move { ("control", control.run(token).await) });

        // Dropping the supervisor aborts both loops.
        let mut tasks = JoinSet::new();
        let _ = tasks.spawn(Arc::clone(&self.shared).supervise(loops, cancel.clone()));

        *run = Some(ActiveRun {
            cancel,
            tasks,
            subscriptions,
        });
        info!(
            control_hz = self.loops.control_frequency_hz,
            inference_hz = self.loops.inference_frequency_hz,
            "session running"
        );
        Ok(())
    }

    async fn stop_locked(&self, run: &mut Option<ActiveRun>) -> Result<(), RuntimeError> {
        match self.state() {
            SessionState::Deleted => return Err(self.invalid_state("stop", SessionState::Deleted)),
            SessionState::Created | SessionState::Stopped if run.is_none() => {
                debug!("session not running, nothing to stop");
                return Ok(());
            }
            _ => {}
        }
        self.activity.touch();
        self.shared.transition(SessionState::Stopping);
        if let Some(active) = run.take() {
            self.teardown(active).await;
        }
        self.queue.clear();
        self.shared.transition(SessionState::Stopped);
        info!("session stopped");
        Ok(())
    }

    /// Cancel, wait out the grace period, abandon stragglers, unsubscribe.
    async fn teardown(&self, active: ActiveRun) {
        let ActiveRun {
            cancel,
            mut tasks,
            subscriptions,
        } = active;
        cancel.cancel();

        let grace = self.timeouts.stop_grace();
        let drained = time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "session supervisor ended abnormally");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                remaining = tasks.len(),
                "loops did not exit within grace period, abandoning them"
            );
            tasks.abort_all();
        }

        self.release(subscriptions).await;
        self.queue.clear();
    }

    async fn subscribe_inputs(&self) -> Result<Vec<SubscriptionId>, RuntimeError> {
        let bound = self.timeouts.transport_timeout();
        let mut targets: Vec<(RoomId, MessageHandler)> = self
            .rooms
            .camera_room_ids
            .iter()
            .map(|(camera, room)| (room.clone(), self.camera_handler(camera.clone())))
            .collect();
        targets.push((self.rooms.joint_input_room_id.clone(), self.joints_handler()));

        let mut subscriptions = Vec::with_capacity(targets.len());
        for (room, handler) in targets {
            let failure = match time::timeout(bound, self.transport.subscribe(&room, handler)).await {
                Ok(Ok(id)) => {
                    subscriptions.push(id);
                    continue;
                }
                Ok(Err(e)) => RuntimeError::connection(&e),
                Err(_) => RuntimeError::timeout(format!("subscribe to {room}"), bound),
            };
            counter!(TRANSPORT_ERRORS_TOTAL, "operation" => "subscribe").increment(1);
            self.release(subscriptions).await;
            return Err(failure);
        }
        Ok(subscriptions)
    }

    async fn release(&self, subscriptions: Vec<SubscriptionId>) {
        if subscriptions.is_empty() {
            return;
        }
        let bound = self.timeouts.transport_timeout();
        let results = join_all(subscriptions.into_iter().map(|sub| async move {
            (sub, time::timeout(bound, self.transport.unsubscribe(sub)).await)
        }))
        .await;
        for (sub, result) in results {
            match result {
                Ok(Ok(())) => trace!(subscription = %sub, "unsubscribed"),
                Ok(Err(e)) => debug!(subscription = %sub, error = %e, "unsubscribe failed"),
                Err(_) => debug!(subscription = %sub, "unsubscribe timed out"),
            }
        }
    }

    fn camera_handler(&self, camera: String) -> MessageHandler {
        let cache = Arc::clone(&self.cache);
        let stats = Arc::clone(&self.stats);
        let activity = Arc::clone(&self.activity);
        let shared = Arc::clone(&self.shared);
        Arc::new(move |payload: Payload| match payload {
            Payload::Frame(frame) => match cache.update_image(&camera, frame, Utc::now()) {
                Ok(()) => {
                    stats.record_image();
                    activity.touch();
                }
                Err(e) => {
                    stats.record_error();
                    warn!(session_id = %shared.id, %camera, error = %e, "frame rejected");
                    shared.report(format!("frame from camera '{camera}' rejected: {e}"));
                }
            },
            other => trace!(session_id = %shared.id, %camera, kind = other.kind(), "ignoring payload on camera room"),
        })
    }

    fn joints_handler(&self) -> MessageHandler {
        let cache = Arc::clone(&self.cache);
        let stats = Arc::clone(&self.stats);
        let activity = Arc::clone(&self.activity);
        let session_id = self.shared.id.clone();
        Arc::new(move |payload: Payload| match payload {
            Payload::Joints(reading) => {
                if cache.update_joints(&reading, Utc::now()) > 0 {
                    stats.record_joints();
                    activity.touch();
                } else {
                    debug!(%session_id, "joint reading matched no known joint");
                }
            }
            other => trace!(%session_id, kind = other.kind(), "ignoring payload on joint-input room"),
        })
    }

    fn inference_loop(&self) -> InferenceLoop {
        InferenceLoop {
            session_id: self.shared.id.clone(),
            policy: Arc::clone(&self.policy),
            policy_type: self.descriptor.kind,
            instruction: self.instruction.clone(),
            cache: Arc::clone(&self.cache),
            queue: Arc::clone(&self.queue),
            stats: Arc::clone(&self.stats),
            activity: Arc::clone(&self.activity),
            errors: Arc::clone(&self.shared) as Arc<dyn ErrorSink>,
            period: self.loops.inference_period(),
            predict_timeout: self.timeouts.predict_timeout(),
            n_action_steps: self.loops.n_action_steps,
            max_consecutive_failures: self.loops.max_consecutive_failures,
        }
    }

    fn control_loop(&self) -> ControlLoop {
        ControlLoop {
            session_id: self.shared.id.clone(),
            transport: Arc::clone(&self.transport),
            output_room: self.rooms.joint_output_room_id.clone(),
            table: self.table,
            queue: Arc::clone(&self.queue),
            stats: Arc::clone(&self.stats),
            activity: Arc::clone(&self.activity),
            errors: Arc::clone(&self.shared) as Arc<dyn ErrorSink>,
            period: self.loops.control_period(),
            publish_timeout: self.timeouts.publish_timeout(),
        }
    }
}

// ── create helpers ─────────────────────────────────────────────────────

fn validate(config: &SessionConfig, catalog: &PolicyCatalog) -> Result<PolicyKind, RuntimeError> {
    if config.session_id.trim().is_empty() {
        return Err(RuntimeError::Validation("session_id must not be empty".into()));
    }
    if config.policy_path.trim().is_empty() {
        return Err(RuntimeError::Validation("policy_path must not be empty".into()));
    }
    if config.policy_type.trim().is_empty() {
        return Err(RuntimeError::Validation("policy_type must not be empty".into()));
    }
    if config.camera_names.is_empty() {
        return Err(RuntimeError::Validation("camera_names must not be empty".into()));
    }
    let mut seen = HashSet::with_capacity(config.camera_names.len());
    for camera in &config.camera_names {
        if camera.trim().is_empty() {
            return Err(RuntimeError::Validation("camera names must not be empty".into()));
        }
        if !seen.insert(camera.as_str()) {
            return Err(RuntimeError::Validation(format!("duplicate camera name: {camera}")));
        }
    }

    match PolicyKind::parse(&config.policy_type) {
        Some(kind) if catalog.contains(kind) => Ok(kind),
        _ => Err(RuntimeError::Validation(format!(
            "unsupported policy type '{}' (supported: {})",
            config.policy_type,
            catalog.describe()
        ))),
    }
}

async fn load_policy(
    deps: &SessionDeps,
    descriptor: &PolicyDescriptor,
    camera_names: &[String],
    instruction: Option<String>,
) -> Result<Arc<dyn PolicyPort>, RuntimeError> {
    let factory = deps.catalog.get(descriptor.kind).ok_or_else(|| {
        RuntimeError::Validation(format!("no factory registered for {}", descriptor.kind))
    })?;
    let request = PolicyLoadRequest {
        descriptor: descriptor.clone(),
        camera_names: camera_names.to_vec(),
        instruction,
    };
    let bound = deps.timeouts.policy_load_timeout();
    let started = Instant::now();
    let policy = time::timeout(bound, factory.load(&request))
        .await
        .map_err(|_| RuntimeError::timeout(format!("load {} policy", descriptor.kind), bound))?
        .map_err(|e| match e {
            PolicyError::Load(msg) => RuntimeError::PolicyLoad(msg),
            other => RuntimeError::PolicyLoad(other.to_string()),
        })?;
    debug!(
        path = %descriptor.path,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "policy loaded"
    );
    Ok(policy)
}

async fn create_rooms(
    transport: &dyn TransportPort,
    config: &SessionConfig,
    bound: Duration,
) -> Result<RoomIds, RuntimeError> {
    let id = &config.session_id;
    let mut plan: Vec<(String, RoomKind)> = config
        .camera_names
        .iter()
        .map(|camera| (camera_room_name(id, camera), RoomKind::Camera))
        .collect();
    plan.push((joint_input_room_name(id), RoomKind::JointInput));
    plan.push((joint_output_room_name(id), RoomKind::JointOutput));

    let mut workspace = config.workspace_id.clone();
    let mut created = Vec::with_capacity(plan.len());
    for (name, kind) in plan {
        let failure = match time::timeout(bound, transport.create_room(workspace.as_ref(), &name, kind)).await {
            Ok(Ok((ws, room))) => {
                workspace = Some(ws);
                created.push(room);
                continue;
            }
            Ok(Err(e)) => RuntimeError::connection(&e),
            Err(_) => RuntimeError::timeout(format!("create room {name}"), bound),
        };
        counter!(TRANSPORT_ERRORS_TOTAL, "operation" => "create_room").increment(1);
        // Only a workspace this session generated is ours to close.
        if let (Some(ws), None) = (&workspace, &config.workspace_id) {
            match time::timeout(bound, transport.close_workspace(ws)).await {
                Ok(Ok(())) => debug!(workspace = %ws, "closed partially created workspace"),
                _ => warn!(workspace = %ws, "failed to close partially created workspace"),
            }
        }
        return Err(failure);
    }

    let workspace_id = workspace
        .ok_or_else(|| RuntimeError::Internal("room creation produced no workspace".into()))?;
    let joint_output_room_id = created
        .pop()
        .ok_or_else(|| RuntimeError::Internal("missing joint-output room".into()))?;
    let joint_input_room_id = created
        .pop()
        .ok_or_else(|| RuntimeError::Internal("missing joint-input room".into()))?;
    let camera_room_ids: BTreeMap<String, RoomId> =
        config.camera_names.iter().cloned().zip(created).collect();

    Ok(RoomIds {
        workspace_id,
        camera_room_ids,
        joint_input_room_id,
        joint_output_room_id,
    })
}
