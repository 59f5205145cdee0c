//! Session configuration, state, and the payloads returned to callers.

use std::collections::BTreeMap;
use std::fmt;

use cadence_core::{RoomId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::policy::PolicyDescriptor;
use crate::session::stats::{InferenceStats, SessionStats};

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Rooms exist, loops not running.
    Created,
    /// Subscribing to input rooms.
    Starting,
    /// Both loops running.
    Running,
    /// Loops being cancelled.
    Stopping,
    /// Loops stopped; can be started again.
    Stopped,
    /// Failed; see the error message. Can be started again.
    Error,
    /// Rooms released; the session is gone.
    Deleted,
}

impl SessionState {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Deleted => "deleted",
        }
    }

    /// Whether loops may be running in this state.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for creating a session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Unique session id.
    pub session_id: String,
    /// Checkpoint path or hub id.
    pub policy_path: String,
    /// Policy type tag (`act`, `pi0`, `pi0fast`, `smolvla`, `diffusion`).
    pub policy_type: String,
    /// Cameras feeding the policy; one room is created per camera.
    pub camera_names: Vec<String>,
    /// Instruction for language-conditioned policies.
    pub language_instruction: Option<String>,
    /// Existing workspace to create rooms in.
    pub workspace_id: Option<WorkspaceId>,
}

impl SessionConfig {
    /// Minimal config with the required fields.
    pub fn new(
        session_id: impl Into<String>,
        policy_path: impl Into<String>,
        policy_type: impl Into<String>,
        camera_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            policy_path: policy_path.into(),
            policy_type: policy_type.into(),
            camera_names: camera_names.into_iter().map(Into::into).collect(),
            language_instruction: None,
            workspace_id: None,
        }
    }

    /// Set the language instruction.
    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.language_instruction = Some(instruction.into());
        self
    }

    /// Create rooms in an existing workspace.
    #[must_use]
    pub fn in_workspace(mut self, workspace: WorkspaceId) -> Self {
        self.workspace_id = Some(workspace);
        self
    }
}

/// Transport rooms owned by one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomIds {
    /// Workspace holding every room below.
    pub workspace_id: WorkspaceId,
    /// Camera name → video room.
    pub camera_room_ids: BTreeMap<String, RoomId>,
    /// Room the robot publishes joint readings to.
    pub joint_input_room_id: RoomId,
    /// Room the control loop publishes commands to.
    pub joint_output_room_id: RoomId,
}

/// Room name for a camera.
pub fn camera_room_name(session_id: &str, camera: &str) -> String {
    format!("{session_id}-{camera}")
}

/// Room name for joint readings.
pub fn joint_input_room_name(session_id: &str) -> String {
    format!("{session_id}-joint-input")
}

/// Room name for joint commands.
pub fn joint_output_room_name(session_id: &str) -> String {
    format!("{session_id}-joint-output")
}

/// Snapshot of one session for the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionStatus {
    /// Session id.
    pub session_id: String,
    /// Lifecycle state.
    pub status: SessionState,
    /// Model the session runs.
    pub policy: PolicyDescriptor,
    /// Configured cameras.
    pub camera_names: Vec<String>,
    /// Transport rooms.
    #[serde(flatten)]
    pub rooms: RoomIds,
    /// Core counters.
    pub stats: SessionStats,
    /// Inference diagnostics, present once the session has been started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_stats: Option<InferenceStats>,
    /// Last complete joint vector, canonical order.
    pub joint_state: Vec<f32>,
    /// Why the session entered `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Metadata about one pushed chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChunkRecord {
    /// Monotonic chunk number within the session.
    pub sequence: u64,
    /// Steps returned by the policy.
    pub steps_received: usize,
    /// Steps appended to the queue.
    pub steps_queued: usize,
    /// Older steps dropped to make room.
    pub steps_trimmed: usize,
    /// When the chunk was pushed.
    pub received_at: DateTime<Utc>,
}

/// Which inputs have arrived since the last reset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DataStatus {
    /// At least one joint reading arrived.
    pub has_joint_data: bool,
    /// Camera → populated since last reset.
    pub cameras_populated: BTreeMap<String, bool>,
    /// Camera → frames accepted since last reset.
    pub frame_counts: BTreeMap<String, u64>,
}

/// Queue diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueInfo {
    /// Session id.
    pub session_id: String,
    /// Steps waiting to be sent.
    pub queue_length: usize,
    /// Append-with-cap bound.
    pub queue_cap: usize,
    /// Hard ceiling.
    pub max_queue_len: usize,
    /// Steps taken from each chunk.
    pub n_action_steps: usize,
    /// Control loop frequency.
    pub control_frequency_hz: f64,
    /// Inference loop frequency.
    pub inference_frequency_hz: f64,
    /// Most recent chunks, oldest first.
    pub recent_chunks: Vec<ChunkRecord>,
    /// Input readiness.
    pub data_status: DataStatus,
}

/// Lifecycle notification broadcast by the registry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionEvent {
    /// Session that changed.
    pub session_id: String,
    /// State entered.
    pub state: SessionState,
    /// Error message when `state` is `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}
