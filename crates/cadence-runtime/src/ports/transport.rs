//! Transport port: pub/sub rooms grouped into workspaces.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cadence_core::{ImageFrame, JointCommand, JointValue, RoomId, TransportError, WorkspaceId};
use serde::Serialize;

/// What a room carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    /// Video from one camera.
    Camera,
    /// Joint readings from the robot.
    JointInput,
    /// Joint commands to the robot.
    JointOutput,
}

/// A message on a room.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A camera frame.
    Frame(ImageFrame),
    /// A joint reading keyed by canonical or robot joint name.
    Joints(Vec<JointValue>),
    /// Outgoing joint commands, robot-named.
    Commands(Vec<JointCommand>),
}

impl Payload {
    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Frame(_) => "frame",
            Self::Joints(_) => "joints",
            Self::Commands(_) => "commands",
        }
    }
}

/// Callback invoked for every message delivered to a subscription.
///
/// Handlers run on the transport's delivery path and must not block.
pub type MessageHandler = Arc<dyn Fn(Payload) + Send + Sync>;

/// Handle returned by [`TransportPort::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// External pub/sub room capability.
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Create a room named `name`.
    ///
    /// With `workspace = None` the transport assigns a workspace. Returns the
    /// workspace the room lives in and the room id.
    async fn create_room(
        &self,
        workspace: Option<&WorkspaceId>,
        name: &str,
        kind: RoomKind,
    ) -> Result<(WorkspaceId, RoomId), TransportError>;

    /// Publish a message to every subscriber of `room`.
    async fn publish(&self, room: &RoomId, payload: Payload) -> Result<(), TransportError>;

    /// Register `handler` for messages on `room`.
    async fn subscribe(
        &self,
        room: &RoomId,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, TransportError>;

    /// Release a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError>;

    /// Close a workspace and every room in it.
    async fn close_workspace(&self, workspace: &WorkspaceId) -> Result<(), TransportError>;
}
