//! In-process transport: workspaces → rooms → subscribers.
//!
//! Delivery is synchronous: `publish` invokes every subscriber's handler
//! before returning. Handlers are called outside the internal lock, so a
//! handler may publish again.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use cadence_core::{RoomId, TransportError, WorkspaceId};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::ports::transport::{MessageHandler, Payload, RoomKind, SubscriptionId, TransportPort};

struct Room {
    workspace: WorkspaceId,
    kind: RoomKind,
    subscribers: Vec<(SubscriptionId, MessageHandler)>,
}

#[derive(Default)]
struct LoopbackState {
    workspaces: HashMap<WorkspaceId, BTreeSet<RoomId>>,
    rooms: HashMap<RoomId, Room>,
    subscriptions: HashMap<SubscriptionId, RoomId>,
}

/// In-process [`TransportPort`].
///
/// Reachability can be toggled to simulate a lost server: while unreachable
/// every operation fails with [`TransportError::Unreachable`].
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
    reachable: AtomicBool,
    next_subscription: AtomicU64,
    delivered: AtomicU64,
}

impl LoopbackTransport {
    /// Create a reachable, empty transport.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoopbackState::default()),
            reachable: AtomicBool::new(true),
            next_subscription: AtomicU64::new(1),
            delivered: AtomicU64::new(0),
        }
    }

    /// Simulate the server going away or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        debug!(reachable, "loopback reachability changed");
    }

    /// Whether operations currently succeed.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Number of open workspaces.
    pub fn workspace_count(&self) -> usize {
        self.state.lock().workspaces.len()
    }

    /// Number of open rooms across all workspaces.
    pub fn room_count(&self) -> usize {
        self.state.lock().rooms.len()
    }

    /// Kind of `room`, if it exists.
    pub fn room_kind(&self, room: &RoomId) -> Option<RoomKind> {
        self.state.lock().rooms.get(room).map(|r| r.kind)
    }

    /// Number of live subscriptions on `room`.
    pub fn subscriber_count(&self, room: &RoomId) -> usize {
        self.state
            .lock()
            .rooms
            .get(room)
            .map_or(0, |r| r.subscribers.len())
    }

    /// Total handler invocations since creation.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    fn check_reachable(&self) -> Result<(), TransportError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(TransportError::Unreachable("loopback transport offline".into()))
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportPort for LoopbackTransport {
    async fn create_room(
        &self,
        workspace: Option<&WorkspaceId>,
        name: &str,
        kind: RoomKind,
    ) -> Result<(WorkspaceId, RoomId), TransportError> {
        self.check_reachable()?;
        let workspace = workspace.cloned().unwrap_or_else(WorkspaceId::generate);
        let room_id = RoomId::new(format!("{workspace}/{name}"));

        let mut state = self.state.lock();
        let _ = state
            .workspaces
            .entry(workspace.clone())
            .or_default()
            .insert(room_id.clone());
        let _ = state.rooms.entry(room_id.clone()).or_insert_with(|| Room {
            workspace: workspace.clone(),
            kind,
            subscribers: Vec::new(),
        });
        debug!(%workspace, room = %room_id, ?kind, "room created");
        Ok((workspace, room_id))
    }

    async fn publish(&self, room: &RoomId, payload: Payload) -> Result<(), TransportError> {
        self.check_reachable()?;
        let handlers: Vec<MessageHandler> = {
            let state = self.state.lock();
            let target = state
                .rooms
                .get(room)
                .ok_or_else(|| TransportError::UnknownRoom(room.to_string()))?;
            target.subscribers.iter().map(|(_, h)| h.clone()).collect()
        };
        trace!(room = %room, kind = payload.kind(), subscribers = handlers.len(), "publish");
        for handler in &handlers {
            handler(payload.clone());
        }
        let _ = self
            .delivered
            .fetch_add(handlers.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn subscribe(
        &self,
        room: &RoomId,
        handler: MessageHandler,
    ) -> Result<SubscriptionId, TransportError> {
        self.check_reachable()?;
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock();
        let target = state
            .rooms
            .get_mut(room)
            .ok_or_else(|| TransportError::UnknownRoom(room.to_string()))?;
        target.subscribers.push((id, handler));
        let _ = state.subscriptions.insert(id, room.clone());
        debug!(room = %room, subscription = %id, "subscribed");
        Ok(id)
    }

    async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        if let Some(room_id) = state.subscriptions.remove(&subscription) {
            if let Some(room) = state.rooms.get_mut(&room_id) {
                room.subscribers.retain(|(id, _)| *id != subscription);
            }
        }
        Ok(())
    }

    async fn close_workspace(&self, workspace: &WorkspaceId) -> Result<(), TransportError> {
        self.check_reachable()?;
        let mut state = self.state.lock();
        let Some(rooms) = state.workspaces.remove(workspace) else {
            return Err(TransportError::UnknownRoom(format!("workspace {workspace}")));
        };
        for room_id in &rooms {
            if let Some(room) = state.rooms.remove(room_id) {
                debug_assert_eq!(&room.workspace, workspace);
                for (sub, _) in room.subscribers {
                    let _ = state.subscriptions.remove(&sub);
                }
            }
        }
        debug!(%workspace, rooms = rooms.len(), "workspace closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use cadence_core::JointValue;

    use super::*;

    fn counting_handler() -> (MessageHandler, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let handler: MessageHandler = Arc::new(move |_payload: Payload| {
            let _ = c.fetch_add(1, Ordering::SeqCst);
        });
        (handler, count)
    }

    fn joints() -> Payload {
        Payload::Joints(vec![JointValue {
            name: "Jaw".into(),
            value: 10.0,
        }])
    }

    #[tokio::test]
    async fn create_room_assigns_workspace() {
        let t = LoopbackTransport::new();
        let (ws, room) = t.create_room(None, "s1-front", RoomKind::Camera).await.unwrap();
        assert!(!ws.as_str().is_empty());
        assert!(room.as_str().ends_with("s1-front"));

        let (ws2, _) = t
            .create_room(Some(&ws), "s1-joint-input", RoomKind::JointInput)
            .await
            .unwrap();
        assert_eq!(ws, ws2);
        assert_eq!(t.workspace_count(), 1);
        assert_eq!(t.room_count(), 2);
        assert_eq!(t.room_kind(&room), Some(RoomKind::Camera));
    }

    #[tokio::test]
    async fn fresh_workspaces_are_distinct() {
        let t = LoopbackTransport::new();
        let (a, _) = t.create_room(None, "a", RoomKind::Camera).await.unwrap();
        let (b, _) = t.create_room(None, "b", RoomKind::Camera).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let t = LoopbackTransport::new();
        let (_, room) = t.create_room(None, "r", RoomKind::JointInput).await.unwrap();
        let (h1, c1) = counting_handler();
        let (h2, c2) = counting_handler();
        let _ = t.subscribe(&room, h1).await.unwrap();
        let _ = t.subscribe(&room, h2).await.unwrap();

        t.publish(&room, joints()).await.unwrap();
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
        assert_eq!(t.delivered_count(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let t = LoopbackTransport::new();
        let (_, room) = t.create_room(None, "r", RoomKind::JointInput).await.unwrap();
        let (h, c) = counting_handler();
        let sub = t.subscribe(&room, h).await.unwrap();
        t.unsubscribe(sub).await.unwrap();
        assert_eq!(t.subscriber_count(&room), 0);

        t.publish(&room, joints()).await.unwrap();
        assert_eq!(c.load(Ordering::SeqCst), 0);
        // unknown subscriptions are ignored
        t.unsubscribe(sub).await.unwrap();
    }

    #[tokio::test]
    async fn publish_to_unknown_room_fails() {
        let t = LoopbackTransport::new();
        let err = t.publish(&RoomId::new("nope"), joints()).await.unwrap_err();
        assert_matches!(err, TransportError::UnknownRoom(_));
    }

    #[tokio::test]
    async fn unreachable_rejects_everything() {
        let t = LoopbackTransport::new();
        let (ws, room) = t.create_room(None, "r", RoomKind::Camera).await.unwrap();
        t.set_reachable(false);

        assert_matches!(
            t.create_room(None, "x", RoomKind::Camera).await,
            Err(TransportError::Unreachable(_))
        );
        assert_matches!(
            t.publish(&room, joints()).await,
            Err(TransportError::Unreachable(_))
        );
        let (h, _) = counting_handler();
        assert_matches!(
            t.subscribe(&room, h).await,
            Err(TransportError::Unreachable(_))
        );
        assert_matches!(
            t.close_workspace(&ws).await,
            Err(TransportError::Unreachable(_))
        );

        t.set_reachable(true);
        t.close_workspace(&ws).await.unwrap();
    }

    #[tokio::test]
    async fn close_workspace_drops_rooms_and_subscriptions() {
        let t = LoopbackTransport::new();
        let (ws, room) = t.create_room(None, "r1", RoomKind::Camera).await.unwrap();
        let _ = t
            .create_room(Some(&ws), "r2", RoomKind::JointOutput)
            .await
            .unwrap();
        let (h, _) = counting_handler();
        let _ = t.subscribe(&room, h).await.unwrap();

        t.close_workspace(&ws).await.unwrap();
        assert_eq!(t.room_count(), 0);
        assert_eq!(t.workspace_count(), 0);
        assert_matches!(
            t.publish(&room, joints()).await,
            Err(TransportError::UnknownRoom(_))
        );
        assert_matches!(
            t.close_workspace(&ws).await,
            Err(TransportError::UnknownRoom(_))
        );
    }
}
