//! # cadence-runtime
//!
//! Session lifecycle, the two per-session loops, and the session registry.
//!
//! - **Ports**: `PolicyPort` / `PolicyCatalog` for inference, `TransportPort` for
//!   pub/sub rooms, plus an in-process `LoopbackTransport`
//! - **Frame cache**: latest camera frames and joint state, written by transport handlers
//! - **Action queue**: bounded FIFO with the append-with-cap overlap rule
//! - **Inference loop**: snapshot → predict → queue, one call in flight, bounded by timeout
//! - **Control loop**: queue → clamp → publish at a fixed cadence
//! - **Session manager**: state machine, room setup, cooperative stop with a grace period
//! - **Registry**: id → session table, capacity limit, idle sweeper, lifecycle events
//!
//! ## Crate Position
//!
//! Top of the workspace. Depends on: cadence-core, cadence-settings.
//! Depended on by: host applications embedding the engine.

#![deny(unsafe_code)]

pub mod errors;
pub mod loops;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod session;

// Re-export main public API
pub use errors::RuntimeError;
pub use loops::{ControlLoop, ErrorSink, InferenceLoop, LoopExit};
pub use ports::catalog::PolicyCatalog;
pub use ports::loopback::LoopbackTransport;
pub use ports::policy::{
    FixedChunkFactory, FixedChunkPolicy, PolicyDescriptor, PolicyFactory, PolicyKind,
    PolicyLoadRequest, PolicyPort,
};
pub use ports::transport::{MessageHandler, Payload, RoomKind, SubscriptionId, TransportPort};
pub use registry::event_emitter::{EventEmitter, SessionEvents};
pub use registry::registry::{RegistryHealth, SessionRegistry};
pub use session::action_queue::{ActionQueue, PushOutcome};
pub use session::frame_cache::{FrameSnapshot, JointFrameCache, SnapshotResult};
pub use session::manager::{SessionDeps, SessionManager};
pub use session::stats::{InferenceStats, SessionStats};
pub use session::types::{
    ChunkRecord, DataStatus, QueueInfo, RoomIds, SessionConfig, SessionEvent, SessionState,
    SessionStatus,
};
