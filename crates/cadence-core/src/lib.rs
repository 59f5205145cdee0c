//! # cadence-core
//!
//! Foundation types for the Cadence inference session engine.
//!
//! This crate provides the shared vocabulary that the other Cadence crates depend on:
//!
//! - **Branded IDs**: [`ids::WorkspaceId`], [`ids::RoomId`] as newtypes
//! - **Joint tables**: [`joints::JointTable`] maps robot joint names onto the canonical
//!   order and clamps normalized values to their declared ranges
//! - **Actions**: [`action::ActionStep`] and [`action::ActionChunk`]
//! - **Frames**: [`frames::ImageFrame`] camera frames with size validation
//! - **Errors**: [`errors::PolicyError`] and [`errors::TransportError`] returned by the ports
//! - **Logging**: [`logging::init_logging`] tracing subscriber bootstrap
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `cadence-settings` and `cadence-runtime`.

#![deny(unsafe_code)]

pub mod action;
pub mod errors;
pub mod frames;
pub mod ids;
pub mod joints;
pub mod logging;

pub use action::{ActionChunk, ActionStep, JointValue};
pub use errors::{PolicyError, TransportError};
pub use frames::{FrameError, FrameFormat, ImageFrame};
pub use ids::{RoomId, WorkspaceId};
pub use joints::{JointCommand, JointRange, JointSpec, JointTable, SO100_TABLE};
