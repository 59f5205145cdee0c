//! Session registry and lifecycle event broadcast.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `registry` | Id → `SessionManager` table, capacity limit, idle sweeper, shutdown |
//! | `event_emitter` | Broadcast channel for `SessionEvent` notifications |

pub mod event_emitter;
#[allow(clippy::module_inception)]
pub mod registry;
