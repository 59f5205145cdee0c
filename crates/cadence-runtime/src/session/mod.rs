//! Per-session state and its owner.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `manager` | `SessionManager`: state machine, rooms, loop supervision |
//! | `frame_cache` | Latest frames and joint state, written by transport handlers |
//! | `action_queue` | Bounded FIFO between the inference and control loops |
//! | `stats` | Atomic counters and the activity clock |
//! | `types` | Config, status, and event payloads |

pub mod action_queue;
pub mod frame_cache;
pub mod manager;
pub mod stats;
pub mod types;
