//! Ports to the external collaborators.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `policy` | `PolicyPort` inference capability, kinds, descriptors, factories |
//! | `catalog` | Kind → factory table consulted at session creation |
//! | `transport` | `TransportPort` rooms, payloads, subscriptions |
//! | `loopback` | In-process `TransportPort` for simulation and tests |

pub mod catalog;
pub mod loopback;
pub mod policy;
pub mod transport;
