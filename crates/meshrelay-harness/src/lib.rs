//! Deterministic simulation tooling for mesh-relay scenario tests.
//!
//! Two pieces live here:
//!
//! - [`SimEnv`]: a seeded, manually-advanced [`meshrelay_core::Environment`]
//!   so tests get reproducible packet IDs, nonces, and a wall clock they
//!   control instead of the real one.
//! - [`topology::SimMesh`]: a graph of [`meshrelay_core::MeshEngine`]
//!   instances wired together directly, without sockets — the same sans-IO
//!   split the engine itself is built on means an entire multi-hop mesh can
//!   be driven in-process by feeding each node's [`meshrelay_core::MeshAction`]s
//!   straight to its neighbors.
//!
//! Tests that need to exercise the real wire format over an actual network
//! reach for `turmoil` directly (see this crate's `tests/` directory)
//! instead of going through [`topology::SimMesh`], since the transport
//! framing lives in `meshrelay-node` and is deliberately not duplicated
//! here.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod sim_env;
pub mod topology;

pub use sim_env::SimEnv;
pub use topology::{DeliveredMessage, SimMesh};
