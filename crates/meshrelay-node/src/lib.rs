//! Mesh-relay production runtime.
//!
//! Wires the sans-IO [`meshrelay_core::MeshEngine`] to real sockets, stdin,
//! the wall clock, and the filesystem. This crate is deliberately thin:
//! [`transport`] frames bytes over TCP, [`identity`] persists a node's keys,
//! [`system_env`] supplies real time and randomness, and the runtime module
//! drives the single-task event loop that ties them together. Everything
//! that can be tested without a socket lives in `meshrelay-core` instead.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod error;
pub mod identity;
mod runtime;
pub mod system_env;
pub mod transport;

pub use error::NodeError;
pub use identity::FileKeyStore;
pub use runtime::{run, NodeConfig};
pub use system_env::SystemEnv;
