//! Runtime error type.
//!
//! Manual `Display`/`Error` impls rather than a `thiserror` derive here —
//! this is the crate boundary every lower-layer error eventually funnels
//! through on its way to `main`, and keeping the wrapping explicit makes it
//! obvious at a glance which layer each variant comes from.

use std::fmt;

use meshrelay_core::CoreError;

/// Errors that can occur in the node runtime.
#[derive(Debug)]
pub enum NodeError {
    /// Configuration error (invalid bind address, bad CLI flags, etc.).
    ///
    /// Fatal: prevents startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error (connection failure, I/O error, etc.).
    ///
    /// May be transient (one peer dropped) or fatal (bind address in use),
    /// depending on where it occurs.
    Transport(String),

    /// Error from the sans-IO mesh engine (`meshrelay-core`).
    Core(CoreError),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Core(err) => write!(f, "mesh engine error: {err}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Core(err) => Some(err),
            Self::Config(_) | Self::Transport(_) => None,
        }
    }
}

impl From<CoreError> for NodeError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

impl From<std::io::Error> for NodeError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
