//! Error types for the mesh-relay protocol core.
//!
//! Strongly-typed errors for the sans-IO layers: mesh engine errors (bad
//! local input, crypto failures) and seen-cache/peer-table errors. We avoid
//! using `std::io::Error` here to keep the core crate free of any I/O
//! vocabulary; the runtime crate maps these onto its own error type at the
//! boundary.

use thiserror::Error;

/// Errors returned by [`crate::mesh::MeshEngine`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A locally-originated message did not fit within the payload budget
    /// once encryption overhead is accounted for.
    #[error("message too large: {len} bytes exceeds budget of {max}")]
    MessageTooLarge {
        /// Plaintext length the caller tried to send.
        len: usize,
        /// Maximum plaintext length accepted.
        max: usize,
    },

    /// Wire-level decode failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Broadcast encryption or decryption failure.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// No free slot remained in a fixed-capacity table.
    #[error("{what} table is full (capacity {capacity})")]
    TableFull {
        /// Name of the table that overflowed (seen cache, peer table).
        what: &'static str,
        /// Fixed capacity of that table.
        capacity: usize,
    },
}

impl From<meshrelay_proto::ProtocolError> for CoreError {
    fn from(err: meshrelay_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<meshrelay_crypto::CryptoError> for CoreError {
    fn from(err: meshrelay_crypto::CryptoError) -> Self {
        Self::Crypto(err.to_string())
    }
}
