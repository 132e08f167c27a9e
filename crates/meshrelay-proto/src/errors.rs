//! Error types for packet encoding and decoding.

use thiserror::Error;

/// Result alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding a [`crate::Packet`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload would make the encoded packet exceed [`crate::MAX_PACKET`].
    #[error("payload too large: {size} bytes exceeds max payload of {max}")]
    PayloadTooLarge {
        /// Payload length the caller tried to encode.
        size: usize,
        /// Maximum payload length accepted.
        max: usize,
    },

    /// Buffer was shorter than [`crate::HEADER_SIZE`].
    #[error("frame too short: {len} bytes, need at least {min}")]
    FrameTooShort {
        /// Length of the buffer that was passed in.
        len: usize,
        /// Minimum length required to hold a header.
        min: usize,
    },

    /// Header declared a version this crate does not understand.
    #[error("unsupported protocol version: {0:#04x}")]
    UnsupportedVersion(u8),
}
