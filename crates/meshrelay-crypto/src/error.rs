//! Error types for mesh broadcast cryptography.

use thiserror::Error;

/// Errors from mesh key derivation or broadcast encrypt/decrypt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD decryption failed (wrong key, corrupted ciphertext, or tampering).
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Human-readable failure reason (never includes key material).
        reason: String,
    },

    /// Ciphertext was too short to contain a nonce and an authentication tag.
    #[error("ciphertext too short: {len} bytes, need at least {min}")]
    CiphertextTooShort {
        /// Length of the ciphertext that was passed in.
        len: usize,
        /// Minimum length (nonce + tag) required.
        min: usize,
    },
}
