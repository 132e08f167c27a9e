//! Mesh broadcast cryptography.
//!
//! Cryptographic building blocks for a flat, single-key mesh: every node on
//! the mesh holds the same symmetric broadcast key, derived from a shared
//! service identifier rather than negotiated. There is no per-sender ratchet
//! and no forward secrecy across messages — the mesh has no group
//! membership protocol to rotate a key against, so none is modeled here.
//!
//! ```text
//! service identifier
//!        │
//!        ▼
//! SHA-512 (first 32 bytes) → mesh key
//!        │
//!        ▼
//! XChaCha20-Poly1305 (random 24-byte nonce) → ciphertext
//! ```
//!
//! Node identity (a long-lived Ed25519 signing key plus an ephemeral X25519
//! key-agreement key) is also provided here, as the shared key material a
//! node's local state holds. Neither key is used by the broadcast path
//! itself today — they exist so a future point-to-point or
//! authentication extension has somewhere to start from — but both are
//! generated and persisted as part of node identity.
//!
//! All functions are pure and take their randomness as a parameter, so
//! callers can test deterministically and production callers can source
//! randomness from the environment abstraction in `meshrelay-core`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod broadcast;
mod error;
mod identity;

pub use broadcast::{MESH_KEY_LEN, MeshKey, NONCE_LEN, TAG_LEN, decrypt_broadcast, derive_mesh_key, encrypt_broadcast};
pub use error::CryptoError;
pub use identity::Identity;
