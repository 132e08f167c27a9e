//! Node identity: a long-lived signing key and an ephemeral key-agreement
//! key.
//!
//! Neither key is consulted by the broadcast encrypt/decrypt path — the
//! mesh has one flat key, not a per-node one — but every node generates
//! and persists an identity, matching the reference node's on-disk key
//! files. Keeping identity material around is what a future
//! authenticated-peer or point-to-point extension would build on.

use ed25519_dalek::SigningKey;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// A node's signing and key-agreement material.
pub struct Identity {
    signing_key: SigningKey,
    box_key: StaticSecret,
}

impl Identity {
    /// Derive an identity from 64 bytes of randomness: the first 32 seed
    /// the Ed25519 signing key, the last 32 seed the X25519 box key.
    #[must_use]
    pub fn from_seed(seed: [u8; 64]) -> Self {
        let mut signing_seed = [0u8; 32];
        signing_seed.copy_from_slice(&seed[..32]);
        let mut box_seed = [0u8; 32];
        box_seed.copy_from_slice(&seed[32..]);

        Self { signing_key: SigningKey::from_bytes(&signing_seed), box_key: StaticSecret::from(box_seed) }
    }

    /// Reconstruct an identity from its two persisted seeds.
    #[must_use]
    pub fn from_parts(signing_seed: [u8; 32], box_seed: [u8; 32]) -> Self {
        Self { signing_key: SigningKey::from_bytes(&signing_seed), box_key: StaticSecret::from(box_seed) }
    }

    /// The raw 32-byte Ed25519 signing seed, for persistence.
    #[must_use]
    pub fn signing_seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The raw 32-byte X25519 box seed, for persistence.
    #[must_use]
    pub fn box_seed(&self) -> [u8; 32] {
        self.box_key.to_bytes()
    }

    /// The Ed25519 public key, used to derive a default node name.
    #[must_use]
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The X25519 public key.
    #[must_use]
    pub fn box_public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(&self.box_key)
    }
}
