//! Mesh key derivation and broadcast AEAD.

use chacha20poly1305::{
    KeyInit, XChaCha20Poly1305, XNonce,
    aead::{Aead, Payload},
};
use sha2::{Digest, Sha512};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

/// Length of the derived mesh key, in bytes.
pub const MESH_KEY_LEN: usize = 32;
/// Length of the random nonce prefixed to every ciphertext on the wire.
pub const NONCE_LEN: usize = 24;
/// Length of the Poly1305 authentication tag appended by the AEAD.
pub const TAG_LEN: usize = 16;

/// The symmetric key every node on a given mesh shares.
///
/// Zeroized on drop; there is exactly one of these per running node and it
/// lives for the process lifetime.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MeshKey([u8; MESH_KEY_LEN]);

impl MeshKey {
    /// Wrap a raw 32-byte key. Used by tests and by [`derive_mesh_key`].
    #[must_use]
    pub fn from_bytes(bytes: [u8; MESH_KEY_LEN]) -> Self {
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; MESH_KEY_LEN] {
        &self.0
    }
}

/// Derive the mesh broadcast key from a shared service identifier.
///
/// Every node that knows `service_id` (a fixed, out-of-band-agreed string —
/// not a secret, just a namespacing label) derives the same key: SHA-512 of
/// the identifier, keeping the first 32 bytes. There is no per-node
/// component, which is what makes this a flat broadcast key rather than a
/// per-peer shared secret.
#[must_use]
pub fn derive_mesh_key(service_id: &str) -> MeshKey {
    let digest = Sha512::digest(service_id.as_bytes());
    let mut key = [0u8; MESH_KEY_LEN];
    key.copy_from_slice(&digest[..MESH_KEY_LEN]);
    MeshKey(key)
}

/// Encrypt `plaintext` under `key`, using `random_nonce` as the AEAD nonce.
///
/// Output wire format is `nonce (24 bytes) || ciphertext+tag`. The nonce is
/// fully random (no epoch/sender/generation structure) because this is a
/// flat single-key scheme with no per-sender state to bind a nonce to;
/// 24 random bytes keeps the birthday-bound collision probability
/// negligible at the message volumes a mesh relay sees.
///
/// `random_nonce` is supplied by the caller rather than drawn internally so
/// this function stays pure; production callers source it from an injected
/// environment's RNG.
#[must_use]
pub fn encrypt_broadcast(key: &MeshKey, plaintext: &[u8], random_nonce: [u8; NONCE_LEN]) -> Vec<u8> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XNonce::from_slice(&random_nonce);

    // INVARIANT: encryption with a freshly random nonce and a fixed-length
    // key cannot fail for the `chacha20poly1305` crate's API.
    #[allow(clippy::expect_used)]
    let ciphertext =
        cipher.encrypt(nonce, Payload { msg: plaintext, aad: &[] }).expect("XChaCha20-Poly1305 encryption is infallible");

    let mut wire = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    wire.extend_from_slice(&random_nonce);
    wire.extend_from_slice(&ciphertext);
    wire
}

/// Decrypt a `nonce || ciphertext` wire payload produced by
/// [`encrypt_broadcast`].
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if `wire` cannot possibly
/// contain a nonce and a tag, or [`CryptoError::DecryptionFailed`] if
/// authentication fails (wrong key or tampered ciphertext).
pub fn decrypt_broadcast(key: &MeshKey, wire: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if wire.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::CiphertextTooShort { len: wire.len(), min: NONCE_LEN + TAG_LEN });
    }

    let (nonce_bytes, ciphertext) = wire.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: &[] })
        .map_err(|_| CryptoError::DecryptionFailed { reason: "authentication tag mismatch".to_string() })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn derive_mesh_key_is_deterministic() {
        let a = derive_mesh_key("meshrelay/v1");
        let b = derive_mesh_key("meshrelay/v1");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_service_ids_give_different_keys() {
        let a = derive_mesh_key("meshrelay/v1");
        let b = derive_mesh_key("meshrelay/v2");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let key = derive_mesh_key("meshrelay/v1");
        let wire = encrypt_broadcast(&key, b"hello mesh", [7u8; NONCE_LEN]);
        let plaintext = decrypt_broadcast(&key, &wire).expect("should decrypt");
        assert_eq!(plaintext, b"hello mesh");
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let key = derive_mesh_key("meshrelay/v1");
        let wire = encrypt_broadcast(&key, b"", [1u8; NONCE_LEN]);
        let plaintext = decrypt_broadcast(&key, &wire).expect("should decrypt");
        assert!(plaintext.is_empty());
    }

    #[test]
    fn wire_length_matches_nonce_plus_ciphertext_plus_tag() {
        let key = derive_mesh_key("meshrelay/v1");
        let wire = encrypt_broadcast(&key, b"twelve bytes", [0u8; NONCE_LEN]);
        assert_eq!(wire.len(), NONCE_LEN + "twelve bytes".len() + TAG_LEN);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let key_a = derive_mesh_key("meshrelay/v1");
        let key_b = derive_mesh_key("meshrelay/v2");
        let wire = encrypt_broadcast(&key_a, b"hello mesh", [3u8; NONCE_LEN]);
        let result = decrypt_broadcast(&key_b, &wire);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed { .. })));
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        let key = derive_mesh_key("meshrelay/v1");
        let mut wire = encrypt_broadcast(&key, b"hello mesh", [9u8; NONCE_LEN]);
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        let result = decrypt_broadcast(&key, &wire);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed { .. })));
    }

    #[test]
    fn short_ciphertext_is_rejected_before_decrypting() {
        let key = derive_mesh_key("meshrelay/v1");
        let result = decrypt_broadcast(&key, &[0u8; 4]);
        assert!(matches!(result, Err(CryptoError::CiphertextTooShort { .. })));
    }

    proptest! {
        #[test]
        fn different_random_nonce_gives_different_wire_bytes(
            a in any::<[u8; NONCE_LEN]>(),
            b in any::<[u8; NONCE_LEN]>(),
        ) {
            prop_assume!(a != b);
            let key = derive_mesh_key("meshrelay/v1");
            let wire_a = encrypt_broadcast(&key, b"same plaintext", a);
            let wire_b = encrypt_broadcast(&key, b"same plaintext", b);
            prop_assert_ne!(wire_a, wire_b);
        }

        #[test]
        fn arbitrary_plaintext_round_trips(plaintext in proptest::collection::vec(any::<u8>(), 0..256), nonce in any::<[u8; NONCE_LEN]>()) {
            let key = derive_mesh_key("meshrelay/v1");
            let wire = encrypt_broadcast(&key, &plaintext, nonce);
            let decrypted = decrypt_broadcast(&key, &wire).expect("should decrypt");
            prop_assert_eq!(decrypted, plaintext);
        }
    }
}
