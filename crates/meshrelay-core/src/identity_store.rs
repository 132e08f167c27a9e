//! Identity persistence abstraction.
//!
//! Trait-based so this crate never touches the filesystem directly; the
//! runtime crate implements it against `$HOME/.meshrelay/`.

/// Loads and saves a node's identity seed material.
///
/// Synchronous (this is a startup-time operation, not a hot path) and
/// infallible at the trait level — implementations surface I/O failures as
/// `panic!`-free `Option`s, matching how `meshrelay-crypto::Identity`
/// already treats "no identity yet" as the normal first-run case rather
/// than an error.
pub trait KeyStore {
    /// Load a previously-saved identity, if one exists.
    fn load(&self) -> Option<([u8; 32], [u8; 32])>;

    /// Persist an identity's seed material, overwriting any existing one.
    fn save(&self, signing_seed: [u8; 32], box_seed: [u8; 32]);
}

/// A [`KeyStore`] that never persists anything. Every load misses; every
/// save is discarded. Used by tests and the simulation harness so they
/// never touch the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullKeyStore;

impl KeyStore for NullKeyStore {
    fn load(&self) -> Option<([u8; 32], [u8; 32])> {
        None
    }

    fn save(&self, _signing_seed: [u8; 32], _box_seed: [u8; 32]) {}
}
