//! Filesystem-backed identity persistence.
//!
//! Implements [`KeyStore`] against `$HOME/.meshrelay/` (falling back to
//! `/tmp/.meshrelay` if `HOME` is unset), matching the reference node's key
//! file layout: `identity.key` holds a 32-byte Ed25519 public key followed
//! by its 32-byte seed, `ephemeral.key` holds a 32-byte X25519 public key
//! followed by its 32-byte seed. Both files are written with mode 0600 —
//! `meshrelay-core` never touches the filesystem itself, so this is the one
//! place that persistence lives.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use meshrelay_core::KeyStore;

const KEY_DIR_NAME: &str = ".meshrelay";
const SEED_LEN: usize = 32;
const FILE_LEN: usize = 64;

/// A [`KeyStore`] backed by two files under a fixed directory.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Build a store rooted at `$HOME/.meshrelay` (or `/tmp/.meshrelay` if
    /// `HOME` is unset).
    #[must_use]
    pub fn from_env() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/tmp"));
        Self { dir: home.join(KEY_DIR_NAME) }
    }

    /// Build a store rooted at an explicit directory. Used by tests so they
    /// never touch a real home directory.
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn identity_path(&self) -> PathBuf {
        self.dir.join("identity.key")
    }

    fn ephemeral_path(&self) -> PathBuf {
        self.dir.join("ephemeral.key")
    }

    fn try_save(&self, signing_seed: [u8; SEED_LEN], box_seed: [u8; SEED_LEN]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let identity = meshrelay_crypto::Identity::from_parts(signing_seed, box_seed);

        let mut identity_bytes = Vec::with_capacity(FILE_LEN);
        identity_bytes.extend_from_slice(&identity.verifying_key_bytes());
        identity_bytes.extend_from_slice(&signing_seed);
        write_private(&self.identity_path(), &identity_bytes)?;

        let mut ephemeral_bytes = Vec::with_capacity(FILE_LEN);
        ephemeral_bytes.extend_from_slice(identity.box_public_key().as_bytes());
        ephemeral_bytes.extend_from_slice(&box_seed);
        write_private(&self.ephemeral_path(), &ephemeral_bytes)?;

        Ok(())
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Option<([u8; SEED_LEN], [u8; SEED_LEN])> {
        let signing_seed = read_seed(&self.identity_path())?;
        // A missing ephemeral key is regenerated rather than treated as a
        // reason to discard the (present) long-lived signing identity too.
        let box_seed = read_seed(&self.ephemeral_path()).unwrap_or_else(|| {
            let mut seed = [0u8; SEED_LEN];
            // INVARIANT: OS RNG failure here is as unrecoverable as it is in
            // SystemEnv::random_bytes — a node cannot mint a box key without it.
            #[allow(clippy::expect_used)]
            getrandom::fill(&mut seed).expect("OS RNG must be available to regenerate ephemeral key");
            seed
        });
        Some((signing_seed, box_seed))
    }

    fn save(&self, signing_seed: [u8; SEED_LEN], box_seed: [u8; SEED_LEN]) {
        if let Err(err) = self.try_save(signing_seed, box_seed) {
            tracing::warn!("failed to persist node identity: {err}");
        }
    }
}

fn read_seed(path: &Path) -> Option<[u8; SEED_LEN]> {
    let bytes = fs::read(path).ok()?;
    if bytes.len() != FILE_LEN {
        return None;
    }
    let mut seed = [0u8; SEED_LEN];
    seed.copy_from_slice(&bytes[SEED_LEN..]);
    Some(seed)
}

fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}
