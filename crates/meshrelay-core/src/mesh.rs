//! The mesh engine: encrypt-and-broadcast, decrypt-and-deliver, and relay.
//!
//! Every method here is pure: given a packet (or a locally-typed message)
//! and whatever time/randomness the caller already drew from its
//! [`crate::Environment`], each returns the [`MeshAction`]s the runtime
//! should perform. No method here opens a socket, sleeps, or reads the
//! clock itself — that split is what makes the dedup/relay/TTL logic
//! exhaustively unit-testable without spinning up any I/O.

use meshrelay_crypto::{MeshKey, NONCE_LEN, TAG_LEN, decrypt_broadcast, encrypt_broadcast};
use meshrelay_proto::{HEADER_SIZE, MAX_PAYLOAD, Packet, PacketFlags, PacketId, PROTO_VERSION, flags, make_packet_id};

use crate::{error::CoreError, seen::SeenCache};

/// Largest plaintext message `send` will accept.
///
/// Equal to the wire payload budget minus broadcast-AEAD overhead (a
/// 24-byte nonce and a 16-byte tag), so an encrypted message always fits
/// within a single packet.
pub const MAX_MESSAGE_LEN: usize = MAX_PAYLOAD - (NONCE_LEN + TAG_LEN);

/// Tunable behavior of a [`MeshEngine`].
#[derive(Debug, Clone, Copy)]
pub struct MeshConfig {
    /// TTL stamped on locally-originated packets, and the baseline used to
    /// compute a received packet's hop count.
    pub default_ttl: u8,
    /// Whether this node forwards packets it did not originate.
    pub relay_enabled: bool,
    /// Whether a packet that fails decryption is still relayed.
    ///
    /// Defaults to `true`: a relay has no way to distinguish "not meant for
    /// this mesh" from "corrupted in transit", and refusing to forward on
    /// decrypt failure would let a single bad actor's junk traffic degrade
    /// delivery for everyone downstream.
    pub relay_on_decrypt_failure: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self { default_ttl: 7, relay_enabled: true, relay_on_decrypt_failure: true }
    }
}

/// Running counters for a [`MeshEngine`], surfaced by the `/stats` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeshStats {
    /// Packets this node originated.
    pub packets_sent: u64,
    /// Packets accepted as new (not a duplicate, not malformed).
    pub packets_received: u64,
    /// Packets forwarded to other peers.
    pub packets_relayed: u64,
    /// Packets rejected: malformed, wrong version, or already seen.
    pub packets_dropped: u64,
}

/// Severity for a [`MeshAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Routine, high-volume events (duplicate drops).
    Debug,
    /// Normal operational events (sent, relayed).
    Info,
    /// Recoverable problems worth surfacing (decrypt failure, decode error).
    Warn,
}

/// A side effect the runtime must perform on behalf of the mesh engine.
#[derive(Debug, Clone)]
pub enum MeshAction {
    /// Write `wire` to every connected peer except the slot named by
    /// `except` (`None` means every peer — used for locally-originated
    /// sends, where there is no "source" peer to exclude).
    Broadcast {
        /// Encoded packet bytes (header + payload, no length prefix — the
        /// transport layer is responsible for framing this onto the
        /// stream).
        wire: Vec<u8>,
        /// Peer slot index to exclude, if any.
        except: Option<usize>,
    },
    /// Hand a decrypted message to the user-facing side of the runtime.
    Deliver {
        /// Decrypted message bytes.
        plaintext: Vec<u8>,
        /// Hops the packet took before reaching this node.
        hops: u8,
    },
    /// Emit a structured log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Human-readable message.
        message: String,
    },
}

/// The mesh engine: owns the duplicate cache, the broadcast key, and the
/// running counters, and drives `send`/`receive` against them.
pub struct MeshEngine {
    seen: SeenCache,
    mesh_key: MeshKey,
    config: MeshConfig,
    stats: MeshStats,
}

impl MeshEngine {
    /// Build a new engine around `mesh_key` with the given `config`.
    #[must_use]
    pub fn new(mesh_key: MeshKey, config: MeshConfig) -> Self {
        Self { seen: SeenCache::new(), mesh_key, config, stats: MeshStats::default() }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> MeshStats {
        self.stats
    }

    /// Encrypt and broadcast a locally-originated message.
    ///
    /// Pre-seeds the new packet's ID into the seen cache before returning,
    /// so this node's own broadcast is suppressed rather than relayed (or
    /// delivered a second time) if it loops back through a peer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MessageTooLarge`] if `message` would not fit in
    /// a single packet once encrypted.
    pub fn send(
        &mut self,
        message: &[u8],
        now: u64,
        random_nonce: [u8; NONCE_LEN],
        random_id: [u8; 8],
    ) -> Result<Vec<MeshAction>, CoreError> {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(CoreError::MessageTooLarge { len: message.len(), max: MAX_MESSAGE_LEN });
        }

        let ciphertext = encrypt_broadcast(&self.mesh_key, message, random_nonce);
        let packet_id = make_packet_id(&ciphertext, random_id);
        self.seen.add(packet_id, now);

        let packet = Packet {
            version: PROTO_VERSION,
            packet_id,
            ttl: self.config.default_ttl,
            flags: PacketFlags::empty().with(flags::ENCRYPTED).with(flags::BROADCAST),
            payload: ciphertext.into(),
        };

        let mut wire = Vec::with_capacity(packet.encoded_len());
        // INVARIANT: a freshly-built packet's payload is bounded by
        // MAX_MESSAGE_LEN + AEAD overhead == MAX_PAYLOAD, checked above.
        #[allow(clippy::expect_used)]
        packet.encode(&mut wire).expect("locally-built packet always fits MAX_PAYLOAD");

        self.stats.packets_sent += 1;

        Ok(vec![
            MeshAction::Log {
                level: LogLevel::Info,
                message: format!("sent packet {} ({} bytes, ttl {})", hex_id(&packet_id), wire.len(), packet.ttl),
            },
            MeshAction::Broadcast { wire, except: None },
        ])
    }

    /// Process a raw packet that arrived from peer slot `source`.
    pub fn receive(&mut self, raw: &[u8], source: usize, now: u64) -> Vec<MeshAction> {
        let packet = match Packet::decode(raw) {
            Ok(packet) => packet,
            Err(err) => {
                self.stats.packets_dropped += 1;
                return vec![MeshAction::Log { level: LogLevel::Warn, message: format!("dropping malformed packet: {err}") }];
            },
        };

        if self.seen.check(packet.packet_id, now) {
            self.stats.packets_dropped += 1;
            return vec![MeshAction::Log {
                level: LogLevel::Debug,
                message: format!("dropping duplicate packet {}", hex_id(&packet.packet_id)),
            }];
        }

        self.seen.add(packet.packet_id, now);
        self.stats.packets_received += 1;

        let mut actions = Vec::new();
        let mut decrypt_failed = false;

        if packet.flags.contains(flags::ENCRYPTED) {
            match decrypt_broadcast(&self.mesh_key, &packet.payload) {
                Ok(plaintext) => {
                    // A packet received straight from its origin (no relay
                    // in between) has traveled one hop, not zero: ttl is
                    // still `default_ttl` at that point, and each relay
                    // hop decrements it by exactly one before forwarding.
                    let hops = self.config.default_ttl.saturating_sub(packet.ttl).saturating_add(1);
                    actions.push(MeshAction::Deliver { plaintext, hops });
                },
                Err(err) => {
                    decrypt_failed = true;
                    actions.push(MeshAction::Log {
                        level: LogLevel::Warn,
                        message: format!("failed to decrypt packet {}: {err}", hex_id(&packet.packet_id)),
                    });
                },
            }
        } else {
            actions.push(MeshAction::Log {
                level: LogLevel::Debug,
                message: format!("received unencrypted packet {} (not delivered)", hex_id(&packet.packet_id)),
            });
        }

        if self.config.relay_enabled && (!decrypt_failed || self.config.relay_on_decrypt_failure) {
            actions.extend(self.relay(packet, source));
        }

        actions
    }

    /// Forward `packet` (already accepted by [`MeshEngine::receive`]) to
    /// every peer except `source`, decrementing its TTL.
    ///
    /// A packet whose TTL has already reached 1 is end-of-line: it is not
    /// forwarded, and this is not counted as a drop (it was successfully
    /// received and possibly delivered; it simply goes no further).
    fn relay(&mut self, mut packet: Packet, source: usize) -> Vec<MeshAction> {
        if packet.ttl <= 1 {
            return vec![MeshAction::Log {
                level: LogLevel::Debug,
                message: format!("packet {} reached end of line, not relaying", hex_id(&packet.packet_id)),
            }];
        }

        packet.ttl -= 1;

        let mut wire = Vec::with_capacity(HEADER_SIZE + packet.payload.len());
        // INVARIANT: this packet was just decoded from the wire, so its
        // payload already satisfies the MAX_PAYLOAD bound.
        #[allow(clippy::expect_used)]
        packet.encode(&mut wire).expect("previously-decoded packet re-encodes within MAX_PAYLOAD");

        self.stats.packets_relayed += 1;

        vec![
            MeshAction::Log {
                level: LogLevel::Info,
                message: format!("relayed packet {} (ttl now {})", hex_id(&packet.packet_id), packet.ttl),
            },
            MeshAction::Broadcast { wire, except: Some(source) },
        ]
    }

    /// Drop any seen-cache entries older than the dedup window.
    ///
    /// The runtime calls this periodically (spec calls for roughly every
    /// ten seconds); the engine itself has no timer.
    pub fn prune_seen(&mut self, now: u64) {
        self.seen.prune(now);
    }
}

fn hex_id(id: &PacketId) -> String {
    id.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MeshEngine {
        MeshEngine::new(meshrelay_crypto::derive_mesh_key("meshrelay-test"), MeshConfig::default())
    }

    #[test]
    fn send_rejects_oversized_message() {
        let mut engine = engine();
        let oversized = vec![0u8; MAX_MESSAGE_LEN + 1];
        let result = engine.send(&oversized, 0, [0u8; NONCE_LEN], [0u8; 8]);
        assert!(matches!(result, Err(CoreError::MessageTooLarge { .. })));
    }

    #[test]
    fn send_produces_a_broadcast_to_everyone() {
        let mut engine = engine();
        let actions = engine.send(b"hello", 0, [1u8; NONCE_LEN], [2u8; 8]).unwrap();
        let broadcast = actions.iter().find_map(|a| match a {
            MeshAction::Broadcast { wire, except } => Some((wire.clone(), *except)),
            MeshAction::Log { .. } => None,
            MeshAction::Deliver { .. } => None,
        });
        let (wire, except) = broadcast.expect("send must broadcast");
        assert!(except.is_none());
        assert!(wire.len() > HEADER_SIZE);
        assert_eq!(engine.stats().packets_sent, 1);
    }

    #[test]
    fn own_broadcast_is_pre_seeded_against_echo() {
        let mut engine = engine();
        let actions = engine.send(b"hello", 0, [3u8; NONCE_LEN], [4u8; 8]).unwrap();
        let wire = actions
            .into_iter()
            .find_map(|a| match a {
                MeshAction::Broadcast { wire, .. } => Some(wire),
                _ => None,
            })
            .unwrap();

        // The same bytes looping back through a peer must be dropped as a
        // duplicate, not re-delivered or re-relayed.
        let actions = engine.receive(&wire, 0, 0);
        assert!(actions.iter().all(|a| !matches!(a, MeshAction::Deliver { .. })));
        assert_eq!(engine.stats().packets_dropped, 1);
    }

    #[test]
    fn receive_decrypts_and_delivers() {
        let key = meshrelay_crypto::derive_mesh_key("meshrelay-test");
        let mut sender = MeshEngine::new(key.clone(), MeshConfig::default());
        let mut receiver = MeshEngine::new(key, MeshConfig::default());

        let wire = sender
            .send(b"hello mesh", 0, [5u8; NONCE_LEN], [6u8; 8])
            .unwrap()
            .into_iter()
            .find_map(|a| match a {
                MeshAction::Broadcast { wire, .. } => Some(wire),
                _ => None,
            })
            .unwrap();

        let actions = receiver.receive(&wire, 0, 0);
        let delivered = actions.iter().find_map(|a| match a {
            MeshAction::Deliver { plaintext, hops } => Some((plaintext.clone(), *hops)),
            _ => None,
        });
        let (plaintext, hops) = delivered.expect("must deliver");
        assert_eq!(plaintext, b"hello mesh");
        assert_eq!(hops, 1, "a packet received straight from its origin has traveled one hop");
        assert_eq!(receiver.stats().packets_received, 1);
    }

    #[test]
    fn relay_decrements_ttl_and_excludes_source() {
        let key = meshrelay_crypto::derive_mesh_key("meshrelay-test");
        let mut sender = MeshEngine::new(key.clone(), MeshConfig::default());
        let mut relayer = MeshEngine::new(key, MeshConfig::default());

        let wire = sender
            .send(b"relay me", 0, [7u8; NONCE_LEN], [8u8; 8])
            .unwrap()
            .into_iter()
            .find_map(|a| match a {
                MeshAction::Broadcast { wire, .. } => Some(wire),
                _ => None,
            })
            .unwrap();

        let actions = relayer.receive(&wire, 3, 0);
        let (relayed_wire, except) = actions
            .into_iter()
            .find_map(|a| match a {
                MeshAction::Broadcast { wire, except } => Some((wire, except)),
                _ => None,
            })
            .expect("must relay");

        assert_eq!(except, Some(3));
        let relayed = Packet::decode(&relayed_wire).unwrap();
        assert_eq!(relayed.ttl, MeshConfig::default().default_ttl - 1);
        assert_eq!(relayer.stats().packets_relayed, 1);
    }

    #[test]
    fn packet_at_ttl_one_is_not_relayed() {
        let key = meshrelay_crypto::derive_mesh_key("meshrelay-test");
        let mut relayer = MeshEngine::new(key.clone(), MeshConfig::default());

        let ciphertext = encrypt_broadcast(&key, b"last hop", [9u8; NONCE_LEN]);
        let packet_id = make_packet_id(&ciphertext, [10u8; 8]);
        let packet = Packet {
            version: PROTO_VERSION,
            packet_id,
            ttl: 1,
            flags: PacketFlags::empty().with(flags::ENCRYPTED).with(flags::BROADCAST),
            payload: ciphertext.into(),
        };
        let mut wire = Vec::new();
        packet.encode(&mut wire).unwrap();

        let actions = relayer.receive(&wire, 2, 0);
        assert!(actions.iter().all(|a| !matches!(a, MeshAction::Broadcast { .. })));
        assert_eq!(relayer.stats().packets_relayed, 0);
    }

    #[test]
    fn decrypt_failure_still_relays_by_default() {
        let wrong_key = meshrelay_crypto::derive_mesh_key("meshrelay-test-a");
        let right_key = meshrelay_crypto::derive_mesh_key("meshrelay-test-b");
        let ciphertext = encrypt_broadcast(&wrong_key, b"garbled", [11u8; NONCE_LEN]);
        let packet_id = make_packet_id(&ciphertext, [12u8; 8]);
        let packet = Packet {
            version: PROTO_VERSION,
            packet_id,
            ttl: 7,
            flags: PacketFlags::empty().with(flags::ENCRYPTED).with(flags::BROADCAST),
            payload: ciphertext.into(),
        };
        let mut wire = Vec::new();
        packet.encode(&mut wire).unwrap();

        let mut relayer = MeshEngine::new(right_key, MeshConfig::default());
        let actions = relayer.receive(&wire, 0, 0);
        assert!(actions.iter().any(|a| matches!(a, MeshAction::Broadcast { .. })));
        assert!(actions.iter().all(|a| !matches!(a, MeshAction::Deliver { .. })));
    }

    #[test]
    fn decrypt_failure_does_not_relay_when_configured_off() {
        let wrong_key = meshrelay_crypto::derive_mesh_key("meshrelay-test-a");
        let right_key = meshrelay_crypto::derive_mesh_key("meshrelay-test-b");
        let ciphertext = encrypt_broadcast(&wrong_key, b"garbled", [13u8; NONCE_LEN]);
        let packet_id = make_packet_id(&ciphertext, [14u8; 8]);
        let packet = Packet {
            version: PROTO_VERSION,
            packet_id,
            ttl: 7,
            flags: PacketFlags::empty().with(flags::ENCRYPTED).with(flags::BROADCAST),
            payload: ciphertext.into(),
        };
        let mut wire = Vec::new();
        packet.encode(&mut wire).unwrap();

        let config = MeshConfig { relay_on_decrypt_failure: false, ..MeshConfig::default() };
        let mut relayer = MeshEngine::new(right_key, config);
        let actions = relayer.receive(&wire, 0, 0);
        assert!(actions.iter().all(|a| !matches!(a, MeshAction::Broadcast { .. })));
    }

    #[test]
    fn relay_disabled_never_forwards() {
        let key = meshrelay_crypto::derive_mesh_key("meshrelay-test");
        let mut sender = MeshEngine::new(key.clone(), MeshConfig::default());
        let config = MeshConfig { relay_enabled: false, ..MeshConfig::default() };
        let mut relayer = MeshEngine::new(key, config);

        let wire = sender
            .send(b"no relay please", 0, [15u8; NONCE_LEN], [16u8; 8])
            .unwrap()
            .into_iter()
            .find_map(|a| match a {
                MeshAction::Broadcast { wire, .. } => Some(wire),
                _ => None,
            })
            .unwrap();

        let actions = relayer.receive(&wire, 0, 0);
        assert!(actions.iter().all(|a| !matches!(a, MeshAction::Broadcast { .. })));
    }

    #[test]
    fn malformed_packet_is_dropped() {
        let mut engine = engine();
        let actions = engine.receive(&[0xFFu8; 3], 0, 0);
        assert_eq!(engine.stats().packets_dropped, 1);
        assert!(actions.iter().all(|a| !matches!(a, MeshAction::Deliver { .. })));
    }
}
