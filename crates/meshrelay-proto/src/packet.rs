//! Packet header codec and packet-ID derivation.

use bytes::{BufMut, Bytes};
use sha2::{Digest, Sha512};

use crate::{ProtocolError, Result, flags::PacketFlags};

/// Protocol version this crate encodes and expects to decode.
pub const PROTO_VERSION: u8 = 0x01;
/// Largest packet (header + payload) this protocol ever puts on the wire.
pub const MAX_PACKET: usize = 512;
/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 11;
/// Largest payload a single packet can carry.
pub const MAX_PAYLOAD: usize = MAX_PACKET - HEADER_SIZE;

/// An 8-byte packet identifier used for loop suppression.
///
/// Not a cryptographic commitment to the payload — collisions are
/// acceptable at the rate produced by 8 random bytes per invariant 8 of the
/// relay's duplicate-suppression design; this only needs to be unlikely to
/// collide across [`crate::MAX_PACKET`]-sized traffic within a 60-second
/// window.
pub type PacketId = [u8; 8];

/// A complete mesh-relay packet: header fields plus payload bytes.
///
/// `payload` here is already ciphertext (or plaintext, if the `ENCRYPTED`
/// flag is unset) — this crate performs no encryption itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Protocol version the packet was encoded with.
    pub version: u8,
    /// Identifier used to detect and suppress duplicate relays.
    pub packet_id: PacketId,
    /// Remaining hop budget. Decremented by one hop on each relay.
    pub ttl: u8,
    /// Flag bits (encrypted, broadcast, ack-requested).
    pub flags: PacketFlags,
    /// Packet body.
    pub payload: Bytes,
}

impl Packet {
    /// Encode this packet onto `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if the encoded packet
    /// would exceed [`MAX_PACKET`], or [`ProtocolError::UnsupportedVersion`]
    /// if `self.version` is not [`PROTO_VERSION`].
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.version != PROTO_VERSION {
            return Err(ProtocolError::UnsupportedVersion(self.version));
        }
        if self.payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge { size: self.payload.len(), max: MAX_PAYLOAD });
        }

        dst.put_u8(self.version);
        dst.put_slice(&self.packet_id);
        dst.put_u8(self.ttl);
        dst.put_u8(self.flags.to_byte());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a packet from `bytes`.
    ///
    /// `bytes` must contain exactly one packet (header plus payload, no
    /// trailing data) — the caller (the peer transport's length-prefixed
    /// framing) is responsible for carving a single packet's bytes out of
    /// the stream before calling this.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooShort`] if `bytes` is shorter than
    /// [`HEADER_SIZE`], [`ProtocolError::UnsupportedVersion`] if the
    /// version byte does not match [`PROTO_VERSION`], or
    /// [`ProtocolError::PayloadTooLarge`] if the implied payload (`bytes.len()
    /// - HEADER_SIZE`) exceeds [`MAX_PAYLOAD`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::FrameTooShort { len: bytes.len(), min: HEADER_SIZE });
        }

        let payload_len = bytes.len() - HEADER_SIZE;
        if payload_len > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge { size: payload_len, max: MAX_PAYLOAD });
        }

        let version = bytes[0];
        if version != PROTO_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }

        let mut packet_id = [0u8; 8];
        packet_id.copy_from_slice(&bytes[1..9]);
        let ttl = bytes[9];
        let flags = PacketFlags::from_byte(bytes[10]);
        let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..]);

        Ok(Self { version, packet_id, ttl, flags, payload })
    }

    /// Total encoded length of this packet in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Derive a packet ID from `payload` and 8 bytes of caller-supplied
/// randomness.
///
/// Matches the reference relay's scheme: hash `payload || random` with
/// SHA-512 and take the first 8 bytes. Randomness is taken as a parameter
/// rather than drawn internally so this function stays pure and
/// deterministically testable; callers (the mesh engine) source the random
/// bytes from their injected environment before calling this.
#[must_use]
pub fn make_packet_id(payload: &[u8], random: [u8; 8]) -> PacketId {
    let mut hasher = Sha512::new();
    hasher.update(payload);
    hasher.update(random);
    let digest = hasher.finalize();

    let mut id = [0u8; 8];
    id.copy_from_slice(&digest[..8]);
    id
}
