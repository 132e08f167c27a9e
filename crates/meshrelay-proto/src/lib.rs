//! Wire format for the mesh-relay protocol.
//!
//! A packet is an 11-byte header followed by a variable-length payload:
//!
//! ```text
//! offset  size  field
//!  0      1     version
//!  1      8     packet_id
//!  9      1     ttl
//! 10      1     flags
//! 11      N     payload
//! ```
//!
//! This crate only handles structural framing: encoding, decoding, and the
//! flags bitset. It does not know about encryption (see `meshrelay-crypto`)
//! or relay/dedup semantics (see `meshrelay-core`).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
pub mod flags;
mod packet;

pub use errors::{ProtocolError, Result};
pub use flags::PacketFlags;
pub use packet::{HEADER_SIZE, MAX_PACKET, MAX_PAYLOAD, PROTO_VERSION, Packet, PacketId, make_packet_id};
