//! # Network Protocol
//!
//! Envelope definitions and the binary codec.
//!
//! ## Envelope Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Kind (1) │ Lobby (str) │ Presence (1)                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Sender? : id (8) │ nickname (str) │ world flag (1) + id (4)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Target? : id (8)                                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (per kind)                                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Strings and blobs carry a u16 length prefix. Integers are little-endian.
//! An encoded envelope never exceeds [`crate::MAX_PACKET_SIZE`].

mod packets;
mod serialization;

pub use packets::{
    Envelope, LobbyId, Packet, PacketKind, PlayerHandle, PlayerId, WorldId, PRESENCE_SENDER,
    PRESENCE_TARGET,
};
pub use serialization::{PacketDeserializer, PacketSerializer};
