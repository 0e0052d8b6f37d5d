//! # Envelope Serialization
//!
//! Encodes and decodes [`Envelope`]s.
//!
//! ## Design
//!
//! - Writes go into a fixed [`MAX_PACKET_SIZE`] buffer; overflow is an error
//!   rather than a silent truncation
//! - Reads are bounds-checked and never panic on hostile input
//! - Save blobs are opaque here; their codec lives in `tidewake_core`

use tidewake_core::{
    ByteReader, ByteWriter, EventFlags, InventoryItem, RegionFlags, SceneLiveContext,
    EVENT_FLAG_BYTES, REGION_FLAG_BYTES, SCENE_WIRE_SIZE,
};

use super::packets::{
    Envelope, LobbyId, Packet, PacketKind, PlayerHandle, PlayerId, WorldId, PRESENCE_SENDER,
    PRESENCE_TARGET,
};
use crate::error::{NetError, NetResult};
use crate::MAX_PACKET_SIZE;

/// Envelope serializer - writes into a reusable fixed buffer.
pub struct PacketSerializer {
    buffer: [u8; MAX_PACKET_SIZE],
    position: usize,
}

impl PacketSerializer {
    /// Creates a new serializer with a fresh buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; MAX_PACKET_SIZE],
            position: 0,
        }
    }

    /// Resets the serializer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.position
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    /// Writes raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::PacketTooLarge`] if the bytes do not fit.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> NetResult<()> {
        let end = self.position + bytes.len();
        if end > MAX_PACKET_SIZE {
            return Err(NetError::PacketTooLarge {
                size: end,
                max: MAX_PACKET_SIZE,
            });
        }
        self.buffer[self.position..end].copy_from_slice(bytes);
        self.position = end;
        Ok(())
    }

    /// Writes a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::PacketTooLarge`] if the buffer is full.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> NetResult<()> {
        self.write_bytes(&[value])
    }

    /// Writes a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::PacketTooLarge`] if the buffer is full.
    #[inline]
    pub fn write_u16(&mut self, value: u16) -> NetResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::PacketTooLarge`] if the buffer is full.
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> NetResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a u64 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::PacketTooLarge`] if the buffer is full.
    #[inline]
    pub fn write_u64(&mut self, value: u64) -> NetResult<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a u16 length prefix followed by the bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::BlobTooLarge`] if the length exceeds `u16::MAX`,
    /// or [`NetError::PacketTooLarge`] if the buffer is full.
    pub fn write_blob(&mut self, bytes: &[u8]) -> NetResult<()> {
        let len = u16::try_from(bytes.len()).map_err(|_| NetError::BlobTooLarge(bytes.len()))?;
        self.write_u16(len)?;
        self.write_bytes(bytes)
    }

    /// Writes a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Same as [`Self::write_blob`].
    #[inline]
    pub fn write_str(&mut self, value: &str) -> NetResult<()> {
        self.write_blob(value.as_bytes())
    }

    fn write_sender(&mut self, sender: &PlayerHandle) -> NetResult<()> {
        self.write_u64(sender.id.0)?;
        self.write_str(&sender.nickname)?;
        match sender.world {
            Some(world) => {
                self.write_u8(1)?;
                self.write_u32(world.0)
            }
            None => {
                self.write_u8(0)?;
                self.write_u32(0)
            }
        }
    }

    fn write_payload(&mut self, packet: &Packet) -> NetResult<()> {
        match packet {
            Packet::SceneChanged { scene } => self.write_str(scene),
            Packet::RoomChanged { scene, room } => {
                self.write_str(scene)?;
                self.write_u8(*room)
            }
            Packet::SceneRequest => Ok(()),
            Packet::DownloadRequest { save } => self.write_blob(save),
            Packet::DownloadResponse { host, save } => {
                self.write_u8(u8::from(*host))?;
                match save {
                    Some(save) => {
                        self.write_u8(1)?;
                        self.write_blob(save)
                    }
                    None => self.write_u8(0),
                }
            }
            Packet::SaveUpdate { save, world } => {
                self.write_blob(save)?;
                self.write_u32(world.0)
            }
            Packet::BottleUpdate { slot, item } => {
                self.write_u8(*slot)?;
                self.write_u8(*item as u8)
            }
            Packet::FlagUpdate { flags } => self.write_bytes(flags.as_bytes()),
            Packet::RegionFlagUpdate { flags } => self.write_bytes(flags.as_bytes()),
            Packet::SceneContextUpdate { context, world } => {
                let mut w = ByteWriter::with_capacity(SCENE_WIRE_SIZE);
                context.encode(&mut w);
                self.write_bytes(w.as_slice())?;
                self.write_u32(world.0)
            }
            Packet::Error { message } => self.write_str(message),
        }
    }

    /// Serializes a complete envelope, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::PacketTooLarge`] or [`NetError::BlobTooLarge`]
    /// if the envelope does not fit.
    pub fn serialize(&mut self, envelope: &Envelope) -> NetResult<&[u8]> {
        self.reset();
        self.write_u8(envelope.packet.kind() as u8)?;
        self.write_str(envelope.lobby.as_str())?;

        let mut presence = 0u8;
        if envelope.sender.is_some() {
            presence |= PRESENCE_SENDER;
        }
        if envelope.target.is_some() {
            presence |= PRESENCE_TARGET;
        }
        self.write_u8(presence)?;

        if let Some(sender) = &envelope.sender {
            self.write_sender(sender)?;
        }
        if let Some(target) = envelope.target {
            self.write_u64(target.0)?;
        }
        self.write_payload(&envelope.packet)?;

        Ok(self.as_slice())
    }
}

impl Default for PacketSerializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Envelope deserializer - reads from a borrowed buffer.
pub struct PacketDeserializer<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketDeserializer<'a> {
    /// Creates a new deserializer from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Reads `n` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Truncated`] if fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> NetResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(NetError::Truncated {
                offset: self.position,
                needed: n,
            });
        }
        let slice = &self.buffer[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> NetResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Truncated`] at the end of the buffer.
    #[inline]
    pub fn read_u8(&mut self) -> NetResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a u16 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Truncated`] if fewer than 2 bytes remain.
    #[inline]
    pub fn read_u16(&mut self) -> NetResult<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Truncated`] if fewer than 4 bytes remain.
    #[inline]
    pub fn read_u32(&mut self) -> NetResult<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a u64 in little-endian format.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Truncated`] if fewer than 8 bytes remain.
    #[inline]
    pub fn read_u64(&mut self) -> NetResult<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Reads a u16-length-prefixed blob.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Truncated`] if the blob is cut short.
    pub fn read_blob(&mut self) -> NetResult<&'a [u8]> {
        let len = usize::from(self.read_u16()?);
        self.read_bytes(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Truncated`] or [`NetError::InvalidUtf8`].
    pub fn read_str(&mut self) -> NetResult<String> {
        let bytes = self.read_blob()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| NetError::InvalidUtf8)
    }

    fn read_sender(&mut self) -> NetResult<PlayerHandle> {
        let id = PlayerId(self.read_u64()?);
        let nickname = self.read_str()?;
        let has_world = self.read_u8()? != 0;
        let world = self.read_u32()?;
        Ok(PlayerHandle {
            id,
            nickname,
            world: has_world.then_some(WorldId(world)),
        })
    }

    fn read_payload(&mut self, kind: PacketKind) -> NetResult<Packet> {
        Ok(match kind {
            PacketKind::SceneChanged => Packet::SceneChanged {
                scene: self.read_str()?,
            },
            PacketKind::RoomChanged => Packet::RoomChanged {
                scene: self.read_str()?,
                room: self.read_u8()?,
            },
            PacketKind::SceneRequest => Packet::SceneRequest,
            PacketKind::DownloadRequest => Packet::DownloadRequest {
                save: self.read_blob()?.to_vec(),
            },
            PacketKind::DownloadResponse => {
                let host = self.read_u8()? != 0;
                let save = if self.read_u8()? != 0 {
                    Some(self.read_blob()?.to_vec())
                } else {
                    None
                };
                Packet::DownloadResponse { host, save }
            }
            PacketKind::SaveUpdate => Packet::SaveUpdate {
                save: self.read_blob()?.to_vec(),
                world: WorldId(self.read_u32()?),
            },
            PacketKind::BottleUpdate => Packet::BottleUpdate {
                slot: self.read_u8()?,
                item: InventoryItem::from_u8(self.read_u8()?)?,
            },
            PacketKind::FlagUpdate => Packet::FlagUpdate {
                flags: EventFlags::from_slice(self.read_bytes(EVENT_FLAG_BYTES)?)?,
            },
            PacketKind::RegionFlagUpdate => Packet::RegionFlagUpdate {
                flags: RegionFlags::from_slice(self.read_bytes(REGION_FLAG_BYTES)?)?,
            },
            PacketKind::SceneContextUpdate => {
                let mut r = ByteReader::new(self.read_bytes(SCENE_WIRE_SIZE)?);
                Packet::SceneContextUpdate {
                    context: SceneLiveContext::decode(&mut r)?,
                    world: WorldId(self.read_u32()?),
                }
            }
            PacketKind::Error => Packet::Error {
                message: self.read_str()?,
            },
        })
    }

    /// Deserializes a complete envelope. Trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::UnknownPacketKind`] for an unknown kind byte,
    /// and a truncation, UTF-8 or payload error for malformed input.
    pub fn deserialize(&mut self) -> NetResult<Envelope> {
        let kind_byte = self.read_u8()?;
        let kind = PacketKind::from_u8(kind_byte).ok_or(NetError::UnknownPacketKind(kind_byte))?;
        let lobby = LobbyId(self.read_str()?);
        let presence = self.read_u8()?;

        let sender = if presence & PRESENCE_SENDER != 0 {
            Some(self.read_sender()?)
        } else {
            None
        };
        let target = if presence & PRESENCE_TARGET != 0 {
            Some(PlayerId(self.read_u64()?))
        } else {
            None
        };
        let packet = self.read_payload(kind)?;

        Ok(Envelope {
            lobby,
            sender,
            target,
            packet,
        })
    }
}

impl Envelope {
    /// Encodes into a fresh byte vector.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::PacketTooLarge`] or [`NetError::BlobTooLarge`]
    /// if the envelope does not fit in one packet.
    pub fn encode(&self) -> NetResult<Vec<u8>> {
        let mut serializer = PacketSerializer::new();
        serializer.serialize(self).map(<[u8]>::to_vec)
    }

    /// Decodes from bytes.
    ///
    /// # Errors
    ///
    /// See [`PacketDeserializer::deserialize`].
    pub fn decode(bytes: &[u8]) -> NetResult<Self> {
        PacketDeserializer::new(bytes).deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidewake_core::{serializer, SaveState, StageId, SyncError};

    fn lobby() -> LobbyId {
        LobbyId::new("outset")
    }

    fn every_packet() -> Vec<Packet> {
        let mut flags = EventFlags::new();
        flags.set(17, true);
        let mut region = RegionFlags::new();
        region.as_bytes_mut()[3] = 0x81;
        let mut context = SceneLiveContext::new(StageId(4));
        context.switches[2] = 0x40;
        context.boss_killed = true;

        vec![
            Packet::SceneChanged { scene: "sea".into() },
            Packet::RoomChanged { scene: "sea".into(), room: 44 },
            Packet::SceneRequest,
            Packet::DownloadRequest { save: serializer::serialize(&SaveState::default()) },
            Packet::DownloadResponse { host: true, save: None },
            Packet::DownloadResponse { host: false, save: Some(vec![1, 2, 3]) },
            Packet::SaveUpdate { save: vec![9; 40], world: WorldId(3) },
            Packet::BottleUpdate { slot: 2, item: InventoryItem::Fairy },
            Packet::FlagUpdate { flags },
            Packet::RegionFlagUpdate { flags: region },
            Packet::SceneContextUpdate { context, world: WorldId(1) },
            Packet::Error { message: "world id is undefined".into() },
        ]
    }

    #[test]
    fn test_every_kind_decodes() {
        let sender = PlayerHandle::new(PlayerId(77), "medli", Some(WorldId(2)));
        for packet in every_packet() {
            let env = Envelope::new(lobby(), packet).with_sender(sender.clone());
            let bytes = env.encode().unwrap();
            assert!(bytes.len() <= MAX_PACKET_SIZE);
            assert_eq!(Envelope::decode(&bytes).unwrap(), env);
        }
    }

    #[test]
    fn test_optional_header_fields() {
        let bare = Envelope::new(lobby(), Packet::SceneRequest);
        assert_eq!(Envelope::decode(&bare.encode().unwrap()).unwrap(), bare);

        let targeted = bare.clone().with_target(PlayerId(5));
        let decoded = Envelope::decode(&targeted.encode().unwrap()).unwrap();
        assert_eq!(decoded.target, Some(PlayerId(5)));
        assert_eq!(decoded.sender, None);

        let worldless = bare.with_sender(PlayerHandle::new(PlayerId(1), "", None));
        let decoded = Envelope::decode(&worldless.encode().unwrap()).unwrap();
        assert_eq!(decoded.sender_world(), None);
    }

    #[test]
    fn test_unknown_kind() {
        let mut bytes = Envelope::new(lobby(), Packet::SceneRequest).encode().unwrap();
        bytes[0] = 0xEE;
        assert_eq!(Envelope::decode(&bytes), Err(NetError::UnknownPacketKind(0xEE)));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = Envelope::new(lobby(), Packet::SceneChanged { scene: "ice ring".into() })
            .encode()
            .unwrap();
        for cut in 0..bytes.len() {
            assert!(Envelope::decode(&bytes[..cut]).is_err(), "prefix of {cut} bytes");
        }
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = Envelope::new(lobby(), Packet::SceneChanged { scene: "ab".into() })
            .encode()
            .unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0xFF;
        assert_eq!(Envelope::decode(&bytes), Err(NetError::InvalidUtf8));
    }

    #[test]
    fn test_invalid_bottle_item() {
        let mut bytes = Envelope::new(
            lobby(),
            Packet::BottleUpdate { slot: 0, item: InventoryItem::RedPotion },
        )
        .encode()
        .unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0x01;
        assert_eq!(
            Envelope::decode(&bytes),
            Err(NetError::Sync(SyncError::InvalidItem(0x01)))
        );
    }

    #[test]
    fn test_oversized_envelope() {
        let env = Envelope::new(lobby(), Packet::Error { message: "x".repeat(MAX_PACKET_SIZE) });
        assert!(matches!(env.encode(), Err(NetError::PacketTooLarge { .. })));

        let env = Envelope::new(lobby(), Packet::DownloadRequest { save: vec![0; 70_000] });
        assert_eq!(env.encode(), Err(NetError::BlobTooLarge(70_000)));
    }

    #[test]
    fn test_serializer_reuse() {
        let mut serializer = PacketSerializer::new();
        let long = Envelope::new(lobby(), Packet::Error { message: "a long message".into() });
        let short = Envelope::new(lobby(), Packet::SceneRequest);

        serializer.serialize(&long).unwrap();
        let len = serializer.serialize(&short).unwrap().len();
        assert_eq!(len, short.encode().unwrap().len());
        assert!(!serializer.is_empty());
    }
}
