//! # Save Serializer
//!
//! Schema-driven codec between [`SaveState`] and the byte blob that travels
//! in download and save-update packets.
//!
//! ## Blob Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Magic "TWSV" (4) │ Version (1) │ Field count (1)             │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Tag (1) │ Width (2, LE) │ Bytes (width)        ... per field │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A full save always writes every field in [`SAVE_SCHEMA`] order. Decoding
//! is lenient about *which* fields are present: unknown tags are skipped and
//! missing fields come back as `None`, so the same codec serves full
//! downloads and partial updates.

use crate::error::{SyncError, SyncResult};
use crate::flags::{EventFlags, RegionFlags, EVENT_FLAG_BYTES, REGION_FLAG_BYTES};
use crate::save::{InventoryItem, MagicMeter, QuestStatus, SaveState, BOTTLE_SLOTS};

/// Magic bytes identifying a save blob.
pub const SAVE_MAGIC: &[u8; 4] = b"TWSV";

/// Current blob format version.
pub const SAVE_VERSION: u8 = 1;

/// Field tags, in schema order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldId {
    /// Global event flags.
    EventFlags = 1,
    /// Region flags.
    RegionFlags = 2,
    /// Bottle slots.
    Bottles = 3,
    /// Maximum health (quarter hearts, u16).
    MaxHealth = 4,
    /// Heart pieces.
    HeartPieces = 5,
    /// Magic meter size.
    MagicMeter = 6,
    /// Sword level.
    SwordLevel = 7,
    /// Shield level.
    ShieldLevel = 8,
    /// Triforce bitset.
    Triforce = 9,
    /// Pearls bitset.
    Pearls = 10,
    /// Songs bitset.
    Songs = 11,
}

impl FieldId {
    /// Converts from a tag byte. Unknown tags return `None`.
    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        SAVE_SCHEMA.iter().map(|s| s.id).find(|id| *id as u8 == tag)
    }

    /// Schema entry for this field.
    #[must_use]
    pub fn spec(self) -> &'static FieldSpec {
        // Every FieldId has exactly one schema entry, indexed by tag - 1.
        &SAVE_SCHEMA[self as usize - 1]
    }
}

/// One entry of the save schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    /// Tag written before the field.
    pub id: FieldId,
    /// Human-readable name, used in errors.
    pub name: &'static str,
    /// Encoded width in bytes.
    pub width: usize,
}

/// The ordered list of fields in a save blob.
pub const SAVE_SCHEMA: &[FieldSpec] = &[
    FieldSpec { id: FieldId::EventFlags, name: "event_flags", width: EVENT_FLAG_BYTES },
    FieldSpec { id: FieldId::RegionFlags, name: "region_flags", width: REGION_FLAG_BYTES },
    FieldSpec { id: FieldId::Bottles, name: "bottles", width: BOTTLE_SLOTS },
    FieldSpec { id: FieldId::MaxHealth, name: "max_health", width: 2 },
    FieldSpec { id: FieldId::HeartPieces, name: "heart_pieces", width: 1 },
    FieldSpec { id: FieldId::MagicMeter, name: "magic_meter", width: 1 },
    FieldSpec { id: FieldId::SwordLevel, name: "sword_level", width: 1 },
    FieldSpec { id: FieldId::ShieldLevel, name: "shield_level", width: 1 },
    FieldSpec { id: FieldId::Triforce, name: "triforce", width: 1 },
    FieldSpec { id: FieldId::Pearls, name: "pearls", width: 1 },
    FieldSpec { id: FieldId::Songs, name: "songs", width: 1 },
];

/// The fields found in a decoded blob. Absent fields are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveFields {
    /// Global event flags.
    pub event_flags: Option<EventFlags>,
    /// Region flags.
    pub region_flags: Option<RegionFlags>,
    /// Bottle slots.
    pub bottles: Option<[InventoryItem; BOTTLE_SLOTS]>,
    /// Maximum health.
    pub max_health: Option<u16>,
    /// Heart pieces.
    pub heart_pieces: Option<u8>,
    /// Magic meter.
    pub magic_meter: Option<MagicMeter>,
    /// Sword level.
    pub sword_level: Option<u8>,
    /// Shield level.
    pub shield_level: Option<u8>,
    /// Triforce bitset.
    pub triforce: Option<u8>,
    /// Pearls bitset.
    pub pearls: Option<u8>,
    /// Songs bitset.
    pub songs: Option<u8>,
}

impl SaveFields {
    /// True if every schema field was present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.event_flags.is_some()
            && self.region_flags.is_some()
            && self.bottles.is_some()
            && self.max_health.is_some()
            && self.heart_pieces.is_some()
            && self.magic_meter.is_some()
            && self.sword_level.is_some()
            && self.shield_level.is_some()
            && self.triforce.is_some()
            && self.pearls.is_some()
            && self.songs.is_some()
    }

    /// Copies every present field into `save`, replacing its value.
    pub fn overwrite(&self, save: &mut SaveState) {
        if let Some(flags) = self.event_flags {
            save.event_flags = flags;
        }
        if let Some(flags) = self.region_flags {
            save.region_flags = flags;
        }
        if let Some(bottles) = self.bottles {
            save.bottles = bottles;
        }
        save.quest = self.quest_with_defaults(&save.quest);
    }

    /// Quest counters from this field set, falling back to `base` for
    /// absent fields.
    #[must_use]
    pub fn quest_with_defaults(&self, base: &QuestStatus) -> QuestStatus {
        QuestStatus {
            max_health: self.max_health.unwrap_or(base.max_health),
            heart_pieces: self.heart_pieces.unwrap_or(base.heart_pieces),
            magic_meter: self.magic_meter.unwrap_or(base.magic_meter),
            sword_level: self.sword_level.unwrap_or(base.sword_level),
            shield_level: self.shield_level.unwrap_or(base.shield_level),
            triforce: self.triforce.unwrap_or(base.triforce),
            pearls: self.pearls.unwrap_or(base.pearls),
            songs: self.songs.unwrap_or(base.songs),
        }
    }

    fn decode_field(&mut self, id: FieldId, body: &[u8]) -> SyncResult<()> {
        match id {
            FieldId::EventFlags => self.event_flags = Some(EventFlags::from_slice(body)?),
            FieldId::RegionFlags => self.region_flags = Some(RegionFlags::from_slice(body)?),
            FieldId::Bottles => {
                let mut bottles = [InventoryItem::None; BOTTLE_SLOTS];
                for (slot, &byte) in bottles.iter_mut().zip(body) {
                    *slot = InventoryItem::from_u8(byte)?;
                }
                self.bottles = Some(bottles);
            }
            FieldId::MaxHealth => self.max_health = Some(u16::from_le_bytes([body[0], body[1]])),
            FieldId::HeartPieces => self.heart_pieces = Some(body[0]),
            FieldId::MagicMeter => self.magic_meter = Some(MagicMeter::from_u8(body[0])?),
            FieldId::SwordLevel => self.sword_level = Some(body[0]),
            FieldId::ShieldLevel => self.shield_level = Some(body[0]),
            FieldId::Triforce => self.triforce = Some(body[0]),
            FieldId::Pearls => self.pearls = Some(body[0]),
            FieldId::Songs => self.songs = Some(body[0]),
        }
        Ok(())
    }
}

/// Growable little-endian byte writer.
#[derive(Clone, Debug, Default)]
pub struct ByteWriter {
    buffer: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Creates a writer with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: Vec::with_capacity(capacity) }
    }

    /// Number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True if nothing has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Written bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning the bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn put_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn put_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn put_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes.
    #[inline]
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}

/// Bounds-checked little-endian byte reader.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader over `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Current read offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Reads `n` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Truncated`] if fewer than `n` bytes remain.
    pub fn take(&mut self, n: usize) -> SyncResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(SyncError::Truncated {
                offset: self.position,
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buffer[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    /// Reads exactly `N` bytes into an array.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Truncated`] if fewer than `N` bytes remain.
    pub fn take_array<const N: usize>(&mut self) -> SyncResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Truncated`] at the end of the buffer.
    pub fn u8(&mut self) -> SyncResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little-endian u16.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Truncated`] if fewer than 2 bytes remain.
    pub fn u16(&mut self) -> SyncResult<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Reads a little-endian u32.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Truncated`] if fewer than 4 bytes remain.
    pub fn u32(&mut self) -> SyncResult<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Reads a little-endian u64.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Truncated`] if fewer than 8 bytes remain.
    pub fn u64(&mut self) -> SyncResult<u64> {
        self.take_array().map(u64::from_le_bytes)
    }
}

fn encode_field(id: FieldId, save: &SaveState, w: &mut ByteWriter) {
    let quest = &save.quest;
    match id {
        FieldId::EventFlags => w.put_bytes(save.event_flags.as_bytes()),
        FieldId::RegionFlags => w.put_bytes(save.region_flags.as_bytes()),
        FieldId::Bottles => {
            for item in save.bottles {
                w.put_u8(item as u8);
            }
        }
        FieldId::MaxHealth => w.put_u16(quest.max_health),
        FieldId::HeartPieces => w.put_u8(quest.heart_pieces),
        FieldId::MagicMeter => w.put_u8(quest.magic_meter as u8),
        FieldId::SwordLevel => w.put_u8(quest.sword_level),
        FieldId::ShieldLevel => w.put_u8(quest.shield_level),
        FieldId::Triforce => w.put_u8(quest.triforce),
        FieldId::Pearls => w.put_u8(quest.pearls),
        FieldId::Songs => w.put_u8(quest.songs),
    }
}

/// Serializes every field of `save`.
#[must_use]
pub fn serialize(save: &SaveState) -> Vec<u8> {
    let body: usize = SAVE_SCHEMA.iter().map(|s| s.width + 3).sum();
    let mut w = ByteWriter::with_capacity(SAVE_MAGIC.len() + 2 + body);

    w.put_bytes(SAVE_MAGIC);
    w.put_u8(SAVE_VERSION);
    #[allow(clippy::cast_possible_truncation)]
    w.put_u8(SAVE_SCHEMA.len() as u8);

    for spec in SAVE_SCHEMA {
        w.put_u8(spec.id as u8);
        #[allow(clippy::cast_possible_truncation)]
        w.put_u16(spec.width as u16);
        encode_field(spec.id, save, &mut w);
    }

    w.into_vec()
}

/// Decodes whichever fields a blob carries.
///
/// # Errors
///
/// Fails on a bad header, a truncated blob, a known field with the wrong
/// width, or an out-of-range enumerated value. Unknown fields are skipped.
pub fn deserialize(blob: &[u8]) -> SyncResult<SaveFields> {
    let mut r = ByteReader::new(blob);

    let magic: [u8; 4] = r.take_array()?;
    if &magic != SAVE_MAGIC {
        return Err(SyncError::BadMagic(magic));
    }
    let version = r.u8()?;
    if version != SAVE_VERSION {
        return Err(SyncError::UnsupportedVersion(version));
    }

    let count = r.u8()?;
    let mut fields = SaveFields::default();

    for _ in 0..count {
        let tag = r.u8()?;
        let width = usize::from(r.u16()?);
        let body = r.take(width)?;

        let Some(id) = FieldId::from_u8(tag) else {
            continue;
        };
        let spec = id.spec();
        if width != spec.width {
            return Err(SyncError::FieldWidth {
                field: spec.name,
                expected: spec.width,
                actual: width,
            });
        }
        fields.decode_field(id, body)?;
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> SaveState {
        let mut save = SaveState::default();
        save.event_flags.set(5, true);
        save.event_flags.set(0x2D * 8 + 7, true);
        save.event_flags.as_bytes_mut()[0xFF] = 0xA5;
        save.region_flags.as_bytes_mut()[0x10] = 0x3C;
        save.bottles = [
            InventoryItem::BottleEmpty,
            InventoryItem::Fairy,
            InventoryItem::ForestWater,
            InventoryItem::None,
        ];
        save.quest = QuestStatus {
            max_health: 0x0128,
            heart_pieces: 3,
            magic_meter: MagicMeter::Extended,
            sword_level: 4,
            shield_level: 2,
            triforce: 0b1010_1010,
            pearls: 0b111,
            songs: 0b0101_0101,
        };
        save
    }

    #[test]
    fn test_schema_tags_match_positions() {
        for (i, spec) in SAVE_SCHEMA.iter().enumerate() {
            assert_eq!(spec.id as usize, i + 1);
            assert_eq!(spec.id.spec(), spec);
            assert_eq!(FieldId::from_u8(spec.id as u8), Some(spec.id));
        }
        assert_eq!(FieldId::from_u8(0), None);
        assert_eq!(FieldId::from_u8(200), None);
    }

    #[test]
    fn test_round_trip() {
        let save = populated();
        let fields = deserialize(&serialize(&save)).unwrap();
        assert!(fields.is_complete());

        let mut restored = SaveState::default();
        fields.overwrite(&mut restored);
        assert_eq!(restored, save);
    }

    #[test]
    fn test_unknown_field_is_skipped() {
        let mut w = ByteWriter::new();
        w.put_bytes(SAVE_MAGIC);
        w.put_u8(SAVE_VERSION);
        w.put_u8(2);
        w.put_u8(0x7F);
        w.put_u16(3);
        w.put_bytes(&[1, 2, 3]);
        w.put_u8(FieldId::SwordLevel as u8);
        w.put_u16(1);
        w.put_u8(3);

        let fields = deserialize(w.as_slice()).unwrap();
        assert_eq!(fields.sword_level, Some(3));
        assert_eq!(fields.event_flags, None);
        assert!(!fields.is_complete());
    }

    #[test]
    fn test_partial_overwrite_keeps_absent_fields() {
        let mut save = populated();
        let fields = SaveFields {
            heart_pieces: Some(0),
            ..Default::default()
        };
        fields.overwrite(&mut save);
        assert_eq!(save.quest.heart_pieces, 0);
        assert_eq!(save.quest.sword_level, 4);
        assert_eq!(save.bottles[1], InventoryItem::Fairy);
    }

    #[test]
    fn test_header_errors() {
        assert!(matches!(deserialize(b"NOPE\x01\x00"), Err(SyncError::BadMagic(_))));
        assert_eq!(deserialize(b"TWSV\x09\x00"), Err(SyncError::UnsupportedVersion(9)));
        assert!(matches!(deserialize(b"TW"), Err(SyncError::Truncated { .. })));
    }

    #[test]
    fn test_truncated_body_is_an_error() {
        let blob = serialize(&populated());
        let cut = &blob[..blob.len() - 1];
        assert!(matches!(deserialize(cut), Err(SyncError::Truncated { .. })));
    }

    #[test]
    fn test_wrong_width_is_an_error() {
        let mut w = ByteWriter::new();
        w.put_bytes(SAVE_MAGIC);
        w.put_u8(SAVE_VERSION);
        w.put_u8(1);
        w.put_u8(FieldId::MaxHealth as u8);
        w.put_u16(1);
        w.put_u8(9);

        assert_eq!(
            deserialize(w.as_slice()),
            Err(SyncError::FieldWidth { field: "max_health", expected: 2, actual: 1 })
        );
    }

    #[test]
    fn test_invalid_bottle_is_an_error() {
        let mut blob = serialize(&populated());
        // event flags and region flags come first, each with a 3-byte prefix
        let bottles_at = 6 + 3 + EVENT_FLAG_BYTES + 3 + REGION_FLAG_BYTES + 3;
        blob[bottles_at] = 0x01;
        assert_eq!(deserialize(&blob), Err(SyncError::InvalidItem(0x01)));
    }
}
