//! # Scene Live Context
//!
//! Transient per-stage state (opened chests, pressed switches, picked-up
//! items, visited rooms, small keys, dungeon items) and the fixed binary
//! frame it is stored and shipped in.
//!
//! ## Frame Layout
//!
//! ```text
//! 0x00 ┌──────────┐ chests        4
//! 0x04 ├──────────┤ switches     16
//! 0x14 ├──────────┤ items         4
//! 0x18 ├──────────┤ rooms         8
//! 0x20 ├──────────┤ keys          1
//! 0x21 ├──────────┤ region meta   2   persisted side only
//! 0x23 ├──────────┤ reserved      1
//! 0x24 └──────────┘
//! ```
//!
//! ## Wire Form
//!
//! `[stage u8][frame 0x24][dungeon flags u8]`, dungeon flags packed as
//! bit0 map, bit1 compass, bit2 big key, bit3 boss killed, bit4 heart
//! taken, bit5 boss intro watched.

use bytemuck::{Pod, Zeroable};

use crate::change::{hash_bytes, SnapshotHash};
use crate::error::SyncResult;
use crate::serializer::{ByteReader, ByteWriter};

/// Size of a [`SceneFrame`] in bytes.
pub const SCENE_FRAME_SIZE: usize = 0x24;

/// Encoded size of a live context on the wire.
pub const SCENE_WIRE_SIZE: usize = 1 + SCENE_FRAME_SIZE + 1;

/// Game stage (dungeon / area) identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u8);

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// The fixed 0x24-byte stage record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct SceneFrame {
    /// Opened chests bitset.
    pub chests: [u8; 4],
    /// Switch bitset.
    pub switches: [u8; 16],
    /// Collected items bitset.
    pub items: [u8; 4],
    /// Visited rooms bitset.
    pub rooms: [u8; 8],
    /// Small key count.
    pub keys: u8,
    /// Region metadata carried by the persisted record.
    pub region_meta: [u8; 2],
    /// Unused.
    pub reserved: u8,
}

const _: () = assert!(std::mem::size_of::<SceneFrame>() == SCENE_FRAME_SIZE);

impl SceneFrame {
    /// Assembles a frame from live context. Region metadata and the
    /// reserved byte are zero.
    #[must_use]
    pub fn from_live(ctx: &SceneLiveContext) -> Self {
        Self {
            chests: ctx.chests,
            switches: ctx.switches,
            items: ctx.items,
            rooms: ctx.rooms,
            keys: ctx.keys,
            region_meta: [0; 2],
            reserved: 0,
        }
    }

    /// Raw frame bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Content hash of the frame bytes.
    #[must_use]
    pub fn hash(&self) -> SnapshotHash {
        hash_bytes(self.as_bytes())
    }

    /// ORs every byte of `other` into `self`. Returns true if anything
    /// changed.
    pub fn accumulate(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (dst, src) in bytemuck::bytes_of_mut(self)
            .iter_mut()
            .zip(bytemuck::bytes_of(other))
        {
            let merged = *dst | *src;
            changed |= merged != *dst;
            *dst = merged;
        }
        changed
    }
}

/// Everything a client tracks about the stage it is standing in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SceneLiveContext {
    /// Stage the context belongs to.
    pub stage: StageId,
    /// Opened chests bitset.
    pub chests: [u8; 4],
    /// Switch bitset.
    pub switches: [u8; 16],
    /// Collected items bitset.
    pub items: [u8; 4],
    /// Visited rooms bitset.
    pub rooms: [u8; 8],
    /// Small key count.
    pub keys: u8,
    /// Dungeon map obtained.
    pub map: bool,
    /// Compass obtained.
    pub compass: bool,
    /// Big key obtained.
    pub big_key: bool,
    /// Boss defeated.
    pub boss_killed: bool,
    /// Heart container taken.
    pub heart_taken: bool,
    /// Boss intro cutscene watched.
    pub boss_intro_watched: bool,
}

impl SceneLiveContext {
    /// Empty context for `stage`.
    #[must_use]
    pub fn new(stage: StageId) -> Self {
        Self { stage, ..Self::default() }
    }

    /// Rebuilds a context from a frame and packed dungeon flags.
    #[must_use]
    pub fn from_frame(stage: StageId, frame: &SceneFrame, dungeon_flags: u8) -> Self {
        let mut ctx = Self {
            stage,
            chests: frame.chests,
            switches: frame.switches,
            items: frame.items,
            rooms: frame.rooms,
            keys: frame.keys,
            ..Self::default()
        };
        ctx.set_dungeon_flags(dungeon_flags);
        ctx
    }

    /// Packs the six dungeon booleans.
    #[must_use]
    pub fn dungeon_flags(&self) -> u8 {
        u8::from(self.map)
            | u8::from(self.compass) << 1
            | u8::from(self.big_key) << 2
            | u8::from(self.boss_killed) << 3
            | u8::from(self.heart_taken) << 4
            | u8::from(self.boss_intro_watched) << 5
    }

    /// Unpacks the six dungeon booleans. Upper bits are ignored.
    pub fn set_dungeon_flags(&mut self, flags: u8) {
        self.map = flags & 0x01 != 0;
        self.compass = flags & 0x02 != 0;
        self.big_key = flags & 0x04 != 0;
        self.boss_killed = flags & 0x08 != 0;
        self.heart_taken = flags & 0x10 != 0;
        self.boss_intro_watched = flags & 0x20 != 0;
    }

    /// Folds a peer's context for the same stage into this one.
    ///
    /// Bitsets are OR'd, the key count is taken from `incoming`, and
    /// dungeon booleans are only ever raised. Returns true if anything
    /// changed. The caller checks that the stages match.
    pub fn absorb(&mut self, incoming: &Self) -> bool {
        let before = *self;

        or_into(&mut self.chests, &incoming.chests);
        or_into(&mut self.switches, &incoming.switches);
        or_into(&mut self.items, &incoming.items);
        or_into(&mut self.rooms, &incoming.rooms);
        self.keys = incoming.keys;
        self.set_dungeon_flags(self.dungeon_flags() | incoming.dungeon_flags());

        *self != before
    }

    /// Appends the wire form.
    pub fn encode(&self, w: &mut ByteWriter) {
        w.put_u8(self.stage.0);
        w.put_bytes(SceneFrame::from_live(self).as_bytes());
        w.put_u8(self.dungeon_flags());
    }

    /// Reads the wire form.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Truncated`] if the input is short.
    pub fn decode(r: &mut ByteReader<'_>) -> SyncResult<Self> {
        let stage = StageId(r.u8()?);
        let frame: SceneFrame = bytemuck::pod_read_unaligned(r.take(SCENE_FRAME_SIZE)?);
        let flags = r.u8()?;
        Ok(Self::from_frame(stage, &frame, flags))
    }
}

fn or_into<const N: usize>(dst: &mut [u8; N], src: &[u8; N]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d |= *s;
    }
}

/// Remembers the last autosaved live frame for the current stage.
#[derive(Clone, Copy, Debug, Default)]
pub struct SceneAutosave {
    last_hash: Option<SnapshotHash>,
}

impl SceneAutosave {
    /// Creates a tracker with no remembered frame.
    #[must_use]
    pub const fn new() -> Self {
        Self { last_hash: None }
    }

    /// Hash of the last captured frame.
    #[inline]
    #[must_use]
    pub const fn last_hash(&self) -> Option<SnapshotHash> {
        self.last_hash
    }

    /// Forgets the remembered frame, e.g. after a stage change.
    pub fn reset(&mut self) {
        self.last_hash = None;
    }

    /// Autosaves `live` into the persisted `record`.
    ///
    /// Returns false if the live frame is unchanged since the last capture.
    /// Otherwise the record's region metadata is carried into the frame,
    /// the frame is OR'd into the record and true is returned, meaning the
    /// context should be pushed to peers.
    pub fn capture(&mut self, live: &SceneLiveContext, record: &mut SceneFrame) -> bool {
        let mut frame = SceneFrame::from_live(live);
        let hash = frame.hash();
        if self.last_hash == Some(hash) {
            return false;
        }

        frame.region_meta = record.region_meta;
        frame.reserved = record.reserved;
        record.accumulate(&frame);
        self.last_hash = Some(hash);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live() -> SceneLiveContext {
        let mut ctx = SceneLiveContext::new(StageId(3));
        ctx.chests[0] = 0b0001;
        ctx.switches[15] = 0x80;
        ctx.rooms[2] = 0x04;
        ctx.keys = 2;
        ctx.compass = true;
        ctx
    }

    #[test]
    fn test_frame_layout() {
        let frame = SceneFrame::from_live(&live());
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), SCENE_FRAME_SIZE);
        assert_eq!(bytes[0x00], 0b0001);
        assert_eq!(bytes[0x04 + 15], 0x80);
        assert_eq!(bytes[0x18 + 2], 0x04);
        assert_eq!(bytes[0x20], 2);
        assert_eq!(&bytes[0x21..], &[0, 0, 0]);
    }

    #[test]
    fn test_dungeon_flags_pack() {
        let mut ctx = SceneLiveContext::default();
        ctx.map = true;
        ctx.boss_intro_watched = true;
        assert_eq!(ctx.dungeon_flags(), 0b10_0001);

        let mut other = SceneLiveContext::default();
        other.set_dungeon_flags(0xFF);
        assert_eq!(other.dungeon_flags(), 0b11_1111);
    }

    #[test]
    fn test_absorb_ors_and_takes_keys() {
        let mut local = live();
        let mut incoming = SceneLiveContext::new(StageId(3));
        incoming.chests[0] = 0b0100;
        incoming.keys = 1;
        incoming.big_key = true;

        assert!(local.absorb(&incoming));
        assert_eq!(local.chests[0], 0b0101);
        assert_eq!(local.switches[15], 0x80);
        assert_eq!(local.keys, 1);
        assert!(local.compass);
        assert!(local.big_key);
        assert!(!local.absorb(&incoming));
    }

    #[test]
    fn test_capture_skips_unchanged_frame() {
        let mut autosave = SceneAutosave::new();
        let mut record = SceneFrame::default();
        let ctx = live();

        assert!(autosave.capture(&ctx, &mut record));
        assert!(!autosave.capture(&ctx, &mut record));

        autosave.reset();
        assert!(autosave.capture(&ctx, &mut record));
    }

    #[test]
    fn test_capture_accumulates_and_keeps_metadata() {
        let mut autosave = SceneAutosave::new();
        let mut record = SceneFrame {
            chests: [0b1000, 0, 0, 0],
            region_meta: [0xAB, 0xCD],
            keys: 4,
            ..SceneFrame::default()
        };

        assert!(autosave.capture(&live(), &mut record));
        assert_eq!(record.chests[0], 0b1001);
        assert_eq!(record.region_meta, [0xAB, 0xCD]);
        assert_eq!(record.keys, 4 | 2);
    }

    #[test]
    fn test_wire_round_trip() {
        let mut ctx = live();
        ctx.heart_taken = true;
        let mut w = ByteWriter::new();
        ctx.encode(&mut w);
        assert_eq!(w.len(), SCENE_WIRE_SIZE);

        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(SceneLiveContext::decode(&mut r).unwrap(), ctx);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_decode_short_input() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert!(SceneLiveContext::decode(&mut r).is_err());
    }
}
