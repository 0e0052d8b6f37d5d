//! # Save-State Model
//!
//! The logical game-progress object graph shared between players of one
//! world. A `SaveState` is owned by exactly one side; it crosses the network
//! only as a serialized blob (see [`crate::serializer`]).

use std::cmp::Ordering;

use crate::error::{SyncError, SyncResult};
use crate::flags::{EventFlags, RegionFlags};
use crate::merge::{merge_accumulate, merge_event_flags};
use crate::serializer::SaveFields;

/// Number of bottle slots in the inventory.
pub const BOTTLE_SLOTS: usize = 4;

/// Inventory item values that can occupy a bottle slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InventoryItem {
    /// Empty bottle.
    BottleEmpty = 0x50,
    /// Red potion.
    RedPotion = 0x51,
    /// Green potion.
    GreenPotion = 0x52,
    /// Blue potion.
    BluePotion = 0x53,
    /// Half a serving of elixir soup.
    ElixirSoupHalf = 0x54,
    /// Elixir soup.
    ElixirSoup = 0x55,
    /// Bottled water.
    BottledWater = 0x56,
    /// Fairy.
    Fairy = 0x57,
    /// Forest firefly.
    ForestFirefly = 0x58,
    /// Forest water.
    ForestWater = 0x59,
    /// Slot not obtained.
    #[default]
    None = 0xFF,
}

impl InventoryItem {
    /// Converts from the raw memory byte.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidItem`] for bytes outside the bottle range.
    pub const fn from_u8(value: u8) -> SyncResult<Self> {
        Ok(match value {
            0x50 => Self::BottleEmpty,
            0x51 => Self::RedPotion,
            0x52 => Self::GreenPotion,
            0x53 => Self::BluePotion,
            0x54 => Self::ElixirSoupHalf,
            0x55 => Self::ElixirSoup,
            0x56 => Self::BottledWater,
            0x57 => Self::Fairy,
            0x58 => Self::ForestFirefly,
            0x59 => Self::ForestWater,
            0xFF => Self::None,
            other => return Err(SyncError::InvalidItem(other)),
        })
    }

    /// True for any bottle, filled or empty.
    #[must_use]
    pub const fn is_bottle(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Magic meter capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MagicMeter {
    /// No meter yet.
    #[default]
    None = 0x00,
    /// Normal meter.
    Normal = 0x10,
    /// Doubled meter.
    Extended = 0x20,
}

impl MagicMeter {
    /// Converts from the raw memory byte.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidMagicMeter`] for unknown sizes.
    pub const fn from_u8(value: u8) -> SyncResult<Self> {
        match value {
            0x00 => Ok(Self::None),
            0x10 => Ok(Self::Normal),
            0x20 => Ok(Self::Extended),
            other => Err(SyncError::InvalidMagicMeter(other)),
        }
    }
}

/// Quest and meter counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QuestStatus {
    /// Maximum health in quarter hearts.
    pub max_health: u16,
    /// Pieces of heart collected towards the next container.
    pub heart_pieces: u8,
    /// Magic meter capacity.
    pub magic_meter: MagicMeter,
    /// Sword upgrade level.
    pub sword_level: u8,
    /// Shield upgrade level.
    pub shield_level: u8,
    /// Triforce charts/pieces bitset.
    pub triforce: u8,
    /// Goddess pearls bitset.
    pub pearls: u8,
    /// Learned songs bitset.
    pub songs: u8,
}

impl QuestStatus {
    /// Folds `incoming` into `self`. Levels only rise, bitsets only gain bits.
    ///
    /// Heart pieces wrap to zero when a container completes, so they are
    /// ordered together with `max_health`: a higher health takes the
    /// incoming piece count as is, equal health takes the larger count.
    ///
    /// Returns true if anything changed.
    pub fn merge_from(&mut self, incoming: &Self) -> bool {
        let before = *self;
        match incoming.max_health.cmp(&self.max_health) {
            Ordering::Greater => {
                self.max_health = incoming.max_health;
                self.heart_pieces = incoming.heart_pieces;
            }
            Ordering::Equal => self.heart_pieces = self.heart_pieces.max(incoming.heart_pieces),
            Ordering::Less => {}
        }
        self.magic_meter = self.magic_meter.max(incoming.magic_meter);
        self.sword_level = self.sword_level.max(incoming.sword_level);
        self.shield_level = self.shield_level.max(incoming.shield_level);
        self.triforce |= incoming.triforce;
        self.pearls |= incoming.pearls;
        self.songs |= incoming.songs;
        *self != before
    }
}

/// Full logical game-progress state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SaveState {
    /// Global event flags.
    pub event_flags: EventFlags,
    /// Region flags.
    pub region_flags: RegionFlags,
    /// Bottle slots.
    pub bottles: [InventoryItem; BOTTLE_SLOTS],
    /// Quest counters.
    pub quest: QuestStatus,
}

impl SaveState {
    /// Writes one bottle slot.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidSlot`] if `slot` is out of range.
    pub fn set_bottle(&mut self, slot: u8, item: InventoryItem) -> SyncResult<()> {
        let cell = self
            .bottles
            .get_mut(usize::from(slot))
            .ok_or(SyncError::InvalidSlot(slot))?;
        *cell = item;
        Ok(())
    }

    /// Merges a (possibly partial) incoming field set into this state.
    ///
    /// Event flags propagate with exemptions, region flags accumulate,
    /// quest counters only progress. Bottles are left alone: they are owned
    /// by per-slot updates. Returns true if anything changed.
    pub fn merge_fields(&mut self, incoming: &SaveFields) -> bool {
        let mut changed = false;

        if let Some(flags) = &incoming.event_flags {
            changed |= !merge_event_flags(flags, &mut self.event_flags).is_empty();
        }
        if let Some(flags) = &incoming.region_flags {
            changed |=
                !merge_accumulate(flags.as_bytes(), self.region_flags.as_bytes_mut()).is_empty();
        }
        changed |= self.quest.merge_from(&incoming.quest_with_defaults(&self.quest));

        changed
    }
}
