//! # Flag Merge Engine
//!
//! Bit-level reconciliation of an incoming flag table into a local one.
//!
//! ## Rules
//!
//! Two policies exist, chosen per flag family by the caller:
//!
//! - **Propagate** ([`merge_event_flags`]): a differing incoming byte replaces
//!   the local byte, except for the bits listed in
//!   [`EVENT_FLAG_EXEMPTIONS`], which always keep their local value.
//! - **Accumulate** ([`merge_accumulate`]): incoming bits are OR'd in. A set
//!   bit is never cleared.
//!
//! Both are idempotent: merging the same incoming table twice changes
//! nothing the second time.
//!
//! ```text
//! byte 0x00, exempt {5}
//!   local    0010_0000
//!   incoming 0000_0001
//!   result   0010_0001   bit 5 local, everything else incoming
//! ```

use crate::flags::FlagSet;

/// Bits of one event-flag byte that stay under local authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExemptEntry {
    /// Index of the byte in the event flag table.
    pub byte_index: usize,
    /// Bit positions (0..8) that are never overwritten by a merge.
    pub exempt_bits: &'static [u8],
}

impl ExemptEntry {
    /// The exempt bits as a byte mask.
    #[must_use]
    pub const fn mask(&self) -> u8 {
        let mut mask = 0u8;
        let mut i = 0;
        while i < self.exempt_bits.len() {
            mask |= 1 << self.exempt_bits[i];
            i += 1;
        }
        mask
    }
}

/// Event-flag bits that must not be forced by peers.
///
/// These cover cutscene sequencing, tutorial prompts and per-client camera
/// state. Sorted by byte index.
pub const EVENT_FLAG_EXEMPTIONS: &[ExemptEntry] = &[
    ExemptEntry { byte_index: 0x00, exempt_bits: &[5] },
    ExemptEntry { byte_index: 0x03, exempt_bits: &[0, 1] },
    ExemptEntry { byte_index: 0x0A, exempt_bits: &[6] },
    ExemptEntry { byte_index: 0x2D, exempt_bits: &[2, 3, 4] },
    ExemptEntry { byte_index: 0x34, exempt_bits: &[7] },
    ExemptEntry { byte_index: 0x52, exempt_bits: &[0, 1, 2, 3, 4, 5, 6, 7] },
    ExemptEntry { byte_index: 0x80, exempt_bits: &[1] },
];

/// Looks up the exempt mask for a byte. Zero if the byte is not listed.
#[must_use]
pub fn exempt_mask(byte_index: usize) -> u8 {
    EVENT_FLAG_EXEMPTIONS
        .binary_search_by_key(&byte_index, |e| e.byte_index)
        .map_or(0, |i| EVENT_FLAG_EXEMPTIONS[i].mask())
}

/// One rewritten byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlagChange {
    /// Byte index in the table.
    pub index: usize,
    /// Local value before the merge.
    pub before: u8,
    /// Local value after the merge.
    pub after: u8,
}

/// Every byte a merge rewrote, in index order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlagChanges {
    changes: Vec<FlagChange>,
}

impl FlagChanges {
    /// True if the merge rewrote nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of rewritten bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// The rewritten bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[FlagChange] {
        &self.changes
    }

    fn push(&mut self, index: usize, before: u8, after: u8) {
        self.changes.push(FlagChange { index, before, after });
    }
}

/// Merges `incoming` into `local` under the propagate-with-exemptions rule.
pub fn merge_event_flags<const N: usize>(
    incoming: &FlagSet<N>,
    local: &mut FlagSet<N>,
) -> FlagChanges {
    let mut changes = FlagChanges::default();
    let incoming = incoming.as_bytes();
    let local = local.as_bytes_mut();

    for (index, (&inc, loc)) in incoming.iter().zip(local.iter_mut()).enumerate() {
        if inc == *loc {
            continue;
        }
        let exempt = exempt_mask(index);
        let merged = (*loc & exempt) | (inc & !exempt);
        if merged != *loc {
            changes.push(index, *loc, merged);
            *loc = merged;
        }
    }

    changes
}

/// Merges `incoming` into `local` by OR. Bits are only ever set.
pub fn merge_accumulate(incoming: &[u8], local: &mut [u8]) -> FlagChanges {
    let mut changes = FlagChanges::default();

    for (index, (&inc, loc)) in incoming.iter().zip(local.iter_mut()).enumerate() {
        let merged = *loc | inc;
        if merged != *loc {
            changes.push(index, *loc, merged);
            *loc = merged;
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{EventFlags, EVENT_FLAG_BYTES};

    #[test]
    fn test_exemption_table_is_well_formed() {
        for pair in EVENT_FLAG_EXEMPTIONS.windows(2) {
            assert!(pair[0].byte_index < pair[1].byte_index, "table must be sorted");
        }
        for entry in EVENT_FLAG_EXEMPTIONS {
            assert!(entry.byte_index < EVENT_FLAG_BYTES);
            assert!(!entry.exempt_bits.is_empty());
            assert!(entry.exempt_bits.iter().all(|&b| b < 8));
        }
    }

    #[test]
    fn test_exempt_mask_lookup() {
        assert_eq!(exempt_mask(0x00), 0b0010_0000);
        assert_eq!(exempt_mask(0x03), 0b0000_0011);
        assert_eq!(exempt_mask(0x2D), 0b0001_1100);
        assert_eq!(exempt_mask(0x52), 0xFF);
        assert_eq!(exempt_mask(0x01), 0);
    }

    #[test]
    fn test_exempt_bit_survives_clear() {
        let mut local = EventFlags::new();
        local.as_bytes_mut()[0x00] = 0b0010_0000;
        let incoming = EventFlags::new();

        let changes = merge_event_flags(&incoming, &mut local);

        assert!(changes.is_empty());
        assert_eq!(local.byte(0x00), Some(0b0010_0000));
    }

    #[test]
    fn test_non_exempt_byte_is_replaced() {
        let mut local = EventFlags::new();
        let mut incoming = EventFlags::new();
        incoming.as_bytes_mut()[0x01] = 0xFF;
        local.as_bytes_mut()[0x02] = 0xF0;
        incoming.as_bytes_mut()[0x02] = 0x0F;

        let changes = merge_event_flags(&incoming, &mut local);

        assert_eq!(local.byte(0x01), Some(0xFF));
        assert_eq!(local.byte(0x02), Some(0x0F));
        assert_eq!(
            changes.as_slice(),
            &[
                FlagChange { index: 0x01, before: 0x00, after: 0xFF },
                FlagChange { index: 0x02, before: 0xF0, after: 0x0F },
            ]
        );
    }

    #[test]
    fn test_mixed_byte_copies_only_non_exempt_bits() {
        let mut local = EventFlags::new();
        let mut incoming = EventFlags::new();
        local.as_bytes_mut()[0x2D] = 0b1000_0100;
        incoming.as_bytes_mut()[0x2D] = 0b0101_1000;

        merge_event_flags(&incoming, &mut local);

        // bits 2..=4 local (0b100), the rest incoming (0b0100_0000)
        assert_eq!(local.byte(0x2D), Some(0b0100_0100));
    }

    #[test]
    fn test_fully_exempt_byte_never_changes() {
        let mut local = EventFlags::new();
        local.as_bytes_mut()[0x52] = 0x5A;
        let mut incoming = EventFlags::new();
        incoming.as_bytes_mut()[0x52] = 0xA5;

        let changes = merge_event_flags(&incoming, &mut local);

        assert!(changes.is_empty());
        assert_eq!(local.byte(0x52), Some(0x5A));
    }

    #[test]
    fn test_accumulate_never_clears() {
        let mut local = [0b1010_0000u8, 0x00, 0xFF];
        let incoming = [0b0000_0101u8, 0x00, 0x00];

        let changes = merge_accumulate(&incoming, &mut local);

        assert_eq!(local, [0b1010_0101, 0x00, 0xFF]);
        assert_eq!(changes.len(), 1);
        assert!(merge_accumulate(&incoming, &mut local).is_empty());
    }
}
