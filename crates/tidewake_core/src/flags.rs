//! # Flag Bitsets
//!
//! Fixed-length byte-addressed bitsets mirroring the game's flag tables.
//!
//! Bit `n` of byte `i` is flag `i * 8 + n`. Sizes are fixed at compile
//! time, so a decoded bitset is always exactly as long as the local one.

use crate::error::{SyncError, SyncResult};

/// Size of the global event flag table in bytes.
pub const EVENT_FLAG_BYTES: usize = 0x100;

/// Size of the region flag table in bytes.
pub const REGION_FLAG_BYTES: usize = 0x40;

/// A fixed-size flag bitset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlagSet<const N: usize> {
    bytes: [u8; N],
}

/// Global story/quest progress flags.
pub type EventFlags = FlagSet<EVENT_FLAG_BYTES>;

/// Area-level progress flags.
pub type RegionFlags = FlagSet<REGION_FLAG_BYTES>;

impl<const N: usize> FlagSet<N> {
    /// Number of bytes in the set.
    pub const LEN: usize = N;

    /// Creates an all-clear bitset.
    #[must_use]
    pub const fn new() -> Self {
        Self { bytes: [0; N] }
    }

    /// Wraps raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    /// Copies a slice of exactly `N` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Truncated`] if the slice is shorter than `N`,
    /// or [`SyncError::FieldWidth`] if it is longer.
    pub fn from_slice(slice: &[u8]) -> SyncResult<Self> {
        if slice.len() < N {
            return Err(SyncError::Truncated {
                offset: 0,
                needed: N,
                available: slice.len(),
            });
        }
        if slice.len() > N {
            return Err(SyncError::FieldWidth {
                field: "flags",
                expected: N,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    /// Raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Mutable raw bytes.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    /// Returns the byte at `index`, or `None` past the end.
    #[inline]
    #[must_use]
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.bytes.get(index).copied()
    }

    /// Returns whether flag `flag` is set. Out-of-range flags read as clear.
    #[inline]
    #[must_use]
    pub fn get(&self, flag: usize) -> bool {
        self.bytes
            .get(flag / 8)
            .is_some_and(|b| b & (1 << (flag % 8)) != 0)
    }

    /// Sets or clears flag `flag`. Out-of-range flags are ignored.
    #[inline]
    pub fn set(&mut self, flag: usize, value: bool) {
        if let Some(b) = self.bytes.get_mut(flag / 8) {
            let mask = 1u8 << (flag % 8);
            if value {
                *b |= mask;
            } else {
                *b &= !mask;
            }
        }
    }

    /// Number of set flags.
    #[must_use]
    pub fn count_set(&self) -> u32 {
        self.bytes.iter().map(|b| b.count_ones()).sum()
    }

    /// Returns true if no flag is set.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }
}

impl<const N: usize> Default for FlagSet<N> {
    fn default() -> Self {
        Self::new()
    }
}
