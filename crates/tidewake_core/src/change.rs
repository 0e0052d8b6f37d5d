//! # Change Detection
//!
//! Decides when a client pushes its save to the relay.
//!
//! ## Design
//!
//! ```text
//! serialize(save) ──► SipHash-2-4 ──► SnapshotHash
//!                                        │
//!                    last_pushed == h? ──┴── yes ► nothing to send
//!                                        no  ► push, remember h
//! ```
//!
//! A push that the relay dropped would otherwise never be retried while the
//! state stays unchanged. After `resync_budget` ticks without a push the
//! detector swaps the remembered hash for [`SnapshotHash::reset_sentinel`],
//! which no real snapshot matches in practice, so the next poll pushes again.

use std::hash::Hasher;

use siphasher::sip::SipHasher24;

use crate::save::SaveState;
use crate::serializer;

/// Ticks without a push before a resend is forced.
pub const DEFAULT_RESYNC_BUDGET: u32 = 300;

const HASH_KEY_0: u64 = 0x7469_6465_7761_6b65;
const HASH_KEY_1: u64 = 0x7361_7665_5f76_3031;

/// 64-bit content hash of a serialized snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotHash(pub u64);

impl SnapshotHash {
    /// Hash of the literal bytes `RESET`, used to force a resend.
    #[must_use]
    pub fn reset_sentinel() -> Self {
        hash_bytes(b"RESET")
    }
}

impl std::fmt::Display for SnapshotHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Hashes arbitrary bytes with the fixed snapshot keys.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> SnapshotHash {
    let mut hasher = SipHasher24::new_with_keys(HASH_KEY_0, HASH_KEY_1);
    hasher.write(bytes);
    SnapshotHash(hasher.finish())
}

/// Hash of a save's serialized form.
#[must_use]
pub fn snapshot_hash(save: &SaveState) -> SnapshotHash {
    hash_bytes(&serializer::serialize(save))
}

/// Tracks the last pushed snapshot and the forced-resync countdown.
#[derive(Clone, Debug)]
pub struct ChangeDetector {
    last_pushed: Option<SnapshotHash>,
    ticks_since_push: u32,
    resync_budget: u32,
}

impl ChangeDetector {
    /// Creates a detector that forces a resend after `resync_budget` ticks.
    #[must_use]
    pub const fn new(resync_budget: u32) -> Self {
        Self {
            last_pushed: None,
            ticks_since_push: 0,
            resync_budget,
        }
    }

    /// Last remembered hash.
    #[inline]
    #[must_use]
    pub const fn last_pushed(&self) -> Option<SnapshotHash> {
        self.last_pushed
    }

    /// Ticks counted since the last push.
    #[inline]
    #[must_use]
    pub const fn ticks_since_push(&self) -> u32 {
        self.ticks_since_push
    }

    /// Checks a serialized snapshot.
    ///
    /// Returns the new hash if `blob` must be pushed. The hash is recorded
    /// as pushed and the tick counter restarts.
    pub fn poll(&mut self, blob: &[u8]) -> Option<SnapshotHash> {
        if self.ticks_since_push > self.resync_budget {
            self.last_pushed = Some(SnapshotHash::reset_sentinel());
        }

        let hash = hash_bytes(blob);
        if self.last_pushed == Some(hash) {
            return None;
        }

        self.last_pushed = Some(hash);
        self.ticks_since_push = 0;
        Some(hash)
    }

    /// Counts one frame of synced play.
    pub fn advance_tick(&mut self) {
        self.ticks_since_push = self.ticks_since_push.saturating_add(1);
    }

    /// Records a hash as already known to the relay, e.g. after applying a
    /// remote update, so it is not echoed back.
    pub fn acknowledge(&mut self, hash: SnapshotHash) {
        self.last_pushed = Some(hash);
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_RESYNC_BUDGET)
    }
}
