//! # Tidewake Core
//!
//! Pure data transforms behind save-state synchronization.
//!
//! ## Layout
//!
//! - [`flags`]: fixed-size event/region flag bitsets
//! - [`merge`]: per-bit merge rules and the exemption table
//! - [`scene`]: per-stage live context and its fixed 0x24-byte frame
//! - [`save`]: the save-state object graph
//! - [`serializer`]: schema-driven save blob codec
//! - [`change`]: snapshot hashing and the push/resync detector
//!
//! ## Rules
//!
//! 1. **No I/O** - everything here is an in-memory transform
//! 2. **Idempotent merges** - re-applying an update is always a no-op
//! 3. **No panics on input** - decoders return [`SyncResult`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidewake_core::{serializer, ChangeDetector, SaveState};
//!
//! let mut detector = ChangeDetector::new(300);
//! let save = SaveState::default();
//! let blob = serializer::serialize(&save);
//! if detector.poll(&blob).is_some() {
//!     // push `blob` to the relay
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod change;
pub mod error;
pub mod flags;
pub mod merge;
pub mod save;
pub mod scene;
pub mod serializer;

pub use change::{hash_bytes, snapshot_hash, ChangeDetector, SnapshotHash, DEFAULT_RESYNC_BUDGET};
pub use error::{SyncError, SyncResult};
pub use flags::{EventFlags, FlagSet, RegionFlags, EVENT_FLAG_BYTES, REGION_FLAG_BYTES};
pub use merge::{
    merge_accumulate, merge_event_flags, ExemptEntry, FlagChange, FlagChanges,
    EVENT_FLAG_EXEMPTIONS,
};
pub use save::{InventoryItem, MagicMeter, QuestStatus, SaveState, BOTTLE_SLOTS};
pub use scene::{
    SceneAutosave, SceneFrame, SceneLiveContext, StageId, SCENE_FRAME_SIZE, SCENE_WIRE_SIZE,
};
pub use serializer::{ByteReader, ByteWriter, FieldId, SaveFields};
