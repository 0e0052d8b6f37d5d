//! # Game Memory Interface
//!
//! The seam between the client driver and the running game.
//!
//! ```text
//! SyncClient defines:     The emulator glue implements:
//! ┌──────────────────┐    ┌──────────────────┐
//! │ trait GameMemory │ ←─ │ impl GameMemory  │
//! └──────────────────┘    └──────────────────┘
//! ```
//!
//! All reads return owned snapshots; all writes replace whole values.

use tidewake_core::{SaveState, SceneFrame, SceneLiveContext, StageId};

/// Per-frame game status used by the sync guards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GameStatus {
    /// Title screen is showing.
    pub title_screen: bool,
    /// Current scene name is a real scene.
    pub scene_name_valid: bool,
    /// Game is paused.
    pub paused: bool,
    /// A loading zone transition is in progress.
    pub loading_zone: bool,
    /// Frames since the current scene loaded.
    pub scene_frame: u32,
    /// Stage currently loaded.
    pub stage: StageId,
}

impl GameStatus {
    /// True when remote updates may be written into memory.
    #[inline]
    #[must_use]
    pub const fn accepts_remote(&self) -> bool {
        !self.title_screen && self.scene_name_valid
    }

    /// True when local state may be read and pushed.
    #[inline]
    #[must_use]
    pub const fn is_syncable(&self) -> bool {
        self.accepts_remote() && !self.paused
    }
}

/// Read/write access to the game's save and stage memory.
pub trait GameMemory {
    /// Current status flags.
    fn status(&self) -> GameStatus;

    /// Name of the current scene.
    fn scene_name(&self) -> &str;

    /// Snapshot of the save-state fields.
    fn read_save(&self) -> SaveState;

    /// Replaces the save-state fields.
    fn write_save(&mut self, save: &SaveState);

    /// Live context of the loaded stage.
    fn live_context(&self) -> SceneLiveContext;

    /// Replaces the live context of the loaded stage.
    fn write_live_context(&mut self, context: &SceneLiveContext);

    /// Persisted record of a stage.
    fn stage_record(&self, stage: StageId) -> SceneFrame;

    /// Replaces the persisted record of a stage.
    fn write_stage_record(&mut self, stage: StageId, frame: &SceneFrame);
}
