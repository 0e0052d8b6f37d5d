//! # Lobby Storage
//!
//! Authoritative per-lobby state held by the relay.
//!
//! ## Design
//!
//! - One [`World`] per world id, created on first reference
//! - Lobby-wide event and region flag tables, shared by every world
//! - Presence (last scene / overworld room) per player, used to route
//!   scene-scoped packets

use std::collections::{BTreeMap, HashMap};

use tidewake_core::{
    EventFlags, InventoryItem, RegionFlags, SaveFields, SaveState, SceneFrame, StageId,
    SyncResult,
};

use crate::config::LobbySettings;
use crate::protocol::{PlayerHandle, PlayerId, WorldId};

/// Lifecycle of a world's save.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorldPhase {
    /// Nobody has seeded the save yet.
    #[default]
    Empty,
    /// The first requester's save has been adopted.
    Active,
}

/// One shared save world.
#[derive(Clone, Debug)]
pub struct World {
    id: WorldId,
    phase: WorldPhase,
    save: SaveState,
    region_cache: HashMap<StageId, SceneFrame>,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new(id: WorldId) -> Self {
        Self {
            id,
            phase: WorldPhase::Empty,
            save: SaveState::default(),
            region_cache: HashMap::new(),
        }
    }

    /// World id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> WorldId {
        self.id
    }

    /// Current phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> WorldPhase {
        self.phase
    }

    /// True once seeded.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase == WorldPhase::Active
    }

    /// Authoritative save.
    #[inline]
    #[must_use]
    pub const fn save(&self) -> &SaveState {
        &self.save
    }

    /// Adopts a requester's save and activates the world.
    pub fn seed(&mut self, fields: &SaveFields) {
        fields.overwrite(&mut self.save);
        self.phase = WorldPhase::Active;
    }

    /// Merges an update into the save. Returns true if anything changed.
    pub fn merge(&mut self, fields: &SaveFields) -> bool {
        self.save.merge_fields(fields)
    }

    /// Writes one bottle slot.
    ///
    /// # Errors
    ///
    /// Returns [`tidewake_core::SyncError::InvalidSlot`] for a bad slot.
    pub fn set_bottle(&mut self, slot: u8, item: InventoryItem) -> SyncResult<()> {
        self.save.set_bottle(slot, item)
    }

    /// ORs a relayed frame into the durable cache. Returns true if the
    /// cached frame changed.
    pub fn cache_scene(&mut self, stage: StageId, frame: &SceneFrame) -> bool {
        self.region_cache.entry(stage).or_default().accumulate(frame)
    }

    /// Cached frame for a stage.
    #[must_use]
    pub fn cached_scene(&self, stage: StageId) -> Option<&SceneFrame> {
        self.region_cache.get(&stage)
    }
}

/// Where a player was last seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Presence {
    /// Last reported scene.
    pub scene: Option<String>,
    /// Last reported overworld room.
    pub room: Option<u8>,
}

/// Everything the relay keeps for one lobby.
#[derive(Clone, Debug)]
pub struct LobbyStorage {
    settings: LobbySettings,
    worlds: BTreeMap<WorldId, World>,
    presence: BTreeMap<PlayerId, Presence>,
    handles: BTreeMap<PlayerId, PlayerHandle>,
    /// Lobby-wide event flags.
    pub event_flags: EventFlags,
    /// Lobby-wide region flags.
    pub region_flags: RegionFlags,
}

impl LobbyStorage {
    /// Creates storage for a new lobby.
    #[must_use]
    pub fn new(settings: LobbySettings) -> Self {
        Self {
            settings,
            worlds: BTreeMap::new(),
            presence: BTreeMap::new(),
            handles: BTreeMap::new(),
            event_flags: EventFlags::new(),
            region_flags: RegionFlags::new(),
        }
    }

    /// Lobby settings.
    #[inline]
    #[must_use]
    pub const fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    /// Registers a player.
    pub fn join(&mut self, handle: PlayerHandle) {
        self.presence.insert(handle.id, Presence::default());
        self.handles.insert(handle.id, handle);
    }

    /// Forgets a player. Returns its handle if it was a member.
    pub fn leave(&mut self, player: PlayerId) -> Option<PlayerHandle> {
        self.presence.remove(&player);
        self.handles.remove(&player)
    }

    /// True if `player` joined this lobby.
    #[must_use]
    pub fn is_member(&self, player: PlayerId) -> bool {
        self.handles.contains_key(&player)
    }

    /// Number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.handles.len()
    }

    /// Stored handle for a member.
    #[must_use]
    pub fn handle(&self, player: PlayerId) -> Option<&PlayerHandle> {
        self.handles.get(&player)
    }

    /// Refreshes a member's nickname and declared world.
    pub fn update_handle(&mut self, handle: &PlayerHandle) {
        if let Some(stored) = self.handles.get_mut(&handle.id) {
            stored.clone_from(handle);
        }
    }

    /// Last known presence of a member.
    #[must_use]
    pub fn presence(&self, player: PlayerId) -> Option<&Presence> {
        self.presence.get(&player)
    }

    /// Records a member's scene.
    pub fn set_scene(&mut self, player: PlayerId, scene: &str) {
        if let Some(p) = self.presence.get_mut(&player) {
            p.scene = Some(scene.to_owned());
        }
    }

    /// Records a member's overworld room.
    pub fn set_room(&mut self, player: PlayerId, room: u8) {
        if let Some(p) = self.presence.get_mut(&player) {
            p.room = Some(room);
        }
    }

    /// Every member, in id order.
    pub fn members(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.handles.keys().copied()
    }

    /// Every member except `player`.
    #[must_use]
    pub fn others(&self, player: PlayerId) -> Vec<PlayerId> {
        self.members().filter(|&id| id != player).collect()
    }

    /// Other members whose last known scene equals `player`'s.
    #[must_use]
    pub fn peers_in_scene(&self, player: PlayerId) -> Vec<PlayerId> {
        let Some(scene) = self.presence.get(&player).and_then(|p| p.scene.as_deref()) else {
            return Vec::new();
        };
        self.presence
            .iter()
            .filter(|(id, p)| **id != player && p.scene.as_deref() == Some(scene))
            .map(|(id, _)| *id)
            .collect()
    }

    /// A world, if it exists.
    #[must_use]
    pub fn world(&self, id: WorldId) -> Option<&World> {
        self.worlds.get(&id)
    }

    /// A world, created on first reference.
    pub fn world_or_create(&mut self, id: WorldId) -> &mut World {
        self.worlds.entry(id).or_insert_with(|| {
            tracing::info!("Creating {}", id);
            World::new(id)
        })
    }

    /// Number of worlds.
    #[must_use]
    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }
}
