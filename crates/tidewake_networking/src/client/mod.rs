//! # Sync Client
//!
//! Client-side driver: polls game memory every tick, pushes local progress
//! to the relay and writes remote progress back.
//!
//! ## Lifecycle
//!
//! ```text
//! connected / lobby joined ──► first_time_sync = false
//!        │
//! save loaded (50f) / scene changed (300f)
//!        │
//!        ▼
//! DownloadRequest ──► DownloadResponse ──► settle (20f) ──► first_time_sync
//!                                                              │
//!                      every tick: scene autosave, bottles ◄───┤
//!                      every 20 ticks: save push, flag push ◄──┘
//! ```
//!
//! Remote state is written only once the initial exchange has settled and
//! the game is past the title screen in a valid scene. The download
//! response is the one exception, since it is what settles the exchange.
//! Scene contexts for a stage other than the loaded one are dropped.

mod memory;
mod storage;

pub use memory::{GameMemory, GameStatus};
pub use storage::{ClientStorage, Deferred, TimerAction, TimerQueue};

use tidewake_core::{
    merge_accumulate, merge_event_flags, serializer, snapshot_hash, EventFlags, InventoryItem,
    RegionFlags, SaveState, SceneLiveContext,
};

use crate::config::{LobbySettings, SyncConfig};
use crate::error::NetResult;
use crate::protocol::{
    Envelope, LobbyId, Packet, PacketSerializer, PlayerHandle, PlayerId, WorldId,
};
use crate::transport::{NetworkCommand, Outbox, OutboxStats};

/// Client sync driver for one player.
pub struct SyncClient {
    me: PlayerHandle,
    lobby: LobbyId,
    config: SyncConfig,
    settings: LobbySettings,
    storage: ClientStorage,
    timers: TimerQueue,
    outbox: Outbox,
    serializer: PacketSerializer,
    sync_pending: bool,
    frame: u64,
}

impl SyncClient {
    /// Creates a client. The declared world comes from `config.world`.
    #[must_use]
    pub fn new(
        id: PlayerId,
        nickname: impl Into<String>,
        lobby: LobbyId,
        outbox: Outbox,
        config: SyncConfig,
    ) -> Self {
        let world = WorldId(config.world);
        Self {
            me: PlayerHandle::new(id, nickname, Some(world)),
            lobby,
            settings: config.lobby,
            storage: ClientStorage::new(world, config.resync_budget),
            config,
            timers: TimerQueue::new(),
            outbox,
            serializer: PacketSerializer::new(),
            sync_pending: false,
            frame: 0,
        }
    }

    /// Our handle as sent to the relay.
    #[must_use]
    pub const fn me(&self) -> &PlayerHandle {
        &self.me
    }

    /// Lobby we belong to.
    #[must_use]
    pub const fn lobby(&self) -> &LobbyId {
        &self.lobby
    }

    /// Client storage.
    #[must_use]
    pub const fn storage(&self) -> &ClientStorage {
        &self.storage
    }

    /// Settings inherited from the lobby.
    #[must_use]
    pub const fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    /// True once the initial exchange has settled.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.storage.first_time_sync
    }

    /// True while a download request is outstanding.
    #[must_use]
    pub const fn sync_pending(&self) -> bool {
        self.sync_pending
    }

    /// Number of scheduled timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Outbox statistics.
    #[must_use]
    pub const fn outbox_stats(&self) -> &OutboxStats {
        self.outbox.stats()
    }

    /// Changes the declared world.
    pub fn set_world(&mut self, world: WorldId) {
        self.storage.world = world;
        self.me.world = Some(world);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Connection to the relay established.
    pub fn on_server_connected(&mut self) {
        tracing::debug!("Connected to server");
        self.storage.first_time_sync = false;
    }

    /// Joined a lobby; adopt its settings.
    pub fn on_lobby_joined(&mut self, settings: LobbySettings) {
        self.storage.first_time_sync = false;
        self.settings = settings;
        tracing::info!("Settings inherited from lobby {}", self.lobby);
    }

    /// A save file finished loading.
    pub fn on_save_loaded(&mut self) {
        self.schedule_download(self.config.save_loaded_delay);
    }

    /// The player entered a new scene.
    pub fn on_scene_changed(&mut self, scene: &str) {
        self.schedule_download(self.config.scene_changed_delay);
        self.storage.autosave.reset();
        self.send(
            Packet::SceneChanged {
                scene: scene.to_owned(),
            },
            None,
        );
        tracing::info!("I moved to scene {}", scene);
    }

    /// The player entered a new room.
    pub fn on_room_changed(&mut self, scene: &str, room: u8) {
        if scene != self.config.overworld_scene || room == 0 || room == 0xFF {
            return;
        }
        self.send(
            Packet::RoomChanged {
                scene: scene.to_owned(),
                room,
            },
            None,
        );
        tracing::info!("I moved to room {}", room);
    }

    fn schedule_download(&mut self, delay: u32) {
        if self.storage.first_time_sync || self.sync_pending {
            return;
        }
        self.timers.schedule(delay, TimerAction::RequestDownload);
        self.sync_pending = true;
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Runs one frame of sync work.
    pub fn on_tick<M: GameMemory + ?Sized>(&mut self, memory: &mut M) {
        self.frame = self.frame.wrapping_add(1);

        for action in self.timers.advance() {
            self.run_timer(action, memory);
        }

        let status = memory.status();
        if !status.is_syncable() || !self.storage.first_time_sync || !self.settings.data_syncing {
            return;
        }

        self.autosave_scene(memory, &status);
        self.update_bottles(memory, false);
        self.storage.detector.advance_tick();

        let interval = u64::from(self.config.inventory_poll_interval.max(1));
        if self.frame % interval == 0 {
            self.poll_inventory(memory);
        }
    }

    fn run_timer<M: GameMemory + ?Sized>(&mut self, action: TimerAction, memory: &mut M) {
        match action {
            TimerAction::RequestDownload => {
                if self.settings.data_syncing {
                    let save = serializer::serialize(&memory.read_save());
                    tracing::info!("Requesting {} from the server", self.storage.world);
                    self.send(Packet::DownloadRequest { save }, None);
                }
            }
            TimerAction::CompleteFirstSync => {
                self.storage.first_time_sync = true;
                self.update_bottles(memory, true);
                tracing::info!("Initial sync complete");
            }
        }
    }

    fn autosave_scene<M: GameMemory + ?Sized>(&mut self, memory: &mut M, status: &GameStatus) {
        if status.loading_zone || status.scene_frame <= self.config.autosave_min_scene_frame {
            return;
        }
        let mut live = memory.live_context();
        live.stage = status.stage;
        let mut record = memory.stage_record(live.stage);
        if !self.storage.autosave.capture(&live, &mut record) {
            return;
        }

        tracing::info!("Autosaved {}", live.stage);
        memory.write_stage_record(live.stage, &record);
        self.send(
            Packet::SceneContextUpdate {
                context: live,
                world: self.storage.world,
            },
            None,
        );
    }

    fn update_bottles<M: GameMemory + ?Sized>(&mut self, memory: &M, only_fill_cache: bool) {
        let bottles = memory.read_save().bottles;
        let mut changed = Vec::new();

        for (slot, (&item, cached)) in bottles
            .iter()
            .zip(self.storage.bottle_cache.iter_mut())
            .enumerate()
        {
            if item != *cached {
                *cached = item;
                changed.push((slot, item));
            }
        }

        for (slot, item) in changed {
            tracing::info!("Bottle update: slot {} -> {:?}", slot, item);
            if !only_fill_cache {
                #[allow(clippy::cast_possible_truncation)]
                let slot = slot as u8;
                self.send(Packet::BottleUpdate { slot, item }, None);
            }
        }
    }

    fn poll_inventory<M: GameMemory + ?Sized>(&mut self, memory: &M) {
        let save = memory.read_save();

        let blob = serializer::serialize(&save);
        if let Some(hash) = self.storage.detector.poll(&blob) {
            tracing::debug!("Pushing save {}", hash);
            self.send(
                Packet::SaveUpdate {
                    save: blob,
                    world: self.storage.world,
                },
                None,
            );
        }

        if save.event_flags != self.storage.event_flags {
            for (i, (&old, &new)) in self
                .storage
                .event_flags
                .as_bytes()
                .iter()
                .zip(save.event_flags.as_bytes())
                .enumerate()
            {
                if old != new && new != 0 {
                    tracing::debug!("Event flag 0x{:02x}: 0x{:02x} -> 0x{:02x}", i, old, new);
                }
            }
            self.storage.event_flags = save.event_flags;
            self.send(
                Packet::FlagUpdate {
                    flags: save.event_flags,
                },
                None,
            );
        }

        if save.region_flags != self.storage.region_flags {
            self.storage.region_flags = save.region_flags;
            self.send(
                Packet::RegionFlagUpdate {
                    flags: save.region_flags,
                },
                None,
            );
        }

        self.storage.snapshot = save;
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Decodes and applies one packet from the relay.
    ///
    /// # Errors
    ///
    /// Returns the decode error for a malformed envelope. Handler failures
    /// are logged, never returned.
    pub fn handle_packet<M: GameMemory + ?Sized>(
        &mut self,
        bytes: &[u8],
        memory: &mut M,
    ) -> NetResult<()> {
        let envelope = Envelope::decode(bytes)?;
        if envelope.lobby != self.lobby {
            tracing::debug!("Ignoring packet for lobby {}", envelope.lobby);
            return Ok(());
        }
        let sender = envelope.sender;

        match envelope.packet {
            Packet::SceneChanged { scene } => self.on_remote_scene(sender, scene),
            Packet::RoomChanged { scene, room } => self.on_remote_room(sender, scene, room),
            Packet::SceneRequest => self.on_scene_request(sender.as_ref(), memory),
            Packet::DownloadResponse { host, save } => {
                self.on_download_response(host, save.as_deref(), memory);
            }
            Packet::SaveUpdate { save, world } => self.on_save_update(&save, world, memory),
            Packet::BottleUpdate { slot, item } => {
                let world = sender.and_then(|s| s.world);
                self.on_bottle_update(world, slot, item, memory);
            }
            Packet::FlagUpdate { flags } => self.on_flag_update(&flags, memory),
            Packet::RegionFlagUpdate { flags } => self.on_region_flag_update(&flags, memory),
            Packet::SceneContextUpdate { context, world } => {
                self.on_scene_context(&context, world, memory);
            }
            Packet::Error { message } => tracing::error!("{}", message),
            Packet::DownloadRequest { .. } => {}
        }
        Ok(())
    }

    fn on_remote_scene(&mut self, sender: Option<PlayerHandle>, scene: String) {
        let Some(sender) = sender else {
            return;
        };
        tracing::info!("Player {} moved to scene {}", sender.nickname, scene);
        self.storage.remote_scenes.insert(sender.id, scene);
    }

    fn on_remote_room(&mut self, sender: Option<PlayerHandle>, scene: String, room: u8) {
        let Some(sender) = sender else {
            return;
        };
        if scene == self.config.overworld_scene && room != 0 {
            tracing::info!("Player {} moved to room {}", sender.nickname, room);
        }
        self.storage.remote_scenes.insert(sender.id, scene);
    }

    fn on_scene_request<M: GameMemory + ?Sized>(
        &mut self,
        sender: Option<&PlayerHandle>,
        memory: &M,
    ) {
        let Some(sender) = sender else {
            return;
        };
        if !memory.status().scene_name_valid {
            return;
        }
        let scene = memory.scene_name().to_owned();
        self.send(Packet::SceneChanged { scene }, Some(sender.id));
    }

    fn on_download_response<M: GameMemory + ?Sized>(
        &mut self,
        host: bool,
        save: Option<&[u8]>,
        memory: &mut M,
    ) {
        self.sync_pending = false;
        if !memory.status().accepts_remote() {
            return;
        }

        if host {
            tracing::info!("The lobby is mine!");
        } else if let Some(blob) = save {
            match serializer::deserialize(blob) {
                Ok(fields) => {
                    let mut local = memory.read_save();
                    fields.overwrite(&mut local);
                    memory.write_save(&local);
                    self.adopt(&local);
                }
                Err(e) => tracing::warn!("Bad world save from server: {}", e),
            }
        }

        self.timers
            .schedule(self.config.settle_delay, TimerAction::CompleteFirstSync);
    }

    fn on_save_update<M: GameMemory + ?Sized>(
        &mut self,
        save: &[u8],
        world: WorldId,
        memory: &mut M,
    ) {
        if !self.applies_remote(&memory.status()) || world != self.storage.world {
            return;
        }
        let fields = match serializer::deserialize(save) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!("Bad save update: {}", e);
                return;
            }
        };
        let mut local = memory.read_save();
        local.merge_fields(&fields);
        memory.write_save(&local);
        self.adopt(&local);
    }

    fn on_bottle_update<M: GameMemory + ?Sized>(
        &mut self,
        sender_world: Option<WorldId>,
        slot: u8,
        item: InventoryItem,
        memory: &mut M,
    ) {
        if !self.applies_remote(&memory.status())
            || sender_world != Some(self.storage.world)
            || item == InventoryItem::None
        {
            return;
        }
        let mut local = memory.read_save();
        if let Err(e) = local.set_bottle(slot, item) {
            tracing::warn!("Bad bottle update: {}", e);
            return;
        }
        if let Some(cached) = self.storage.bottle_cache.get_mut(usize::from(slot)) {
            *cached = item;
        }
        memory.write_save(&local);
        self.adopt(&local);
    }

    fn on_flag_update<M: GameMemory + ?Sized>(&mut self, flags: &EventFlags, memory: &mut M) {
        let status = memory.status();
        if !self.applies_remote(&status) || status.loading_zone {
            return;
        }
        let mut local = memory.read_save();
        let changes = merge_event_flags(flags, &mut local.event_flags);
        for change in changes.as_slice() {
            tracing::debug!(
                "Writing event flag 0x{:02x}: 0x{:02x} -> 0x{:02x}",
                change.index,
                change.before,
                change.after
            );
        }
        if !changes.is_empty() {
            memory.write_save(&local);
        }
        self.storage.event_flags = local.event_flags;
    }

    fn on_region_flag_update<M: GameMemory + ?Sized>(
        &mut self,
        flags: &RegionFlags,
        memory: &mut M,
    ) {
        let status = memory.status();
        if !self.applies_remote(&status) || status.loading_zone {
            return;
        }
        let mut local = memory.read_save();
        if !merge_accumulate(flags.as_bytes(), local.region_flags.as_bytes_mut()).is_empty() {
            memory.write_save(&local);
        }
        self.storage.region_flags = local.region_flags;
    }

    fn on_scene_context<M: GameMemory + ?Sized>(
        &mut self,
        context: &SceneLiveContext,
        world: WorldId,
        memory: &mut M,
    ) {
        let status = memory.status();
        if !self.applies_remote(&status) || status.loading_zone || world != self.storage.world {
            return;
        }
        if status.stage != context.stage {
            tracing::debug!("Dropping context for {} while in {}", context.stage, status.stage);
            return;
        }

        let mut live = memory.live_context();
        if live.absorb(context) {
            memory.write_live_context(&live);
        }
        let save = memory.read_save();
        self.storage.detector.acknowledge(snapshot_hash(&save));
    }

    /// Remote state is written only after the initial exchange has settled
    /// and while the game is in a real scene.
    const fn applies_remote(&self, status: &GameStatus) -> bool {
        self.storage.first_time_sync && status.accepts_remote()
    }

    /// Records `save` as the state the relay already knows.
    fn adopt(&mut self, save: &SaveState) {
        self.storage.detector.acknowledge(snapshot_hash(save));
        self.storage.snapshot = *save;
        self.storage.event_flags = save.event_flags;
        self.storage.region_flags = save.region_flags;
    }

    fn send(&mut self, packet: Packet, target: Option<PlayerId>) {
        let mut envelope = Envelope::new(self.lobby.clone(), packet).with_sender(self.me.clone());
        envelope.target = target;
        match self.serializer.serialize(&envelope) {
            Ok(bytes) => {
                let data = bytes.to_vec();
                self.outbox.push(NetworkCommand::Upload { data });
            }
            Err(e) => tracing::warn!("Dropping {:?}: {}", envelope.packet.kind(), e),
        }
    }
}
