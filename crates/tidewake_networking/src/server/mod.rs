//! # Sync Server
//!
//! The lobby relay. Holds the authoritative save of every world and routes
//! packets between lobby members.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SYNC SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  bytes ──► Envelope::decode ──► stamp sender ──► dispatch   │
//! │                                                    │        │
//! │              ┌─────────────────────────────────────┤        │
//! │              ▼                                     ▼        │
//! │  ┌───────────────────────┐           ┌───────────────────┐  │
//! │  │ LobbyRegistry         │           │ Outbox            │  │
//! │  │ - worlds / saves      │           │ (crossbeam queue) │  │
//! │  │ - presence            │           └───────────────────┘  │
//! │  │ - lobby flags         │                                  │
//! │  └───────────────────────┘                                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Handler Table
//!
//! | Kind               | Behaviour                                          |
//! |--------------------|----------------------------------------------------|
//! | SceneChanged       | record presence, relay to the other members        |
//! | RoomChanged        | overworld only: record room, relay                 |
//! | SceneRequest       | forward to the target, or every other member       |
//! | DownloadRequest    | seed an empty world or answer with its save        |
//! | SaveUpdate         | merge into the world, rebroadcast if changed       |
//! | BottleUpdate       | write the slot, relay to the other members         |
//! | FlagUpdate         | merge into lobby flags, rebroadcast if changed     |
//! | RegionFlagUpdate   | OR into lobby region flags, rebroadcast if changed |
//! | SceneContextUpdate | relay to same-scene peers, optional durable cache  |
//!
//! Save-related kinds are dropped when the lobby disables data syncing.
//! Nothing here is fatal: lookup misses return silently and codec failures
//! are logged and swallowed.

mod registry;
mod storage;

pub use registry::LobbyRegistry;
pub use storage::{LobbyStorage, Presence, World, WorldPhase};

use tidewake_core::{
    merge_accumulate, merge_event_flags, serializer, EventFlags, InventoryItem, RegionFlags,
    SceneFrame, SceneLiveContext,
};

use crate::config::SyncConfig;
use crate::error::NetResult;
use crate::protocol::{
    Envelope, LobbyId, Packet, PacketSerializer, PlayerHandle, PlayerId, WorldId,
};
use crate::transport::{NetworkCommand, Outbox, OutboxStats};

/// Message sent to a player whose handle carries no world id.
pub const WORLD_UNDEFINED_MESSAGE: &str =
    "The server has encountered an error with your world. (world id is undefined)";

/// The lobby relay.
pub struct SyncServer {
    registry: LobbyRegistry,
    outbox: Outbox,
    config: SyncConfig,
    serializer: PacketSerializer,
}

impl SyncServer {
    /// Creates a server over an existing registry.
    #[must_use]
    pub fn new(registry: LobbyRegistry, outbox: Outbox, config: SyncConfig) -> Self {
        Self {
            registry,
            outbox,
            config,
            serializer: PacketSerializer::new(),
        }
    }

    /// Lobby registry.
    #[must_use]
    pub const fn registry(&self) -> &LobbyRegistry {
        &self.registry
    }

    /// Mutable lobby registry.
    pub fn registry_mut(&mut self) -> &mut LobbyRegistry {
        &mut self.registry
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Outbox statistics.
    #[must_use]
    pub const fn outbox_stats(&self) -> &OutboxStats {
        self.outbox.stats()
    }

    /// Creates a lobby with the configured settings.
    pub fn create_lobby(&mut self, lobby: LobbyId) -> bool {
        self.registry.create(lobby, self.config.lobby)
    }

    /// Drops a lobby and all its worlds.
    pub fn destroy_lobby(&mut self, lobby: &LobbyId) -> bool {
        self.registry.destroy(lobby).is_some()
    }

    /// Registers a player in a lobby. Unknown lobbies are ignored.
    pub fn player_joined(&mut self, lobby: &LobbyId, handle: PlayerHandle) {
        if let Some(storage) = self.registry.get_mut(lobby) {
            tracing::info!("{} joined lobby {}", handle.nickname, lobby);
            storage.join(handle);
        }
    }

    /// Removes a player from a lobby.
    pub fn player_left(&mut self, lobby: &LobbyId, player: PlayerId) {
        if let Some(handle) = self.registry.get_mut(lobby).and_then(|s| s.leave(player)) {
            tracing::info!("{} left lobby {}", handle.nickname, lobby);
        }
    }

    /// Decodes and dispatches one inbound packet from connection `from`.
    ///
    /// # Errors
    ///
    /// Returns the decode error for a malformed envelope. Handler failures
    /// are logged, never returned.
    pub fn handle_packet(&mut self, from: PlayerId, bytes: &[u8]) -> NetResult<()> {
        let envelope = Envelope::decode(bytes)?;
        self.dispatch(from, envelope);
        Ok(())
    }

    fn dispatch(&mut self, from: PlayerId, envelope: Envelope) {
        let Envelope {
            lobby,
            sender,
            target,
            packet,
        } = envelope;

        let Some(storage) = self.registry.get_mut(&lobby) else {
            tracing::debug!("Packet for unknown lobby {}", lobby);
            return;
        };

        let sender = match sender {
            Some(mut handle) => {
                handle.id = from;
                storage.update_handle(&handle);
                handle
            }
            None => storage
                .handle(from)
                .cloned()
                .unwrap_or_else(|| PlayerHandle::new(from, "", None)),
        };

        if packet.kind().is_save_related() && !storage.settings().data_syncing {
            tracing::debug!("Data syncing disabled in {}, dropping {:?}", lobby, packet.kind());
            return;
        }

        let mut ctx = Dispatch {
            lobby: &lobby,
            storage,
            outbox: &mut self.outbox,
            serializer: &mut self.serializer,
            config: &self.config,
            sender,
        };

        match packet {
            Packet::SceneChanged { scene } => ctx.on_scene_changed(scene),
            Packet::RoomChanged { scene, room } => ctx.on_room_changed(scene, room),
            Packet::SceneRequest => ctx.on_scene_request(target),
            Packet::DownloadRequest { save } => ctx.on_download_request(&save),
            Packet::SaveUpdate { save, .. } => ctx.on_save_update(&save),
            Packet::BottleUpdate { slot, item } => ctx.on_bottle_update(slot, item),
            Packet::FlagUpdate { flags } => ctx.on_flag_update(&flags),
            Packet::RegionFlagUpdate { flags } => ctx.on_region_flag_update(&flags),
            Packet::SceneContextUpdate { context, world } => ctx.on_scene_context(context, world),
            Packet::DownloadResponse { .. } | Packet::Error { .. } => {
                tracing::debug!("Ignoring client-bound packet from {}", ctx.sender.id);
            }
        }
    }
}

/// State borrowed for the duration of one handler.
struct Dispatch<'a> {
    lobby: &'a LobbyId,
    storage: &'a mut LobbyStorage,
    outbox: &'a mut Outbox,
    serializer: &'a mut PacketSerializer,
    config: &'a SyncConfig,
    sender: PlayerHandle,
}

impl Dispatch<'_> {
    fn send_to(&mut self, recipients: &[PlayerId], envelope: &Envelope) {
        if recipients.is_empty() {
            return;
        }
        let data = match self.serializer.serialize(envelope) {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                tracing::warn!("Dropping {:?}: {}", envelope.packet.kind(), e);
                return;
            }
        };
        for &player in recipients {
            self.outbox.push(NetworkCommand::Send {
                player,
                data: data.clone(),
            });
        }
    }

    /// Re-sends `packet` with the original sender attached.
    fn relay(&mut self, recipients: &[PlayerId], packet: Packet) {
        let envelope = Envelope::new(self.lobby.clone(), packet).with_sender(self.sender.clone());
        self.send_to(recipients, &envelope);
    }

    /// Sends a server-originated packet.
    fn announce(&mut self, recipients: &[PlayerId], packet: Packet) {
        let envelope = Envelope::new(self.lobby.clone(), packet);
        self.send_to(recipients, &envelope);
    }

    fn reply(&mut self, packet: Packet) {
        let to = self.sender.id;
        let envelope = Envelope::new(self.lobby.clone(), packet).with_target(to);
        self.send_to(&[to], &envelope);
    }

    /// The sender's declared world, or an error packet back to it.
    fn require_world(&mut self) -> Option<WorldId> {
        if self.sender.world.is_none() {
            tracing::warn!("{} sent save data without a world id", self.sender.nickname);
            self.reply(Packet::Error {
                message: WORLD_UNDEFINED_MESSAGE.to_owned(),
            });
        }
        self.sender.world
    }

    fn on_scene_changed(&mut self, scene: String) {
        self.storage.set_scene(self.sender.id, &scene);
        tracing::info!("Player {} moved to scene {}", self.sender.nickname, scene);
        let others = self.storage.others(self.sender.id);
        self.relay(&others, Packet::SceneChanged { scene });
    }

    fn on_room_changed(&mut self, scene: String, room: u8) {
        if scene != self.config.overworld_scene {
            return;
        }
        self.storage.set_room(self.sender.id, room);
        tracing::info!("Player {} moved to room {}", self.sender.nickname, room);
        let others = self.storage.others(self.sender.id);
        self.relay(&others, Packet::RoomChanged { scene, room });
    }

    fn on_scene_request(&mut self, target: Option<PlayerId>) {
        let recipients = match target {
            Some(t) if self.storage.is_member(t) => vec![t],
            Some(_) => Vec::new(),
            None => self.storage.others(self.sender.id),
        };
        let mut envelope = Envelope::new(self.lobby.clone(), Packet::SceneRequest)
            .with_sender(self.sender.clone());
        envelope.target = target;
        self.send_to(&recipients, &envelope);
    }

    fn on_download_request(&mut self, save: &[u8]) {
        let Some(world_id) = self.require_world() else {
            return;
        };
        let world = self.storage.world_or_create(world_id);

        if world.is_active() {
            let blob = serializer::serialize(world.save());
            self.reply(Packet::DownloadResponse {
                host: false,
                save: Some(blob),
            });
            return;
        }

        match serializer::deserialize(save) {
            Ok(fields) => {
                world.seed(&fields);
                tracing::info!(
                    "{} in lobby {} seeded by {}",
                    world_id,
                    self.lobby,
                    self.sender.nickname
                );
                self.reply(Packet::DownloadResponse {
                    host: true,
                    save: None,
                });
            }
            Err(e) => {
                tracing::warn!("Rejected seed save from {}: {}", self.sender.nickname, e);
            }
        }
    }

    fn on_save_update(&mut self, save: &[u8]) {
        let Some(world_id) = self.require_world() else {
            return;
        };
        let fields = match serializer::deserialize(save) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::warn!("Bad save update from {}: {}", self.sender.nickname, e);
                return;
            }
        };

        let world = self.storage.world_or_create(world_id);
        if !world.merge(&fields) {
            return;
        }
        let blob = serializer::serialize(world.save());
        tracing::debug!("{} changed, rebroadcasting", world_id);

        let members: Vec<_> = self.storage.members().collect();
        self.announce(
            &members,
            Packet::SaveUpdate {
                save: blob,
                world: world_id,
            },
        );
    }

    fn on_bottle_update(&mut self, slot: u8, item: InventoryItem) {
        let Some(world_id) = self.require_world() else {
            return;
        };
        if let Err(e) = self.storage.world_or_create(world_id).set_bottle(slot, item) {
            tracing::warn!("Bad bottle update from {}: {}", self.sender.nickname, e);
            return;
        }
        let others = self.storage.others(self.sender.id);
        self.relay(&others, Packet::BottleUpdate { slot, item });
    }

    fn on_flag_update(&mut self, flags: &EventFlags) {
        let changes = merge_event_flags(flags, &mut self.storage.event_flags);
        if changes.is_empty() {
            return;
        }
        for change in changes.as_slice() {
            tracing::debug!(
                "Event flag 0x{:02x}: 0x{:02x} -> 0x{:02x}",
                change.index,
                change.before,
                change.after
            );
        }
        let members: Vec<_> = self.storage.members().collect();
        let flags = self.storage.event_flags;
        self.announce(&members, Packet::FlagUpdate { flags });
    }

    fn on_region_flag_update(&mut self, flags: &RegionFlags) {
        let changes = merge_accumulate(flags.as_bytes(), self.storage.region_flags.as_bytes_mut());
        if changes.is_empty() {
            return;
        }
        tracing::debug!("{} region flag bytes changed", changes.len());
        let members: Vec<_> = self.storage.members().collect();
        let flags = self.storage.region_flags;
        self.announce(&members, Packet::RegionFlagUpdate { flags });
    }

    fn on_scene_context(&mut self, context: SceneLiveContext, world: WorldId) {
        if self.storage.settings().durable_region_cache {
            let world_id = self.sender.world.unwrap_or(world);
            let frame = SceneFrame::from_live(&context);
            if self
                .storage
                .world_or_create(world_id)
                .cache_scene(context.stage, &frame)
            {
                tracing::debug!("Cached {} for {}", context.stage, world_id);
            }
        }
        let peers = self.storage.peers_in_scene(self.sender.id);
        self.relay(&peers, Packet::SceneContextUpdate { context, world });
    }
}
