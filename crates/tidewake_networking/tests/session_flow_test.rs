//! End-to-end sessions: one relay, several clients, all traffic pumped
//! through in-process queues.

use std::collections::HashMap;

use crossbeam_channel::Receiver;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tidewake_core::{RegionFlags, SaveState, SceneFrame, SceneLiveContext, StageId};
use tidewake_networking::server::WORLD_UNDEFINED_MESSAGE;
use tidewake_networking::{
    Envelope, GameMemory, GameStatus, LobbyId, LobbyRegistry, LobbySettings, NetworkCommand,
    Outbox, Packet, PacketKind, PlayerHandle, PlayerId, SyncClient, SyncConfig, SyncServer,
};

const DUNGEON: &str = "M_NewD2";
const DUNGEON_STAGE: StageId = StageId(3);

struct Game {
    status: GameStatus,
    scene: String,
    save: SaveState,
    live: SceneLiveContext,
    records: HashMap<StageId, SceneFrame>,
}

impl Game {
    fn new(save: SaveState) -> Self {
        Self {
            status: GameStatus {
                scene_name_valid: true,
                scene_frame: 100,
                stage: DUNGEON_STAGE,
                ..GameStatus::default()
            },
            scene: DUNGEON.to_owned(),
            save,
            live: SceneLiveContext::new(DUNGEON_STAGE),
            records: HashMap::new(),
        }
    }
}

impl GameMemory for Game {
    fn status(&self) -> GameStatus {
        self.status
    }
    fn scene_name(&self) -> &str {
        &self.scene
    }
    fn read_save(&self) -> SaveState {
        self.save
    }
    fn write_save(&mut self, save: &SaveState) {
        self.save = *save;
    }
    fn live_context(&self) -> SceneLiveContext {
        self.live
    }
    fn write_live_context(&mut self, context: &SceneLiveContext) {
        self.live = *context;
    }
    fn stage_record(&self, stage: StageId) -> SceneFrame {
        self.records.get(&stage).copied().unwrap_or_default()
    }
    fn write_stage_record(&mut self, stage: StageId, frame: &SceneFrame) {
        self.records.insert(stage, *frame);
    }
}

struct Player {
    id: PlayerId,
    client: SyncClient,
    rx: Receiver<NetworkCommand>,
    game: Game,
}

/// Routes client uploads to the relay and relay sends back to clients.
struct Hub {
    lobby: LobbyId,
    settings: LobbySettings,
    server: SyncServer,
    server_rx: Receiver<NetworkCommand>,
    players: Vec<Player>,
    uploads: Vec<(PlayerId, PacketKind)>,
    stray: Vec<(PlayerId, Envelope)>,
}

impl Hub {
    fn new(settings: LobbySettings) -> Self {
        let lobby = LobbyId::new("windfall");
        let config = SyncConfig {
            lobby: settings,
            ..SyncConfig::default()
        };
        let (outbox, server_rx) = Outbox::bounded(1024);
        let mut server = SyncServer::new(LobbyRegistry::new(), outbox, config);
        assert!(server.create_lobby(lobby.clone()));
        Self {
            lobby,
            settings,
            server,
            server_rx,
            players: Vec::new(),
            uploads: Vec::new(),
            stray: Vec::new(),
        }
    }

    fn join(&mut self, id: u64, save: SaveState) -> usize {
        let (outbox, rx) = Outbox::bounded(1024);
        let mut client = SyncClient::new(
            PlayerId(id),
            format!("p{id}"),
            self.lobby.clone(),
            outbox,
            SyncConfig::default(),
        );
        self.server.player_joined(&self.lobby, client.me().clone());
        client.on_server_connected();
        client.on_lobby_joined(self.settings);
        client.on_save_loaded();

        self.players.push(Player {
            id: PlayerId(id),
            client,
            rx,
            game: Game::new(save),
        });
        self.players.len() - 1
    }

    fn pump(&mut self) {
        loop {
            let mut moved = false;

            for p in &mut self.players {
                for cmd in p.rx.try_iter() {
                    let NetworkCommand::Upload { data } = cmd else {
                        panic!("clients only upload");
                    };
                    self.uploads
                        .push((p.id, Envelope::decode(&data).unwrap().packet.kind()));
                    self.server.handle_packet(p.id, &data).unwrap();
                    moved = true;
                }
            }

            for cmd in self.server_rx.try_iter() {
                let NetworkCommand::Send { player, data } = cmd else {
                    panic!("the relay only sends");
                };
                match self.players.iter_mut().find(|p| p.id == player) {
                    Some(p) => p.client.handle_packet(&data, &mut p.game).unwrap(),
                    None => self.stray.push((player, Envelope::decode(&data).unwrap())),
                }
                moved = true;
            }

            if !moved {
                break;
            }
        }
    }

    fn tick(&mut self, frames: usize) {
        for _ in 0..frames {
            for p in &mut self.players {
                p.client.on_tick(&mut p.game);
            }
            self.pump();
        }
    }

    fn uploads_of(&self, id: PlayerId, kind: PacketKind) -> usize {
        self.uploads
            .iter()
            .filter(|(from, k)| *from == id && *k == kind)
            .count()
    }
}

fn progressed_save() -> SaveState {
    let mut save = SaveState::default();
    save.quest.sword_level = 2;
    save.quest.max_health = 20;
    save.event_flags.set(9, true);
    save
}

#[test]
fn test_first_player_hosts_second_downloads() {
    let mut hub = Hub::new(LobbySettings::default());
    let a = hub.join(1, progressed_save());
    hub.tick(100);
    assert!(hub.players[a].client.is_synced());

    let b = hub.join(2, SaveState::default());
    hub.tick(100);

    let host = &hub.players[a];
    let guest = &hub.players[b];
    assert!(guest.client.is_synced());
    assert!(!guest.client.sync_pending());
    assert_eq!(guest.game.save.quest.sword_level, 2);
    assert_eq!(guest.game.save.quest.max_health, 20);
    assert!(guest.game.save.event_flags.get(9));
    assert_eq!(host.game.save.quest.sword_level, 2);

    // The guest adopted the world save and has nothing new to push.
    assert_eq!(hub.uploads_of(PlayerId(2), PacketKind::SaveUpdate), 0);
}

#[test]
fn test_no_push_before_initial_sync() {
    let mut hub = Hub::new(LobbySettings::default());
    hub.join(1, progressed_save());

    hub.tick(49);
    assert!(hub.uploads.is_empty());

    hub.tick(20);
    assert_eq!(hub.uploads, vec![(PlayerId(1), PacketKind::DownloadRequest)]);
    assert!(!hub.players[0].client.is_synced());

    hub.tick(31);
    assert!(hub.players[0].client.is_synced());
    assert_eq!(hub.uploads_of(PlayerId(1), PacketKind::SaveUpdate), 1);
}

#[test]
fn test_unchanged_state_pushes_once_until_resync() {
    let mut hub = Hub::new(LobbySettings::default());
    hub.join(1, progressed_save());
    hub.tick(70);
    assert!(hub.players[0].client.is_synced());

    hub.tick(200);
    assert_eq!(hub.uploads_of(PlayerId(1), PacketKind::SaveUpdate), 1);

    // The resync budget runs out and the same snapshot goes out again.
    hub.tick(200);
    assert_eq!(hub.uploads_of(PlayerId(1), PacketKind::SaveUpdate), 2);
}

#[test]
fn test_progress_converges_across_players() {
    let mut hub = Hub::new(LobbySettings::default());
    let a = hub.join(1, progressed_save());
    let b = hub.join(2, SaveState::default());
    hub.tick(100);
    assert!(hub.players[a].client.is_synced());
    assert!(hub.players[b].client.is_synced());

    let flag = 8 * 0x10 + 1;
    {
        let guest = &mut hub.players[b].game.save;
        guest.quest.sword_level = 3;
        guest.quest.songs = 0b0100;
        guest.event_flags.set(flag, true);
    }
    hub.tick(40);

    let host = &hub.players[a].game.save;
    assert_eq!(host.quest.sword_level, 3);
    assert_eq!(host.quest.songs, 0b0100);
    assert!(host.event_flags.get(flag));
    assert!(host.event_flags.get(9));

    let world = hub
        .server
        .registry()
        .get(&hub.lobby)
        .and_then(|l| l.world(tidewake_networking::WorldId(0)))
        .map(|w| w.save().quest.sword_level);
    assert_eq!(world, Some(3));
}

#[test]
fn test_scene_context_reaches_same_stage_only() {
    let mut hub = Hub::new(LobbySettings::default());
    let a = hub.join(1, SaveState::default());
    let b = hub.join(2, SaveState::default());
    let c = hub.join(3, SaveState::default());
    hub.tick(100);
    for p in &mut hub.players {
        p.client.on_scene_changed(DUNGEON);
    }
    hub.players[c].game.status.stage = StageId(4);
    hub.players[c].game.live = SceneLiveContext::new(StageId(4));
    hub.pump();
    hub.tick(5);

    hub.players[a].game.live.switches[0] = 0x01;
    hub.players[a].game.live.compass = true;
    hub.tick(2);

    let recorded = hub.players[a].game.records.get(&DUNGEON_STAGE).copied();
    assert_eq!(recorded.map(|r| r.switches[0]), Some(0x01));

    assert_eq!(hub.players[b].game.live.switches[0], 0x01);
    assert!(hub.players[b].game.live.compass);

    assert_eq!(hub.players[c].game.live.switches[0], 0);
    assert!(!hub.players[c].game.live.compass);
    assert_eq!(hub.players[c].game.stage_record(DUNGEON_STAGE).switches[0], 0);
}

#[test]
fn test_missing_world_gets_error() {
    let mut hub = Hub::new(LobbySettings::default());
    let stranger = PlayerHandle::new(PlayerId(9), "drifter", None);
    hub.server.player_joined(&hub.lobby, stranger.clone());

    let bytes = Envelope::new(hub.lobby.clone(), Packet::DownloadRequest { save: Vec::new() })
        .with_sender(stranger)
        .encode()
        .unwrap();
    hub.server.handle_packet(PlayerId(9), &bytes).unwrap();
    hub.pump();

    assert_eq!(hub.stray.len(), 1);
    let (to, envelope) = &hub.stray[0];
    assert_eq!(*to, PlayerId(9));
    assert_eq!(
        envelope.packet,
        Packet::Error {
            message: WORLD_UNDEFINED_MESSAGE.to_owned()
        }
    );
    assert_eq!(
        hub.server.registry().get(&hub.lobby).map(|l| l.world_count()),
        Some(0)
    );
}

#[test]
fn test_data_syncing_disabled_keeps_saves_local() {
    let mut hub = Hub::new(LobbySettings {
        data_syncing: false,
        ..LobbySettings::default()
    });
    hub.join(1, progressed_save());
    hub.join(2, SaveState::default());
    hub.tick(400);

    assert_eq!(hub.uploads_of(PlayerId(1), PacketKind::DownloadRequest), 0);
    assert_eq!(hub.uploads_of(PlayerId(1), PacketKind::SaveUpdate), 0);
    assert_eq!(hub.players[1].game.save, SaveState::default());
    assert!(!hub.players[1].client.is_synced());
}

#[test]
fn test_unsynced_player_waits_for_download() {
    let mut hub = Hub::new(LobbySettings::default());
    let a = hub.join(1, progressed_save());
    hub.tick(100);
    let b = hub.join(2, SaveState::default());

    {
        let host = &mut hub.players[a].game.save;
        host.quest.sword_level = 4;
        host.event_flags.as_bytes_mut()[0x10] = 0xFF;
    }
    hub.tick(25);

    // The host's push was rebroadcast to everyone, but the newcomer has
    // not settled yet and leaves its memory alone.
    assert_eq!(hub.uploads_of(PlayerId(1), PacketKind::SaveUpdate), 2);
    assert!(!hub.players[b].client.is_synced());
    assert_eq!(hub.players[b].game.save, SaveState::default());

    hub.tick(100);
    let guest = &hub.players[b];
    assert!(guest.client.is_synced());
    assert_eq!(guest.game.save.quest.sword_level, 4);
    assert_eq!(guest.game.save.event_flags.byte(0x10), Some(0xFF));
}

#[test]
fn test_relayed_flags_keep_local_exempt_bits() {
    let mut hub = Hub::new(LobbySettings::default());
    let a = hub.join(1, SaveState::default());
    hub.tick(10);
    let b = hub.join(2, SaveState::default());
    hub.tick(90);
    assert!(hub.players[a].client.is_synced());
    assert!(hub.players[b].client.is_synced());

    // A just polled; B polls ten frames later, before A's next poll.
    hub.players[a].game.save.event_flags.as_bytes_mut()[0x00] = 0b0010_0000;
    hub.players[b].game.save.event_flags.as_bytes_mut()[0x10] = 0xFF;
    hub.tick(15);

    let host = &hub.players[a].game.save.event_flags;
    assert_eq!(host.byte(0x00), Some(0b0010_0000));
    assert_eq!(host.byte(0x10), Some(0xFF));
}

#[test]
fn test_random_progress_converges() {
    let mut rng = StdRng::seed_from_u64(0x7715_0001);
    let mut hub = Hub::new(LobbySettings::default());
    for id in 1..=3 {
        hub.join(id, SaveState::default());
    }
    hub.tick(100);
    assert!(hub.players.iter().all(|p| p.client.is_synced()));

    let mut sword = 0u8;
    let mut songs = 0u8;
    let mut region = RegionFlags::new();

    for _ in 0..12 {
        let who = rng.gen_range(0..hub.players.len());
        let save = &mut hub.players[who].game.save;

        save.quest.sword_level = save.quest.sword_level.max(rng.gen_range(0..5));
        save.quest.songs |= rng.gen::<u8>();
        let flag = rng.gen_range(0..RegionFlags::LEN * 8);
        save.region_flags.set(flag, true);

        sword = sword.max(save.quest.sword_level);
        songs |= save.quest.songs;
        region.set(flag, true);

        hub.tick(40);
    }
    hub.tick(40);

    for p in &hub.players {
        assert_eq!(p.game.save.quest.sword_level, sword, "player {}", p.id);
        assert_eq!(p.game.save.quest.songs, songs, "player {}", p.id);
        assert_eq!(p.game.save.region_flags, region, "player {}", p.id);
    }
}
