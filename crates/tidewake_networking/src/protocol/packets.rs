//! # Packet Definitions
//!
//! Every message exchanged between clients and the relay.

use tidewake_core::{EventFlags, InventoryItem, RegionFlags, SceneLiveContext};

/// Lobby name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LobbyId(pub String);

impl LobbyId {
    /// Creates a lobby id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Lobby name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LobbyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection-level player identifier assigned by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// A shared save world inside a lobby.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldId(pub u32);

impl std::fmt::Display for WorldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "world#{}", self.0)
    }
}

/// Who sent a packet.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlayerHandle {
    /// Connection id.
    pub id: PlayerId,
    /// Display name.
    pub nickname: String,
    /// World the player declared, if any.
    pub world: Option<WorldId>,
}

impl PlayerHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(id: PlayerId, nickname: impl Into<String>, world: Option<WorldId>) -> Self {
        Self {
            id,
            nickname: nickname.into(),
            world,
        }
    }
}

/// Packet kinds on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// Bidirectional: player moved to a scene.
    SceneChanged = 1,
    /// Bidirectional: player moved to an overworld room.
    RoomChanged = 2,
    /// Client -> Client: "which scene are you in?"
    SceneRequest = 3,
    /// Client -> Server: ask for the world save, offering ours.
    DownloadRequest = 4,
    /// Server -> Client: host flag and optional world save.
    DownloadResponse = 5,
    /// Bidirectional: save blob for a world.
    SaveUpdate = 6,
    /// Bidirectional: one bottle slot changed.
    BottleUpdate = 7,
    /// Bidirectional: global event flags.
    FlagUpdate = 8,
    /// Bidirectional: region flags.
    RegionFlagUpdate = 9,
    /// Bidirectional: live context of one stage.
    SceneContextUpdate = 10,
    /// Server -> Client: human-readable failure.
    Error = 11,
}

impl PacketKind {
    /// Converts from the wire byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::SceneChanged),
            2 => Some(Self::RoomChanged),
            3 => Some(Self::SceneRequest),
            4 => Some(Self::DownloadRequest),
            5 => Some(Self::DownloadResponse),
            6 => Some(Self::SaveUpdate),
            7 => Some(Self::BottleUpdate),
            8 => Some(Self::FlagUpdate),
            9 => Some(Self::RegionFlagUpdate),
            10 => Some(Self::SceneContextUpdate),
            11 => Some(Self::Error),
            _ => None,
        }
    }

    /// True for kinds that read or write save state.
    #[must_use]
    pub const fn is_save_related(self) -> bool {
        matches!(
            self,
            Self::DownloadRequest
                | Self::SaveUpdate
                | Self::BottleUpdate
                | Self::FlagUpdate
                | Self::RegionFlagUpdate
                | Self::SceneContextUpdate
        )
    }
}

/// Decoded packet payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    /// Player moved to a scene.
    SceneChanged {
        /// Scene name.
        scene: String,
    },
    /// Player moved to an overworld room.
    RoomChanged {
        /// Scene name.
        scene: String,
        /// Room number.
        room: u8,
    },
    /// Ask a player for its current scene.
    SceneRequest,
    /// Ask for the world save, offering the local one as seed.
    DownloadRequest {
        /// Serialized local save.
        save: Vec<u8>,
    },
    /// Answer to a download request.
    DownloadResponse {
        /// True if the requester seeded the world.
        host: bool,
        /// Serialized world save, when not host.
        save: Option<Vec<u8>>,
    },
    /// Save blob for a world.
    SaveUpdate {
        /// Serialized save.
        save: Vec<u8>,
        /// World the save belongs to.
        world: WorldId,
    },
    /// One bottle slot changed.
    BottleUpdate {
        /// Slot index.
        slot: u8,
        /// New content.
        item: InventoryItem,
    },
    /// Global event flags.
    FlagUpdate {
        /// Full flag table.
        flags: EventFlags,
    },
    /// Region flags.
    RegionFlagUpdate {
        /// Full flag table.
        flags: RegionFlags,
    },
    /// Live context of one stage.
    SceneContextUpdate {
        /// Stage context.
        context: SceneLiveContext,
        /// World the context belongs to.
        world: WorldId,
    },
    /// Human-readable failure.
    Error {
        /// Message.
        message: String,
    },
}

impl Packet {
    /// Wire kind of this packet.
    #[must_use]
    pub const fn kind(&self) -> PacketKind {
        match self {
            Self::SceneChanged { .. } => PacketKind::SceneChanged,
            Self::RoomChanged { .. } => PacketKind::RoomChanged,
            Self::SceneRequest => PacketKind::SceneRequest,
            Self::DownloadRequest { .. } => PacketKind::DownloadRequest,
            Self::DownloadResponse { .. } => PacketKind::DownloadResponse,
            Self::SaveUpdate { .. } => PacketKind::SaveUpdate,
            Self::BottleUpdate { .. } => PacketKind::BottleUpdate,
            Self::FlagUpdate { .. } => PacketKind::FlagUpdate,
            Self::RegionFlagUpdate { .. } => PacketKind::RegionFlagUpdate,
            Self::SceneContextUpdate { .. } => PacketKind::SceneContextUpdate,
            Self::Error { .. } => PacketKind::Error,
        }
    }
}

/// Presence bit: sender handle follows.
pub const PRESENCE_SENDER: u8 = 1 << 0;
/// Presence bit: target id follows.
pub const PRESENCE_TARGET: u8 = 1 << 1;

/// A packet plus its routing header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Lobby the packet belongs to.
    pub lobby: LobbyId,
    /// Originating player. Stamped by the relay.
    pub sender: Option<PlayerHandle>,
    /// Single recipient, if not a broadcast.
    pub target: Option<PlayerId>,
    /// Payload.
    pub packet: Packet,
}

impl Envelope {
    /// Creates an envelope with no sender or target.
    #[must_use]
    pub fn new(lobby: LobbyId, packet: Packet) -> Self {
        Self {
            lobby,
            sender: None,
            target: None,
            packet,
        }
    }

    /// Sets the sender.
    #[must_use]
    pub fn with_sender(mut self, sender: PlayerHandle) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Sets the target.
    #[must_use]
    pub fn with_target(mut self, target: PlayerId) -> Self {
        self.target = Some(target);
        self
    }

    /// World declared by the sender, if any.
    #[must_use]
    pub fn sender_world(&self) -> Option<WorldId> {
        self.sender.as_ref().and_then(|s| s.world)
    }
}
