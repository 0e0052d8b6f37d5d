//! # Tidewake Networking
//!
//! Lobby relay server and client driver for save-state synchronization.
//!
//! ## Architecture
//!
//! ```text
//! CLIENT                              SERVER (relay)
//!   |                                    |
//!   |--- DownloadRequest(save) --------->|  world Empty: seed, "you are host"
//!   |<-- DownloadResponse(host, save?) --|  world Active: send world save
//!   |                                    |
//!   |--- SaveUpdate(save, world) ------->|  merge into world save
//!   |<-- SaveUpdate(merged) -------------|  rebroadcast if anything changed
//!   |                                    |
//!   |--- SceneContextUpdate ------------>|  relay to players in the same scene
//! ```
//!
//! Neither side owns a socket. Inbound bytes are handed to
//! [`SyncServer::handle_packet`] / [`SyncClient::handle_packet`]; outbound
//! bytes are queued as [`NetworkCommand`]s for the host to deliver.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidewake_networking::{LobbyRegistry, Outbox, SyncConfig, SyncServer};
//!
//! let config = SyncConfig::load("tidewake.toml")?;
//! let (outbox, commands) = Outbox::bounded(config.outbox_capacity);
//! let mut server = SyncServer::new(LobbyRegistry::new(), outbox, config);
//!
//! server.handle_packet(player, &bytes)?;
//! for command in commands.try_iter() {
//!     // deliver to the connection
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{ClientStorage, GameMemory, GameStatus, SyncClient};
pub use config::{LobbySettings, SyncConfig};
pub use error::{NetError, NetResult};
pub use protocol::{Envelope, LobbyId, Packet, PacketKind, PlayerHandle, PlayerId, WorldId};
pub use server::{LobbyRegistry, LobbyStorage, SyncServer, World, WorldPhase};
pub use transport::{NetworkCommand, Outbox, OutboxStats};

/// Maximum encoded envelope size.
///
/// We use 1200 bytes to stay below common path MTUs.
pub const MAX_PACKET_SIZE: usize = 1200;

/// Scene name of the overworld, the only scene with room tracking.
pub const OVERWORLD_SCENE: &str = "sea";
