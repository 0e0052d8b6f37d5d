//! # Lobby Registry
//!
//! Owns the [`LobbyStorage`] of every live lobby.

use std::collections::HashMap;

use super::storage::LobbyStorage;
use crate::config::LobbySettings;
use crate::protocol::LobbyId;

/// All lobbies known to the relay.
#[derive(Clone, Debug, Default)]
pub struct LobbyRegistry {
    lobbies: HashMap<LobbyId, LobbyStorage>,
}

impl LobbyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage for a lobby. Returns false if it already exists.
    pub fn create(&mut self, lobby: LobbyId, settings: LobbySettings) -> bool {
        if self.lobbies.contains_key(&lobby) {
            return false;
        }
        tracing::info!("Lobby {} created", lobby);
        self.lobbies.insert(lobby, LobbyStorage::new(settings));
        true
    }

    /// Drops a lobby and all its worlds.
    pub fn destroy(&mut self, lobby: &LobbyId) -> Option<LobbyStorage> {
        let storage = self.lobbies.remove(lobby);
        if storage.is_some() {
            tracing::info!("Lobby {} destroyed", lobby);
        }
        storage
    }

    /// Storage of a lobby.
    #[must_use]
    pub fn get(&self, lobby: &LobbyId) -> Option<&LobbyStorage> {
        self.lobbies.get(lobby)
    }

    /// Mutable storage of a lobby.
    pub fn get_mut(&mut self, lobby: &LobbyId) -> Option<&mut LobbyStorage> {
        self.lobbies.get_mut(lobby)
    }

    /// Number of lobbies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    /// True if there are no lobbies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }
}
