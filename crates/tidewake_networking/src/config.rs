//! # Configuration
//!
//! Tunables for the client driver and the relay, loaded from TOML.
//!
//! ```toml
//! resync_budget = 300
//! inventory_poll_interval = 20
//! world = 2
//!
//! [lobby]
//! data_syncing = true
//! durable_region_cache = false
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tidewake_core::DEFAULT_RESYNC_BUDGET;

use crate::error::{NetError, NetResult};
use crate::OVERWORLD_SCENE;

/// Per-lobby settings negotiated when a player joins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbySettings {
    /// Master switch for save, flag, bottle and scene sync.
    pub data_syncing: bool,
    /// Server keeps an OR-merged copy of every scene frame it relays.
    pub durable_region_cache: bool,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            data_syncing: true,
            durable_region_cache: false,
        }
    }
}

/// Sync configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Ticks without a push before the client re-sends its save.
    pub resync_budget: u32,
    /// Frames between inventory and flag polls.
    pub inventory_poll_interval: u32,
    /// Frames between a download response and the first push.
    pub settle_delay: u32,
    /// Frames between save load and the download request.
    pub save_loaded_delay: u32,
    /// Frames between a scene change and the download request.
    pub scene_changed_delay: u32,
    /// Scene frame count that must be exceeded before autosaving.
    pub autosave_min_scene_frame: u32,
    /// Scene name that carries room numbers.
    pub overworld_scene: String,
    /// World the client declares.
    pub world: u32,
    /// Capacity of the outbound command channel.
    pub outbox_capacity: usize,
    /// Settings for lobbies created by this process.
    pub lobby: LobbySettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            resync_budget: DEFAULT_RESYNC_BUDGET,
            inventory_poll_interval: 20,
            settle_delay: 20,
            save_loaded_delay: 50,
            scene_changed_delay: 300,
            autosave_min_scene_frame: 20,
            overworld_scene: OVERWORLD_SCENE.to_owned(),
            world: 0,
            outbox_capacity: 4096,
            lobby: LobbySettings::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::InvalidConfig`] if the document does not parse or
    /// a value is out of range.
    pub fn from_toml_str(text: &str) -> NetResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| NetError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::InvalidConfig`] if the file cannot be read or
    /// parsed.
    pub fn load(path: impl AsRef<Path>) -> NetResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NetError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded sync config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> NetResult<()> {
        if self.inventory_poll_interval == 0 {
            return Err(NetError::InvalidConfig(
                "inventory_poll_interval must be at least 1".to_owned(),
            ));
        }
        if self.outbox_capacity == 0 {
            return Err(NetError::InvalidConfig(
                "outbox_capacity must be at least 1".to_owned(),
            ));
        }
        if self.overworld_scene.is_empty() {
            return Err(NetError::InvalidConfig(
                "overworld_scene must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}
