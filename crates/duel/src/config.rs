//! Server configuration, loaded from TOML.
//!
//! Every section is `#[serde(default)]`, so an empty or partial file is a
//! valid configuration. [`ServerConfig::load`] reads a file, applies the
//! `DUEL_LISTEN_ADDR` override, and validates the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use duel_protocol::RoomId;
use duel_room::{ChatConfig, GameRegistry, ManagerConfig};
use duel_store::MemoryStore;
use serde::Deserialize;

/// Environment variable that overrides `listen_addr`.
pub const LISTEN_ADDR_ENV: &str = "DUEL_LISTEN_ADDR";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`ServerConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub limits: LimitsConfig,
    pub heartbeat: HeartbeatConfig,
    pub rooms: RoomsConfig,
    pub store: StoreConfig,
    pub chat: ChatSection,
    /// Room records loaded into the in-memory store at boot.
    pub seed_rooms: Vec<SeedRoom>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            rooms: RoomsConfig::default(),
            store: StoreConfig::default(),
            chat: ChatSection::default(),
            seed_rooms: Vec::new(),
        }
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Outbound queue capacity, in frames.
    pub outbound_queue: usize,
    /// Largest inbound frame accepted; larger frames close the connection.
    pub max_frame_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            outbound_queue: 256,
            max_frame_bytes: 4096,
        }
    }
}

/// Liveness probing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub ping_interval_secs: u64,
    /// Read deadline, refreshed by every pong.
    pub pong_wait_secs: u64,
    /// Upper bound on a single frame write.
    pub write_wait_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 54,
            pong_wait_secs: 60,
            write_wait_secs: 10,
        }
    }
}

impl HeartbeatConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }
}

/// Room lifecycle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoomsConfig {
    pub sweep_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
        }
    }
}

/// Storage calls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub timeout_secs: u64,
    /// Display-name candidates tried per accepted connection.
    pub name_retries: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            name_retries: 5,
        }
    }
}

/// Chat moderation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub max_length: usize,
    pub max_per_window: usize,
    pub window_secs: u64,
    pub prune_interval_secs: u64,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            max_length: 500,
            max_per_window: 5,
            window_secs: 10,
            prune_interval_secs: 60,
        }
    }
}

/// A room record to create at boot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedRoom {
    pub id: RoomId,
    pub name: String,
    pub game_type: String,
    /// Display name of the host. The room closes when the host leaves.
    pub host: String,
}

impl ServerConfig {
    /// Parses a TOML document. Does not validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path` (or uses defaults when `None`), applies the
    /// environment override, and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config = Self::from_toml_str(&text)?;
                tracing::info!(path = %path.display(), "loaded configuration");
                config
            }
            None => Self::default(),
        };

        if let Ok(addr) = std::env::var(LISTEN_ADDR_ENV) {
            if !addr.is_empty() {
                config.listen_addr = addr;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(name: &str, value: u64) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
            Ok(())
        }

        if self.listen_addr.trim().is_empty() {
            return Err(ConfigError::Invalid("listen_addr must not be empty".into()));
        }
        positive("limits.outbound_queue", self.limits.outbound_queue as u64)?;
        positive("limits.max_frame_bytes", self.limits.max_frame_bytes as u64)?;
        positive("heartbeat.ping_interval_secs", self.heartbeat.ping_interval_secs)?;
        positive("heartbeat.write_wait_secs", self.heartbeat.write_wait_secs)?;
        if self.heartbeat.pong_wait_secs <= self.heartbeat.ping_interval_secs {
            return Err(ConfigError::Invalid(
                "heartbeat.pong_wait_secs must exceed heartbeat.ping_interval_secs".into(),
            ));
        }
        positive("rooms.sweep_interval_secs", self.rooms.sweep_interval_secs)?;
        positive("store.timeout_secs", self.store.timeout_secs)?;
        positive("store.name_retries", self.store.name_retries as u64)?;
        positive("chat.max_length", self.chat.max_length as u64)?;
        positive("chat.max_per_window", self.chat.max_per_window as u64)?;
        positive("chat.window_secs", self.chat.window_secs)?;
        positive("chat.prune_interval_secs", self.chat.prune_interval_secs)?;
        Ok(())
    }

    /// The Manager's share of the configuration.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            outbound_queue: self.limits.outbound_queue,
            store_timeout: Duration::from_secs(self.store.timeout_secs),
            name_retries: self.store.name_retries,
            sweep_interval: Duration::from_secs(self.rooms.sweep_interval_secs),
            chat: ChatConfig {
                max_length: self.chat.max_length,
                max_per_window: self.chat.max_per_window,
                window: Duration::from_secs(self.chat.window_secs),
                prune_interval: Duration::from_secs(self.chat.prune_interval_secs),
            },
        }
    }

    /// A [`MemoryStore`] holding every `seed_rooms` record.
    ///
    /// Seeds whose game type `games` does not know are still inserted, so
    /// joining them reports the unsupported type to the client.
    pub fn seeded_store(&self, games: &GameRegistry) -> MemoryStore {
        let store = MemoryStore::new();
        for seed in &self.seed_rooms {
            if !games.supports(&seed.game_type) {
                tracing::warn!(room_id = %seed.id, game_type = %seed.game_type, "seed room has an unsupported game type");
            }
            store.insert_room(seed.id, &seed.name, &seed.game_type, &seed.host);
        }
        tracing::info!(rooms = self.seed_rooms.len(), "seeded room store");
        store
    }
}
