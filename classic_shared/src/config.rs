//! Configuration system.
//!
//! Server configuration is JSON. Every field has a default so a partial file
//! (or no file at all) is valid; command-line flags override what the file
//! says.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::world::generator::GENERATOR_NAMES;
use crate::world::grid::{volume, MAX_VOLUME};

/// Settings for the world a server hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub name: String,
    /// X extent.
    pub width: i16,
    /// Vertical extent.
    pub depth: i16,
    /// Z extent.
    pub height: i16,
    pub generator: String,
    /// 0 picks a seed from the clock.
    pub seed: u64,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            name: "main".to_string(),
            width: 128,
            depth: 64,
            height: 128,
            generator: "hills".to_string(),
            seed: 0,
        }
    }
}

impl WorldSettings {
    pub fn effective_seed(&self) -> u64 {
        if self.seed != 0 {
            return self.seed;
        }
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64
    }
}

/// Root server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, e.g. `0.0.0.0:25565`.
    pub addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    pub server_name: String,
    pub motd: String,
    pub max_players: usize,
    /// Names that get the operator user type.
    pub operators: Vec<String>,
    pub whitelist_enabled: bool,
    pub whitelist: Vec<String>,
    /// Parent directory of saved worlds.
    pub worlds_dir: PathBuf,
    /// Ticks between autosaves of a dirty level; 0 disables autosave.
    pub autosave_ticks: u64,
    pub world: WorldSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:25565".to_string(),
            tick_hz: 20,
            server_name: "Classic Server".to_string(),
            motd: "Welcome!".to_string(),
            max_players: 32,
            operators: Vec::new(),
            whitelist_enabled: false,
            whitelist: Vec::new(),
            worlds_dir: PathBuf::from("worlds"),
            autosave_ticks: 20 * 60 * 5,
            world: WorldSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Reads config from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Directory the configured world is saved in.
    pub fn world_dir(&self) -> PathBuf {
        self.worlds_dir.join(&self.world.name)
    }

    pub fn is_operator(&self, name: &str) -> bool {
        self.operators.iter().any(|op| op.eq_ignore_ascii_case(name))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_hz == 0 {
            return Err(ConfigError::Invalid("tick_hz must be positive".into()));
        }
        if self.max_players == 0 || self.max_players > 128 {
            return Err(ConfigError::Invalid(format!(
                "max_players must be in 1..=128, got {}",
                self.max_players
            )));
        }
        let w = &self.world;
        if w.width <= 0 || w.depth <= 0 || w.height <= 0 {
            return Err(ConfigError::Invalid(format!(
                "world dimensions must be positive, got {}x{}x{}",
                w.width, w.depth, w.height
            )));
        }
        if volume(w.width, w.depth, w.height) > MAX_VOLUME {
            return Err(ConfigError::Invalid(format!(
                "world of {}x{}x{} exceeds {MAX_VOLUME} blocks",
                w.width, w.depth, w.height
            )));
        }
        if w.name.is_empty() || w.name.contains(&['/', '\\'][..]) || w.name.starts_with('.') {
            return Err(ConfigError::Invalid(format!("bad world name '{}'", w.name)));
        }
        if !GENERATOR_NAMES.contains(&w.generator.as_str()) {
            return Err(ConfigError::UnknownGenerator(w.generator.clone()));
        }
        Ok(())
    }
}
