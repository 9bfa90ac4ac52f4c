//! Configuration for the composer service
//!
//! Loads configuration from TOML file at `~/.config/area/composer.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{bail, Context, Result};
use composer_ipc::{DisplayId, DEFAULT_MAX_MESSAGE_BYTES};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub displays: Vec<DisplayConfig>,
}

impl ComposerConfig {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            let config = Self::with_default_display();
            if let Err(e) = config.save(config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(config);
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;

        let config: ComposerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", config_path))?;
        config.check()?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area");

        Ok(config_dir.join("composer.toml"))
    }

    /// A config with one physical 1080p display, written on first run
    pub fn with_default_display() -> Self {
        Self {
            displays: vec![DisplayConfig::default()],
            ..Self::default()
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, toml_string).context("Failed to write config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for display in &self.displays {
            if !seen.insert(display.id) {
                bail!("Display {} is configured more than once", display.id);
            }
        }
        if self.server.queue_depth == 0 {
            bail!("server.queue_depth must be at least 1");
        }
        Ok(())
    }

    /// Socket to listen on: the configured override, else the runtime-dir default
    pub fn socket_path(&self) -> PathBuf {
        self.server
            .socket_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(composer_ipc::socket_path)
    }
}

/// Socket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Overrides `$XDG_RUNTIME_DIR/area-composer.sock`
    pub socket_path: Option<String>,
    /// Largest request frame accepted, in bytes
    pub max_message_bytes: usize,
    /// Requests queued for the engine before clients wait
    pub queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            queue_depth: 64,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives, used when RUST_LOG is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "area_composer=debug,info".to_string(),
        }
    }
}

/// One display known to the headless backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub id: DisplayId,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "virtual")]
    pub is_virtual: bool,
    /// Cache slots for client target buffers
    pub client_target_slots: u32,
    /// Layers the display can scan out; the rest fall back to client composition
    pub max_device_layers: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            id: 0,
            width: 1920,
            height: 1080,
            is_virtual: false,
            client_target_slots: 3,
            max_device_layers: 4,
        }
    }
}
