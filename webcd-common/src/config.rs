//! Bootstrap configuration loading
//!
//! Settings are resolved in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! CLI and environment overrides are applied by the binary (clap `env`
//! attributes); this module locates and parses the TOML layer.

use crate::profile::StreamProfile;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "WEBCD_CONFIG";

/// Bootstrap configuration loaded from TOML
///
/// Every section is optional; missing keys take compiled defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    /// Drive to select at startup
    pub device: Option<String>,
    pub gnudb: GnudbConfig,
    pub musicbrainz: MusicBrainzConfig,
    pub tools: ToolsConfig,
    /// Initial stream profile, validated like a runtime settings update
    pub stream: Option<toml::Table>,
    pub logging: LoggingConfig,
}

/// HTTP listener
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

/// GNUDB (CDDB protocol) server and client identity
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GnudbConfig {
    pub host: String,
    pub port: u16,
    /// Applies to connect and to each read
    pub timeout_secs: u64,
    pub client_user: String,
    pub client_host: String,
    pub client_name: String,
    pub client_version: String,
}

impl Default for GnudbConfig {
    fn default() -> Self {
        Self {
            host: "gnudb.gnudb.org".to_string(),
            port: 8880,
            timeout_secs: 10,
            client_user: "webcd".to_string(),
            client_host: "localhost".to_string(),
            client_name: "WebCD".to_string(),
            client_version: "1.0".to_string(),
        }
    }
}

impl GnudbConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// MusicBrainz web service
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MusicBrainzConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Result limit for the track-count heuristic search
    pub heuristic_limit: u32,
    /// Result limit for manual album search
    pub search_limit: u32,
    /// Minimum spacing between requests
    pub rate_limit_ms: u64,
}

impl Default for MusicBrainzConfig {
    fn default() -> Self {
        Self {
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            user_agent: "WebCD/1.0 ( https://github.com/webcd )".to_string(),
            timeout_secs: 10,
            heuristic_limit: 5,
            search_limit: 10,
            rate_limit_ms: 1000,
        }
    }
}

impl MusicBrainzConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// External command-line tools and their time limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub cdparanoia: String,
    pub ffmpeg: String,
    pub cd_discid: String,
    pub eject: String,
    pub blockdev: String,
    /// Local player command for the play control path; reads MP3 on stdin
    pub player: Vec<String>,
    pub probe_timeout_secs: u64,
    pub fallback_probe_timeout_secs: u64,
    pub discid_timeout_secs: u64,
    pub eject_timeout_secs: u64,
    pub media_check_timeout_secs: u64,
    /// Device paths checked during discovery
    pub device_candidates: Vec<String>,
    /// Block device class directory scanned for `sr*` drives
    pub sysfs_block: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            cdparanoia: "cdparanoia".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            cd_discid: "cd-discid".to_string(),
            eject: "eject".to_string(),
            blockdev: "blockdev".to_string(),
            player: ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            probe_timeout_secs: 5,
            fallback_probe_timeout_secs: 3,
            discid_timeout_secs: 5,
            eject_timeout_secs: 5,
            media_check_timeout_secs: 2,
            device_candidates: ["/dev/cdrom", "/dev/dvd", "/dev/sr0", "/dev/sr1", "/dev/sr2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sysfs_block: PathBuf::from("/sys/block"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load from a file, or compiled defaults when there is no file
    ///
    /// A missing file is not fatal: it is logged and defaults are used. A file
    /// that exists but does not parse is a configuration error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No config file found, using built-in defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Config file {} not found, using built-in defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Initial stream profile: defaults overlaid with the `[stream]` table
    ///
    /// Invalid entries are dropped with a warning, the same way runtime updates are.
    pub fn initial_profile(&self) -> StreamProfile {
        let mut profile = StreamProfile::default();
        if let Some(table) = &self.stream {
            match serde_json::to_value(table) {
                Ok(serde_json::Value::Object(map)) => {
                    profile.apply_update(&map);
                }
                _ => warn!("Ignoring unreadable [stream] section"),
            }
        }
        profile
    }
}

/// Locate the config file
///
/// Priority: explicit path → `WEBCD_CONFIG` → user config dir → `/etc/webcd`.
/// Returns the explicit/env path even if it does not exist so the caller can warn.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("webcd").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/webcd/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}
