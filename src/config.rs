use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory of the MPD music library (catalog URIs are relative
    /// to this path).
    pub music_root: Option<PathBuf>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// External analyzer executable; invoked as `<command> <path>` and
    /// expected to print the feature JSON on stdout.
    pub analyzer_command: Option<String>,
    /// MPD connection settings (falls back to MPD_HOST/MPD_PORT).
    pub mpd: MpdConfig,
}

/// MPD server settings from the config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct MpdConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
}

impl AppConfig {
    /// Load config from `~/.config/kindred/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("kindred.db")
    } else {
        // Fallback: current directory
        PathBuf::from("kindred.db")
    }
}
