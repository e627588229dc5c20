//! Configuration management for frameplayer
//!
//! Player defaults (render path, audio routing, initial volume) and the
//! driver's tick cadence are loaded from config files and environment
//! variables, then validated before use.

use crate::player::MediaFormat;
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-player defaults
    pub player: PlayerSettings,

    /// Tick loop settings
    pub playback: PlaybackConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Defaults applied to every player the driver creates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// Use the GPU shared-texture render path
    pub hardware_accelerated: bool,

    /// Decode and play audio
    pub audio_enabled: bool,

    /// Skip video entirely
    pub audio_only: bool,

    /// Audio endpoint name, `None` for the system default
    pub audio_device_id: Option<String>,

    /// Initial volume (0.0 - 1.0)
    pub volume: f32,

    /// Loop playback
    pub loop_playback: bool,

    /// Initial playback rate
    pub playback_rate: f64,
}

/// Tick loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// How often the update signal fires
    pub tick_rate_hz: u32,

    /// Seconds between status reports, 0 disables them
    pub status_interval_secs: u64,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            hardware_accelerated: true,
            audio_enabled: true,
            audio_only: false,
            audio_device_id: None,
            volume: 1.0,
            loop_playback: false,
            playback_rate: 1.0,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60,
            status_interval_secs: 1,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl PlayerSettings {
    /// Build the media format a player is created with
    pub fn media_format(&self) -> MediaFormat {
        MediaFormat::default()
            .hardware_accelerated(self.hardware_accelerated)
            .audio(self.audio_enabled)
            .audio_only(self.audio_only)
            .audio_device_id(self.audio_device_id.clone())
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/frameplayer/config.toml on Linux)
    /// 3. User config file (~/.config/frameplayer/config.toml on Linux)
    /// 4. Environment variables (FRAMEPLAYER_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config.merge_from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config.merge_from_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from an explicit file, still honoring environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| PlayerError::Config("Cannot determine user config path".to_string()))?;
        self.save_to(&path)
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self)
            .config_err("Failed to serialize config")?;

        std::fs::write(path, toml)
            .config_err("Failed to write config file")?;

        Ok(())
    }

    /// Merge configuration from a TOML file
    ///
    /// Sections and keys missing from the file keep their defaults; a file
    /// that is present replaces the values loaded before it.
    fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .config_err("Failed to read config file")?;

        let file_config: Config = toml::from_str(&contents)
            .config_err("Failed to parse config file")?;

        *self = file_config;

        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("FRAMEPLAYER_HARDWARE_ACCELERATED") {
            self.player.hardware_accelerated = parse_flag("FRAMEPLAYER_HARDWARE_ACCELERATED", &value)?;
        }

        if let Ok(value) = std::env::var("FRAMEPLAYER_AUDIO_ENABLED") {
            self.player.audio_enabled = parse_flag("FRAMEPLAYER_AUDIO_ENABLED", &value)?;
        }

        if let Ok(device) = std::env::var("FRAMEPLAYER_AUDIO_DEVICE") {
            self.player.audio_device_id = if device.is_empty() { None } else { Some(device) };
        }

        if let Ok(volume) = std::env::var("FRAMEPLAYER_VOLUME") {
            self.player.volume = volume.parse()
                .map_err(|_| PlayerError::Config("Invalid FRAMEPLAYER_VOLUME".to_string()))?;
        }

        if let Ok(rate) = std::env::var("FRAMEPLAYER_TICK_RATE") {
            self.playback.tick_rate_hz = rate.parse()
                .map_err(|_| PlayerError::Config("Invalid FRAMEPLAYER_TICK_RATE".to_string()))?;
        }

        if let Ok(log_level) = std::env::var("FRAMEPLAYER_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.player.volume) {
            return Err(PlayerError::Config("Volume must be between 0.0 and 1.0".to_string()));
        }

        if !(self.player.playback_rate > 0.0) {
            return Err(PlayerError::Config("Playback rate must be positive".to_string()));
        }

        if self.player.audio_only && !self.player.audio_enabled {
            return Err(PlayerError::Config("audio_only requires audio_enabled".to_string()));
        }

        if self.playback.tick_rate_hz == 0 || self.playback.tick_rate_hz > 1000 {
            return Err(PlayerError::Config("Tick rate must be between 1 and 1000 Hz".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level,
                valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/frameplayer/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA").ok()
            .map(|p| PathBuf::from(p).join("FramePlayer").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/FramePlayer/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return dirs::config_dir()
            .map(|p| p.join("frameplayer").join("config.toml"));

        #[cfg(not(target_os = "linux"))]
        return dirs::config_dir()
            .map(|p| p.join("FramePlayer").join("config.toml"));
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PlayerError::Config(format!("Invalid {}", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.player.hardware_accelerated);
        assert!(config.player.audio_enabled);
        assert_eq!(config.player.volume, 1.0);
        assert_eq!(config.playback.tick_rate_hz, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.player.volume = 1.5;
        assert!(config.validate().is_err());

        config.player.volume = 0.5;
        config.playback.tick_rate_hz = 0;
        assert!(config.validate().is_err());

        config.playback.tick_rate_hz = 30;
        config.general.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.general.log_level = "debug".to_string();
        config.player.audio_enabled = false;
        config.player.audio_only = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str("[player]\nvolume = 0.25\n").unwrap();
        assert_eq!(parsed.player.volume, 0.25);
        assert!(parsed.player.hardware_accelerated);
        assert_eq!(parsed.playback.tick_rate_hz, 60);
        assert_eq!(parsed.general.log_level, "info");
    }

    #[test]
    fn test_media_format_from_settings() {
        let settings = PlayerSettings {
            hardware_accelerated: false,
            audio_device_id: Some("USB Headset".to_string()),
            ..PlayerSettings::default()
        };
        let format = settings.media_format();
        assert!(!format.is_hardware_accelerated());
        assert!(format.is_audio_enabled());
        assert_eq!(format.audio_device(), Some("USB Headset"));
    }

    #[test]
    fn test_save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.player.loop_playback = true;
        config.player.playback_rate = 1.5;
        config.playback.status_interval_secs = 0;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.player.loop_playback);
        assert_eq!(loaded.player.playback_rate, 1.5);
        assert_eq!(loaded.playback.status_interval_secs, 0);
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[player]\nvolume = 4.0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
        assert!(Config::load_from(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("X", "On").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }
}
