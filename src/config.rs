use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::AudioFormat;
use crate::services::OutputPolicy;
use crate::watcher::WatcherSettings;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Hooks {
    #[serde(default)]
    pub track_changed: Option<String>,

    #[serde(default)]
    pub capture_stopped: Option<String>,

    #[serde(default)]
    pub watcher_ready: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_player")]
    pub player: String,

    #[serde(default = "default_player")]
    pub player_binary: String,

    #[serde(default = "default_player")]
    pub player_app_name: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u64,

    #[serde(default)]
    pub number_files: bool,

    #[serde(default = "default_start_track_number")]
    pub start_track_number: u32,

    #[serde(default)]
    pub group_by_artist: bool,

    #[serde(default = "default_separator")]
    pub separator: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,

    #[serde(default)]
    pub capture_device: Option<String>,

    #[serde(default = "default_song_end_guard")]
    pub song_end_guard_secs: u64,

    #[serde(default = "default_song_end_wait")]
    pub song_end_wait_ms: u64,

    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub hooks: Hooks,
}

fn default_player() -> String {
    "spotify".to_string()
}

fn default_output_dir() -> PathBuf {
    std::env::var("HOME")
        .map(|home| PathBuf::from(home).join("Music").join("tapedeck"))
        .unwrap_or_else(|_| PathBuf::from("tapedeck"))
}

fn default_min_duration() -> u64 {
    30
}

fn default_start_track_number() -> u32 {
    1
}

fn default_separator() -> String {
    " - ".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u16 {
    2
}

fn default_song_end_guard() -> u64 {
    5
}

fn default_song_end_wait() -> u64 {
    5000
}

fn default_tick_interval() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    250
}

impl Default for Config {
    fn default() -> Self {
        Self {
            player: default_player(),
            player_binary: default_player(),
            player_app_name: default_player(),
            output_dir: default_output_dir(),
            min_duration_secs: default_min_duration(),
            number_files: false,
            start_track_number: default_start_track_number(),
            group_by_artist: false,
            separator: default_separator(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            capture_device: None,
            song_end_guard_secs: default_song_end_guard(),
            song_end_wait_ms: default_song_end_wait(),
            tick_interval_ms: default_tick_interval(),
            poll_interval_ms: default_poll_interval(),
            hooks: Hooks::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.config/tapedeck/config.json)
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(dir)
        } else {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            PathBuf::from(home).join(".config")
        };

        Ok(config_dir.join("tapedeck").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.player.is_empty() {
            return Err(anyhow::anyhow!("player cannot be empty"));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("output_dir cannot be empty"));
        }

        if self.sample_rate == 0 || self.channels == 0 {
            return Err(anyhow::anyhow!("sample_rate and channels must be non-zero"));
        }

        if self.tick_interval_ms == 0 || self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!(
                "tick_interval_ms and poll_interval_ms must be non-zero"
            ));
        }

        if self.number_files && self.start_track_number == 0 {
            return Err(anyhow::anyhow!("start_track_number must be at least 1"));
        }

        if self.separator.contains(['/', '\\']) {
            return Err(anyhow::anyhow!("separator cannot contain a path separator"));
        }

        Ok(())
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn output_policy(&self) -> OutputPolicy {
        OutputPolicy {
            output_dir: self.output_dir.clone(),
            min_duration_secs: self.min_duration_secs,
            group_by_artist: self.group_by_artist,
            separator: self.separator.clone(),
            format: self.audio_format(),
        }
    }

    pub fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            song_end_guard_secs: self.song_end_guard_secs,
            min_duration_secs: self.min_duration_secs,
            start_track_number: self.number_files.then_some(self.start_track_number),
        }
    }
}
