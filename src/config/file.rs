//! Configuration file management for scopeline.
//!
//! Settings live in `~/.config/scopeline/scopeline.toml`. A missing file is
//! created with default values on first load, so users always have a complete
//! file to edit.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::{CaptureConfig, TriggerConfig, TriggerMode, OVER_COUNTS, TRIGGER_LEVELS};
use crate::scope::viewport::DEFAULT_TIME_WIDTH_MS;
use crate::scope::ScopeOptions;

/// Audio input configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Audio device to use. Options:
    /// - "default" for system default device
    /// - numeric index (0, 1, 2, etc.) from `scopeline list-devices`
    /// - device name from `scopeline list-devices`
    #[serde(default = "default_device")]
    pub device: String,
    /// Requested sample rate in Hz; the device may run at a different rate
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Samples per hardware read
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Chunks held between capture and display before backpressure applies
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_device() -> String {
    "default".to_string()
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_chunk_size() -> usize {
    1024
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            sample_rate: default_sample_rate(),
            chunk_size: default_chunk_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Acquisition mode and trigger thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSection {
    /// "continuous" or "triggered"
    #[serde(default)]
    pub mode: TriggerMode,
    /// One of 16, 32, 64, 160
    #[serde(default = "default_level")]
    pub level: u32,
    /// One of 1, 2, 5, 10, 20, 50
    #[serde(default = "default_over_count")]
    pub over_count: u32,
}

fn default_level() -> u32 {
    TRIGGER_LEVELS[0]
}

fn default_over_count() -> u32 {
    OVER_COUNTS[0]
}

impl Default for TriggerSection {
    fn default() -> Self {
        Self {
            mode: TriggerMode::default(),
            level: default_level(),
            over_count: default_over_count(),
        }
    }
}

/// Initial display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Amplitude knob, 0-100 (50 = ±1024 full height)
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,
    /// Visible time span in milliseconds
    #[serde(default = "default_time_width_ms")]
    pub time_width_ms: f64,
    /// Where saved buffers go. Defaults to ~/.local/share/scopeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_amplitude() -> f64 {
    50.0
}

fn default_time_width_ms() -> f64 {
    DEFAULT_TIME_WIDTH_MS
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            amplitude: default_amplitude(),
            time_width_ms: default_time_width_ms(),
            data_dir: None,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopelineConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub trigger: TriggerSection,
    #[serde(default)]
    pub view: ViewConfig,
}

impl ScopelineConfig {
    /// Loads configuration from the user's config directory, writing the
    /// defaults there first if no file exists yet.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If the file cannot be read or written
    /// - If the TOML is malformed or holds unsupported values
    pub fn load() -> anyhow::Result<Self> {
        Self::load_or_create(&config_path()?)
    }

    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ScopelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Rejects values the acquisition core cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.trigger_config()?;
        if self.audio.sample_rate == 0 {
            anyhow::bail!("audio.sample_rate must be greater than zero");
        }
        if self.audio.chunk_size == 0 {
            anyhow::bail!("audio.chunk_size must be greater than zero");
        }
        if self.audio.queue_capacity == 0 {
            anyhow::bail!("audio.queue_capacity must be greater than zero");
        }
        if !(self.view.time_width_ms.is_finite() && self.view.time_width_ms > 0.0) {
            anyhow::bail!("view.time_width_ms must be a positive number");
        }
        if !(0.0..=100.0).contains(&self.view.amplitude) {
            anyhow::bail!("view.amplitude must be between 0 and 100");
        }
        Ok(())
    }

    pub fn trigger_config(&self) -> anyhow::Result<TriggerConfig> {
        let mut trigger = TriggerConfig {
            mode: self.trigger.mode,
            ..TriggerConfig::default()
        };
        trigger.set_level(self.trigger.level)?;
        trigger.set_over_count(self.trigger.over_count)?;
        Ok(trigger)
    }

    pub fn scope_options(&self) -> anyhow::Result<ScopeOptions> {
        Ok(ScopeOptions {
            capture: CaptureConfig {
                sample_rate: self.audio.sample_rate,
                chunk_size: self.audio.chunk_size,
            },
            trigger: self.trigger_config()?,
            queue_capacity: self.audio.queue_capacity,
            time_width_ms: self.view.time_width_ms,
            amplitude_knob: self.view.amplitude,
        })
    }

    /// Directory for saved buffers.
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.view.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("scopeline"))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))
    }
}

/// `~/.config/scopeline/scopeline.toml`
pub fn config_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(home.join(".config").join("scopeline").join("scopeline.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("scopeline.toml");

        let config = ScopelineConfig::load_or_create(&path).unwrap();
        assert_eq!(config, ScopelineConfig::default());
        assert!(path.exists());

        let reloaded = ScopelineConfig::load_or_create(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopeline.toml");
        fs::write(
            &path,
            "[trigger]\nmode = \"triggered\"\nlevel = 64\n\n[view]\ndata_dir = \"/tmp/scopes\"\n",
        )
        .unwrap();

        let config = ScopelineConfig::load_or_create(&path).unwrap();
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.trigger.mode, TriggerMode::Triggered);
        assert_eq!(config.trigger.level, 64);
        assert_eq!(config.trigger.over_count, 1);
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/scopes"));

        let options = config.scope_options().unwrap();
        assert_eq!(options.capture.sample_rate, 44_100);
        assert_eq!(options.trigger.level, 64);
        assert_eq!(options.queue_capacity, 64);
    }

    #[test]
    fn test_unsupported_trigger_level_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopeline.toml");
        fs::write(&path, "[trigger]\nlevel = 17\n").unwrap();

        let err = ScopelineConfig::load_or_create(&path).unwrap_err();
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = ScopelineConfig::default();
        config.audio.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scopeline.toml");
        fs::write(&path, "[audio\nsample_rate = ").unwrap();
        assert!(ScopelineConfig::load_or_create(&path).is_err());
    }
}
