use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub tools: ToolsConfig,
    pub timeline: TimelineConfig,
    pub transcript: TranscriptConfig,
}

/// Where and how new recordings are stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub dir: PathBuf,
    pub format: String,
}

/// External programs driven by the transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub recorder: String,
    pub player: String,
    pub player_args: Vec<String>,
    pub prober: String,
    pub encoder: String,
    /// Probe `.wav` assets natively instead of running the prober
    pub native_wav_probe: bool,
    pub player_reply_timeout_ms: u64,
    pub finalize_poll_ms: u64,
    /// Give up waiting for a finished recording after this many polls
    pub finalize_poll_limit: Option<u32>,
}

/// Timeline geometry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimelineConfig {
    pub latch_tolerance_ms: u64,
}

/// Session transcript (command log) settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Append to this file instead of writing to stdout
    pub path: Option<PathBuf>,
    pub timestamps: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::AUDIO_DIR),
            format: defaults::FILE_FORMAT.to_string(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            recorder: defaults::RECORDER_PROGRAM.to_string(),
            player: defaults::PLAYER_PROGRAM.to_string(),
            player_args: defaults::PLAYER_ARGS.iter().map(|s| s.to_string()).collect(),
            prober: defaults::PROBER_PROGRAM.to_string(),
            encoder: defaults::ENCODER_PROGRAM.to_string(),
            native_wav_probe: true,
            player_reply_timeout_ms: defaults::PLAYER_REPLY_TIMEOUT_MS,
            finalize_poll_ms: defaults::FINALIZE_POLL_MS,
            finalize_poll_limit: None,
        }
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            latch_tolerance_ms: defaults::LATCH_TOLERANCE_MS,
        }
    }
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            path: None,
            timestamps: true,
        }
    }
}

impl ToolsConfig {
    pub fn player_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.player_reply_timeout_ms)
    }

    pub fn finalize_poll_interval(&self) -> Duration {
        Duration::from_millis(self.finalize_poll_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file falls back to defaults; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Reject values the transport cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.audio.format.is_empty() {
            return Err(crate::error::DictapiError::ConfigInvalidValue {
                key: "audio.format".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.tools.finalize_poll_ms == 0 {
            return Err(crate::error::DictapiError::ConfigInvalidValue {
                key: "tools.finalize_poll_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - DICTAPI_AUDIO_DIR → audio.dir
    /// - DICTAPI_TRANSCRIPT → transcript.path
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("DICTAPI_AUDIO_DIR")
            && !dir.is_empty()
        {
            self.audio.dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("DICTAPI_TRANSCRIPT")
            && !path.is_empty()
        {
            self.transcript.path = Some(PathBuf::from(path));
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/dictapi/config.toml on Linux, or a path relative to
    /// the working directory when no config directory can be determined.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dictapi")
            .join("config.toml")
    }
}
