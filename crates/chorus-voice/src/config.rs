//! Chorus configuration loaded from file and environment.
//!
//! Precedence: env `CHORUS_*` (nested with `__`, e.g. `CHORUS_SYNTHESIS__BASE_URL`)
//! > `CHORUS_CONFIG` file (default `config/chorus.toml`) > built-in defaults.

use crate::error::VoiceResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/chorus";

/// Top-level configuration for the playback core and its producers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChorusConfig {
    pub assets: AssetConfig,
    pub playback: PlaybackConfig,
    pub synthesis: SynthesisConfig,
    pub cloning: CloningConfig,
    pub renderer: RendererConfig,
}

impl ChorusConfig {
    /// Load config from `CHORUS_CONFIG` (or `config/chorus.toml`) and the environment.
    pub fn load() -> VoiceResult<Self> {
        let path = std::env::var("CHORUS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load config from a specific file (extension optional). Missing file => defaults + env.
    pub fn load_from(path: &Path) -> VoiceResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("CHORUS")
                    .prefix_separator("_")
                    .separator("__"),
            );
        let built = builder.build()?;
        Ok(built.try_deserialize()?)
    }
}

/// Staging area for generated and downloaded audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Directory where temporary assets are written.
    pub staging_dir: PathBuf,
    /// Pre-roll tone played before speech when requested. Never deleted.
    pub tone_path: PathBuf,
    /// Whole-request limit for downloading a remote audio file.
    pub download_timeout_secs: u64,
    /// Downloads larger than this are refused.
    pub max_download_bytes: u64,
}

impl AssetConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("./data/assets"),
            tone_path: PathBuf::from("tritone.mp3"),
            download_timeout_secs: 60,
            max_download_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Tempo multiplier applied to rendered speech (the tone always plays at 1.0).
    pub speech_tempo: f32,
    /// Upper bound for a single status update to the originator.
    pub status_timeout_ms: u64,
}

impl PlaybackConfig {
    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speech_tempo: 1.2,
            status_timeout_ms: 5_000,
        }
    }
}

/// Stateful synthesis server (one model loaded at a time).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub base_url: String,
    pub probe_path: String,
    pub model_path: String,
    pub inference_path: String,
    pub probe_timeout_ms: u64,
    pub request_timeout_secs: u64,
    pub audio_extension: String,
}

impl SynthesisConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9880".to_string(),
            probe_path: "/".to_string(),
            model_path: "/set_model".to_string(),
            inference_path: "/tts".to_string(),
            probe_timeout_ms: 2_000,
            request_timeout_secs: 120,
            audio_extension: "wav".to_string(),
        }
    }
}

/// Job-based remote voice cloning API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloningConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub audio_extension: String,
}

impl CloningConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CloningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example-voices.dev/v1".to_string(),
            api_key: None,
            max_attempts: 10,
            poll_interval_ms: 2_000,
            request_timeout_secs: 30,
            audio_extension: "mp3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub default_lang: String,
    pub default_accent: String,
    pub request_timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            default_lang: "en".to_string(),
            default_accent: "com".to_string(),
            request_timeout_secs: 30,
        }
    }
}
