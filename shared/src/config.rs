use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{MIN_UTTERANCE_SAMPLES, TARGET_SAMPLE_RATE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recognizer: RecognizerConfig,
    pub audio: AudioConfig,
    pub bridge: BridgeConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub model_path: PathBuf,
    /// Fetched into `model_path` when the file is missing.
    pub model_url: Option<String>,
    pub language: Option<String>,
    pub device: DevicePreference,
    pub threads: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Gpu,
    Cpu,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub block_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub socket_path: PathBuf,
    pub connect_timeout_ms: u64,
    /// Rate of the PCM frames the bridge pushes.
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub min_utterance_samples: usize,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model_path: default_data_dir().join("models").join("ggml-base.en.bin"),
            model_url: Some(
                "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.en.bin"
                    .to_string(),
            ),
            language: Some("en".to_string()),
            device: DevicePreference::Auto,
            threads: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None, // Use default device
            block_size: 4096,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/dictation-bridge.sock"),
            connect_timeout_ms: 2000,
            sample_rate: TARGET_SAMPLE_RATE,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_utterance_samples: MIN_UTTERANCE_SAMPLES,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("dictation"))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dictation").join("config.yaml"))
    }

    /// Loads from `path`, or the XDG location when `None`. A missing file
    /// yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path)
            .context("Could not determine config directory")?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {:?}", dir))?;
        }

        let yaml = serde_yaml::to_string(self)?;
        fs::write(&path, yaml).with_context(|| format!("Failed to write config {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load(Some(&tmp.path().join("absent.yaml"))).unwrap();
        assert_eq!(config.session.min_utterance_samples, 1600);
        assert_eq!(config.bridge.sample_rate, 16_000);
        assert_eq!(config.audio.block_size, 4096);
    }

    #[test]
    fn partial_file_fills_remaining_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "recognizer:\n  device: cpu\naudio:\n  block_size: 2048\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.recognizer.device, DevicePreference::Cpu);
        assert_eq!(config.audio.block_size, 2048);
        assert!(config.audio.device.is_none());
        assert_eq!(config.recognizer.language.as_deref(), Some("en"));
    }

    #[test]
    fn save_then_load_keeps_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.audio.device = Some("USB Mic".to_string());
        config.bridge.connect_timeout_ms = 500;
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.audio.device.as_deref(), Some("USB Mic"));
        assert_eq!(loaded.bridge.connect_timeout_ms, 500);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "audio: [not, a, map]").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
