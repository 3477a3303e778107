//! Player configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use class_audio::{MixerConfig, PlaybackConfig};
use serde::Deserialize;

/// Settings loaded from TOML; every table is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Output device substring.
    pub device: Option<String>,
    pub mixer: MixerConfig,
    pub playback: PlaybackConfig,
}

impl PlayerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<PlayerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Apply the `--device` flag over the file value.
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.device = normalize_device_name(device).or_else(|| normalize_device_name(self.device));
        self
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
