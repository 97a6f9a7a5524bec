// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving link settings.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::constants::{self, config as defaults};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bluetooth adapter settings.
    #[serde(default)]
    pub bluetooth: BluetoothConfig,

    /// SPP link tuning.
    #[serde(default)]
    pub link: LinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Adapter name (e.g. "hci0"). The default adapter is used when unset.
    pub adapter: Option<String>,

    /// How long the CLI scan command runs.
    pub scan_duration_secs: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            scan_duration_secs: 10,
        }
    }
}

/// One direct RFCOMM channel attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAttempt {
    pub channel: u8,
    pub timeout_ms: u64,
}

impl ChannelAttempt {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Maximum wait for bonding to finish.
    pub bond_timeout_secs: u64,

    /// Direct channel attempts, tried in order before service discovery.
    pub channel_attempts: Vec<ChannelAttempt>,

    /// Number of SDP UUID polls.
    pub sdp_attempts: u32,

    /// Spacing between SDP UUID polls.
    pub sdp_retry_interval_ms: u64,

    /// Per-socket timeout for UUID based connects.
    pub sdp_connect_timeout_ms: u64,

    /// UUIDs whose canonical form starts with this prefix are treated as SPP.
    pub spp_uuid_prefix: String,

    /// Outbound chunk size in bytes.
    pub chunk_size: usize,

    /// Inbound read buffer size in bytes.
    pub read_buffer_size: usize,

    /// Optional deadline for a whole connect (bonding plus all strategies).
    pub connect_timeout_secs: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bond_timeout_secs: defaults::BOND_TIMEOUT_SECS,
            channel_attempts: constants::DEFAULT_CHANNEL_ATTEMPTS
                .iter()
                .map(|&(channel, timeout_ms)| ChannelAttempt {
                    channel,
                    timeout_ms,
                })
                .collect(),
            sdp_attempts: defaults::SDP_ATTEMPTS,
            sdp_retry_interval_ms: defaults::SDP_RETRY_INTERVAL_MS,
            sdp_connect_timeout_ms: defaults::SDP_CONNECT_TIMEOUT_MS,
            spp_uuid_prefix: constants::SPP_UUID_PREFIX.to_string(),
            chunk_size: defaults::CHUNK_SIZE,
            read_buffer_size: defaults::READ_BUFFER_SIZE,
            connect_timeout_secs: None,
        }
    }
}

impl LinkConfig {
    pub fn bond_timeout(&self) -> Duration {
        Duration::from_secs(self.bond_timeout_secs)
    }

    pub fn sdp_retry_interval(&self) -> Duration {
        Duration::from_millis(self.sdp_retry_interval_ms)
    }

    pub fn sdp_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.sdp_connect_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Reject settings the link cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("link.chunk_size must be greater than zero");
        }
        if self.read_buffer_size == 0 {
            bail!("link.read_buffer_size must be greater than zero");
        }
        if self.sdp_attempts == 0 {
            bail!("link.sdp_attempts must be greater than zero");
        }
        Ok(())
    }
}

impl Config {
    /// Default configuration file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spp-link")
            .join("config.toml")
    }

    /// Load configuration from the default location, creating it if missing.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        config.link.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_link_settings() {
        let link = LinkConfig::default();
        assert_eq!(link.bond_timeout(), Duration::from_secs(15));
        assert_eq!(
            link.channel_attempts,
            vec![
                ChannelAttempt {
                    channel: 5,
                    timeout_ms: 3000
                },
                ChannelAttempt {
                    channel: 1,
                    timeout_ms: 2000
                },
            ]
        );
        assert_eq!(link.sdp_attempts, 20);
        assert_eq!(link.chunk_size, 512);
        assert_eq!(link.read_buffer_size, 1024);
        assert!(link.connect_timeout().is_none());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.link, LinkConfig::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[link]\nchunk_size = 128\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.link.chunk_size, 128);
        assert_eq!(config.link.sdp_attempts, 20);
        assert_eq!(config.bluetooth.scan_duration_secs, 10);
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.bluetooth.adapter = Some("hci1".into());
        config.link.connect_timeout_secs = Some(60);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.bluetooth.adapter.as_deref(), Some("hci1"));
        assert_eq!(loaded.link.connect_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[link]\nchunk_size = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }
}
