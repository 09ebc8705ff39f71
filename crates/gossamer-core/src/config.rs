//! Configuration system for Gossamer.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $GOSSAMER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/gossamer/config.toml
//!   3. ~/.config/gossamer/config.toml

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactCodec, Compression};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GossamerConfig {
    pub network: NetworkConfig,
    pub broadcast: BroadcastConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the daemon accepts inbound peer streams on.
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Compression applied to queued payloads before they are chunked.
    pub compression: Compression,
    /// Bytes per data chunk. Must be > 0.
    pub artifact_chunk_size: u32,
    /// Bound on each per-peer chunk write, in milliseconds. Must be > 0.
    pub timeout_ms: u64,
    /// Capacity of the outbound payload queue. Must be > 0.
    pub send_queue_size: usize,
    /// Largest payload accepted for broadcast.
    pub max_artifact_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Checksums tracked in the witness cache.
    pub witness_cache_size: usize,
    /// Checksums tracked in the recently-broadcast cache.
    pub artifact_cache_size: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "[::1]:7100".to_string(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            artifact_chunk_size: 64 * 1024,
            timeout_ms: 5_000,
            send_queue_size: 1024,
            max_artifact_size: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            witness_cache_size: 8192,
            artifact_cache_size: 8192,
        }
    }
}

// ── Derived settings ─────────────────────────────────────────────────────────

impl BroadcastConfig {
    pub fn chunk_size(&self) -> Option<NonZeroU32> {
        NonZeroU32::new(self.artifact_chunk_size)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn codec(&self) -> ArtifactCodec {
        ArtifactCodec::new(self.compression, self.max_artifact_size)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("gossamer")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid value for {0}: must be greater than zero")]
    Invalid(&'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GossamerConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            GossamerConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("GOSSAMER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write the default config if no file exists yet. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&GossamerConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject values the broadcast path cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast.artifact_chunk_size == 0 {
            return Err(ConfigError::Invalid("broadcast.artifact_chunk_size"));
        }
        if self.broadcast.timeout_ms == 0 {
            return Err(ConfigError::Invalid("broadcast.timeout_ms"));
        }
        if self.broadcast.send_queue_size == 0 {
            return Err(ConfigError::Invalid("broadcast.send_queue_size"));
        }
        if self.cache.witness_cache_size == 0 {
            return Err(ConfigError::Invalid("cache.witness_cache_size"));
        }
        if self.cache.artifact_cache_size == 0 {
            return Err(ConfigError::Invalid("cache.artifact_cache_size"));
        }
        Ok(())
    }

    /// Apply GOSSAMER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("GOSSAMER_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Some(v) = var("GOSSAMER_BROADCAST__COMPRESSION") {
            match v.parse() {
                Ok(c) => self.broadcast.compression = c,
                Err(e) => tracing::warn!(error = %e, "ignoring GOSSAMER_BROADCAST__COMPRESSION"),
            }
        }
        if let Some(p) = var("GOSSAMER_BROADCAST__ARTIFACT_CHUNK_SIZE").and_then(|v| v.parse().ok()) {
            self.broadcast.artifact_chunk_size = p;
        }
        if let Some(p) = var("GOSSAMER_BROADCAST__TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.broadcast.timeout_ms = p;
        }
        if let Some(p) = var("GOSSAMER_BROADCAST__SEND_QUEUE_SIZE").and_then(|v| v.parse().ok()) {
            self.broadcast.send_queue_size = p;
        }
        if let Some(p) = var("GOSSAMER_BROADCAST__MAX_ARTIFACT_SIZE").and_then(|v| v.parse().ok()) {
            self.broadcast.max_artifact_size = p;
        }
        if let Some(p) = var("GOSSAMER_CACHE__WITNESS_CACHE_SIZE").and_then(|v| v.parse().ok()) {
            self.cache.witness_cache_size = p;
        }
        if let Some(p) = var("GOSSAMER_CACHE__ARTIFACT_CACHE_SIZE").and_then(|v| v.parse().ok()) {
            self.cache.artifact_cache_size = p;
        }
    }
}
