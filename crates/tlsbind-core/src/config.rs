//! Configuration for tlsbind.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TLSBIND_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/tlsbind/config.toml
//!   3. ~/.config/tlsbind/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsbindConfig {
    pub tls: TlsConfig,
    pub network: NetworkConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM bundle of trusted roots. Unset = built-in web PKI roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    /// Lowest protocol version offered: "1.2" or "1.3".
    pub min_version: String,
    /// Restrict the default cipher suites to these names. Empty = all.
    pub cipher_suites: Vec<String>,
    /// ALPN protocol names, in preference order.
    pub alpn: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP connect timeout. 0 = OS default.
    pub connect_timeout_ms: u64,
    /// Socket read timeout. 0 = block forever.
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Log detail reports at INFO instead of DEBUG.
    pub detail: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_file: None,
            min_version: "1.2".to_string(),
            cipher_suites: Vec::new(),
            alpn: Vec::new(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: 0,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { detail: true }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.read_timeout_ms)
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("tlsbind")
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
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl TlsbindConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            TlsbindConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TLSBIND_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = TlsbindConfig::default().to_toml()?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)
    }

    /// Apply TLSBIND_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("TLSBIND_TLS__CA_FILE") {
            self.tls.ca_file = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = var("TLSBIND_TLS__MIN_VERSION") {
            self.tls.min_version = v;
        }
        if let Some(v) = var("TLSBIND_NETWORK__CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.network.connect_timeout_ms = ms;
            }
        }
        if let Some(v) = var("TLSBIND_NETWORK__READ_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.network.read_timeout_ms = ms;
            }
        }
        if let Some(v) = var("TLSBIND_REPORT__DETAIL") {
            self.report.detail = v == "true" || v == "1";
        }
    }
}
