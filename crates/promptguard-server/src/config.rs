//! Server configuration.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Master encryption key, 64 hex characters. The
    /// `PROMPTGUARD_MASTER_KEY` environment variable takes precedence.
    /// Startup fails when neither is set; there is no generated fallback.
    #[serde(default)]
    pub master_key: Option<String>,
    /// Base URL of the external provider gateway.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_idle_timeout_secs")]
    pub default_idle_timeout_secs: u64,
    /// Domains responses may link to without tripping exfiltration review.
    #[serde(default)]
    pub allowed_link_domains: Vec<String>,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    /// Capture the encrypted hidden prompt on ledger rows for training.
    #[serde(default = "default_true")]
    pub capture_prompt_for_training: bool,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> promptguard_core::CacheConfig {
        promptguard_core::CacheConfig {
            capacity: self.capacity,
            ttl: Duration::from_secs(self.ttl_secs),
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptguard")
        .join("promptguard.db")
}

fn default_gateway_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_export_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("promptguard")
        .join("exports")
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    1_000
}

fn default_cache_ttl_secs() -> u64 {
    3_600
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            master_key: None,
            gateway_url: default_gateway_url(),
            default_idle_timeout_secs: default_idle_timeout_secs(),
            allowed_link_domains: Vec::new(),
            export_dir: default_export_dir(),
            capture_prompt_for_training: default_true(),
            cache: CacheSettings::default(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from the default location (config/default.toml) or fall
    /// back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }

    /// Resolve the master key, environment first, config file second.
    ///
    /// A missing or malformed key is a startup error. Auto-generating a key
    /// here would leave previously encrypted prompts unreadable after a
    /// restart, so the server refuses to boot instead.
    pub fn resolve_master_key(&self) -> Result<String> {
        let key = match std::env::var("PROMPTGUARD_MASTER_KEY") {
            Ok(value) if !value.trim().is_empty() => value,
            _ => match &self.master_key {
                Some(value) if !value.trim().is_empty() => value.clone(),
                _ => bail!(
                    "no master key configured: set PROMPTGUARD_MASTER_KEY or master_key in the config file (64 hex characters)"
                ),
            },
        };
        let trimmed = key.trim();
        if trimmed.len() != 64 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("master key must be exactly 64 hex characters");
        }
        Ok(trimmed.to_string())
    }
}
