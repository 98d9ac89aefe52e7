use std::collections::BTreeMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::profile::{ProfileOverrides, DEFAULT_PROFILE};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotegraphConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub linking: LinkingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket_path: "~/.notegraph/notegraph.sock".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: String::new(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `http`, `http-fallback` or `none`.
    pub backend: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub backfill_interval_secs: u64,
    pub backfill_batch_size: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: "none".to_string(),
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            api_key_env: None,
            max_retries: 3,
            retry_delay_ms: 500,
            backfill_interval_secs: 300,
            backfill_batch_size: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkingConfig {
    pub default_profile: String,
    /// Rayon pool size for pair evaluation; 0 means one per CPU.
    pub worker_threads: usize,
    pub feature_cache_capacity: u64,
    pub auto_link_on_create: bool,
    pub write_retries: usize,
    pub write_retry_delay_ms: u64,
    /// Custom named profiles, each layered over `default`.
    pub profiles: BTreeMap<String, ProfileOverrides>,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            default_profile: DEFAULT_PROFILE.to_string(),
            worker_threads: 0,
            feature_cache_capacity: 10_000,
            auto_link_on_create: true,
            write_retries: 3,
            write_retry_delay_ms: 50,
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8780,
        }
    }
}

impl NotegraphConfig {
    /// Load a TOML file, then apply `NOTEGRAPH__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("NOTEGRAPH").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}
