use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

// =============================================================================
// Time-related constants
// =============================================================================

/// Default lifetime of cached tags, job markers and evaluations (2 hours)
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 2;

/// Default interval between cache garbage collection sweeps (5 minutes)
pub const DEFAULT_GC_INTERVAL_MINUTES: u64 = 5;

/// Delay between two polls of a remote job status (1 second)
pub const POLL_INTERVAL_MS: u64 = 1_000;

/// Timeout for a single registry request (30 seconds)
pub const REGISTRY_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// Server defaults
// =============================================================================

pub const DEFAULT_PORT: u16 = 5000;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Number of background workers resolving jobs
pub const DEFAULT_WORKERS: usize = 4;

/// Application configuration, loaded from an optional JSON file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub registries: HashMap<String, RegistryConfig>,
    pub cache_ttl_hours: u64,
    pub workers: usize,
    pub gc_interval_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registries: HashMap::new(),
            cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            workers: DEFAULT_WORKERS,
            gc_interval_minutes: DEFAULT_GC_INTERVAL_MINUTES,
        }
    }
}

/// Per-registry connection settings
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub auth_domain: String,
    pub insecure: bool,
    pub non_ssl: bool,
    pub skip_ping: bool,
    pub username: String,
    pub password: String,
}

impl RegistryConfig {
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

impl Config {
    /// Load configuration from a JSON file, filling in defaults
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = serde_json::from_str(content)?;
        config.fix_defaults();
        Ok(config)
    }

    /// Configuration for `domain`, or a default entry authenticating against the domain itself
    pub fn registry_config(&self, domain: &str) -> RegistryConfig {
        self.registries
            .get(domain)
            .cloned()
            .unwrap_or_else(|| RegistryConfig {
                auth_domain: domain.to_string(),
                ..Default::default()
            })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(60 * 60))
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_minutes.saturating_mul(60))
    }

    fn fix_defaults(&mut self) {
        if self.cache_ttl_hours == 0 {
            self.cache_ttl_hours = DEFAULT_CACHE_TTL_HOURS;
        }
        if self.workers == 0 {
            self.workers = DEFAULT_WORKERS;
        }
        if self.gc_interval_minutes == 0 {
            self.gc_interval_minutes = DEFAULT_GC_INTERVAL_MINUTES;
        }
        for (domain, registry) in self.registries.iter_mut() {
            if registry.auth_domain.is_empty() {
                registry.auth_domain = domain.clone();
            }
        }
    }
}

/// Returns the path to the data directory for fresh-container.
/// Uses $XDG_DATA_HOME/fresh-container if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/fresh-container,
/// or ./fresh-container if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the cache database file.
pub fn db_path() -> PathBuf {
    data_dir().join("cache.db")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("fresh-container")
}
