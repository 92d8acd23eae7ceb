//! Client configuration
//!
//! Handles:
//! - Node address (the page URL the dashboard was served from)
//! - Reconnect backoff tuning
//! - Fleet poll interval
//! - Update-check preferences
//!
//! Stored as TOML in the platform config directory, or wherever
//! `FLEETLINK_CONFIG` points.

use crate::backoff::{BackoffPolicy, DEFAULT_BASE_MS, DEFAULT_CAP_MS, DEFAULT_FLOOR_MS};
use crate::error::{LinkError, Result};
use crate::updater::DEFAULT_CACHE_TTL_HOURS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "FLEETLINK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    pub node: NodeConfig,
    pub link: LinkConfig,
    pub fleet: FleetConfig,
    pub update: UpdateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Dashboard URL, e.g. `http://192.168.4.1/` or a proxy URL with `?ws_port=`.
    pub page_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub base_delay_ms: u64,
    pub cap_delay_ms: u64,
    pub floor_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub enabled: bool,
    pub github_repo: String,
    pub cache_ttl_hours: u32,
    pub check_interval_hours: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            page_url: "http://192.168.4.1/".to_string(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_MS,
            cap_delay_ms: DEFAULT_CAP_MS,
            floor_delay_ms: DEFAULT_FLOOR_MS,
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            github_repo: "Ryan4n6/MASS-Trap".to_string(),
            cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS as u32,
            check_interval_hours: 24,
        }
    }
}

impl LinkConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::from_millis(self.base_delay_ms, self.cap_delay_ms, self.floor_delay_ms)
    }
}

impl FleetConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl UpdateConfig {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.cache_ttl_hours))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_interval_hours.max(1)) * 3600)
    }
}

impl ClientConfig {
    /// Load from `FLEETLINK_CONFIG` or the platform location. A missing file
    /// yields the defaults.
    pub async fn load() -> Result<Self> {
        let path = match std::env::var(CONFIG_ENV) {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => Self::config_file_path()?,
        };
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        toml::from_str(content).map_err(|e| LinkError::Config(e.to_string()))
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| LinkError::Config(e.to_string()))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?).await
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| LinkError::Config("could not find config directory".into()))?;
        path.push("fleetlink");
        path.push("config.toml");
        Ok(path)
    }
}
