//! Firmware update check against GitHub releases
//!
//! Features:
//! - Semver-ish comparison tolerant of `v` prefixes and pre-release suffixes
//! - Latest-release lookup on the GitHub API
//! - 24h process-wide cache, persisted between runs
//! - Fail-soft: network errors fall back to the cache, then to "unknown"

use crate::error::{LinkError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::future::Future;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;
const USER_AGENT: &str = "fleetlink";

/// Compare two version strings component-wise (major, minor, patch).
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    parse_components(a).cmp(&parse_components(b))
}

fn strip_prefix(version: &str) -> &str {
    let trimmed = version.trim();
    match trimmed.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => &trimmed[c.len_utf8()..],
        _ => trimmed,
    }
}

fn parse_components(version: &str) -> [u64; 3] {
    let core = strip_prefix(version)
        .split(['-', '+'])
        .next()
        .unwrap_or_default();

    let mut parts = [0u64; 3];
    for (slot, raw) in parts.iter_mut().zip(core.split('.')) {
        *slot = raw.trim().parse().unwrap_or(0);
    }
    parts
}

/// Latest-release descriptor as returned by the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl ReleaseInfo {
    pub fn from_tag(tag: &str) -> Self {
        Self {
            tag_name: Some(tag.to_string()),
            ..Self::default()
        }
    }

    /// Released version without its prefix; `None` when the tag is missing
    /// or has no leading number.
    pub fn version(&self) -> Option<String> {
        let tag = self.tag_name.as_deref()?;
        let version = strip_prefix(tag);
        version
            .chars()
            .next()
            .filter(|c| c.is_ascii_digit())
            .map(|_| version.to_string())
    }

    pub fn is_critical(&self) -> bool {
        self.body
            .as_deref()
            .map(|b| b.contains("[CRITICAL]") || b.contains("security"))
            .unwrap_or(false)
    }
}

/// The node's `/api/version` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVersion {
    #[serde(default = "unknown_firmware")]
    pub firmware: String,
    #[serde(default)]
    pub web_ui: Option<String>,
    #[serde(default)]
    pub build_date: Option<String>,
    #[serde(default)]
    pub board: Option<String>,
}

fn unknown_firmware() -> String {
    "0.0.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedVersionCheck {
    pub data: ReleaseInfo,
    pub fetched_at: DateTime<Utc>,
}

impl CachedVersionCheck {
    pub fn age(&self, now: DateTime<Utc>) -> ChronoDuration {
        now - self.fetched_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    UpToDate { current: String },
    Available { current: String, latest: String, critical: bool },
    /// Remote version could not be determined; show no update UI.
    Unknown { current: String },
}

impl UpdateStatus {
    pub fn is_update_available(&self) -> bool {
        matches!(self, UpdateStatus::Available { .. })
    }
}

pub trait ReleaseSource: Send + Sync {
    fn fetch_latest(&self) -> impl Future<Output = Result<ReleaseInfo>> + Send;
}

#[derive(Debug, Clone)]
pub struct GitHubReleaseSource {
    client: reqwest::Client,
    url: String,
}

impl GitHubReleaseSource {
    /// `repo` is `owner/name`.
    pub fn new(repo: &str) -> Result<Self> {
        let repo_parts: Vec<&str> = repo.split('/').collect();
        if repo_parts.len() != 2 || repo_parts.iter().any(|p| p.is_empty()) {
            return Err(LinkError::Config(format!("invalid GitHub repo '{repo}'")));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            url: format!(
                "https://api.github.com/repos/{}/{}/releases/latest",
                repo_parts[0], repo_parts[1]
            ),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReleaseSource for GitHubReleaseSource {
    async fn fetch_latest(&self) -> Result<ReleaseInfo> {
        let response = self
            .client
            .get(&self.url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LinkError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}

/// Persistence for the single cached version check.
pub trait CacheStore: Send {
    fn load(&self) -> Option<CachedVersionCheck>;
    fn save(&mut self, entry: &CachedVersionCheck) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryCacheStore {
    entry: Option<CachedVersionCheck>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(entry: CachedVersionCheck) -> Self {
        Self { entry: Some(entry) }
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self) -> Option<CachedVersionCheck> {
        self.entry.clone()
    }

    fn save(&mut self, entry: &CachedVersionCheck) -> Result<()> {
        self.entry = Some(entry.clone());
        Ok(())
    }
}

/// JSON file in the platform cache directory.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    path: PathBuf,
}

impl FileCacheStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::cache_dir()
            .ok_or_else(|| LinkError::Config("could not find cache directory".into()))?;
        path.push("fleetlink");
        path.push("update_cache.json");
        Ok(path)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl CacheStore for FileCacheStore {
    fn load(&self) -> Option<CachedVersionCheck> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("ignoring unreadable update cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&mut self, entry: &CachedVersionCheck) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string(entry)?)?;
        Ok(())
    }
}

pub struct UpdateChecker<S: ReleaseSource, C: CacheStore> {
    source: S,
    store: C,
    cache: Option<CachedVersionCheck>,
    ttl: ChronoDuration,
}

impl<S: ReleaseSource, C: CacheStore> UpdateChecker<S, C> {
    pub fn new(source: S, store: C) -> Self {
        let cache = store.load();
        Self {
            source,
            store,
            cache,
            ttl: ChronoDuration::hours(DEFAULT_CACHE_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: ChronoDuration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cached(&self) -> Option<&CachedVersionCheck> {
        self.cache.as_ref()
    }

    pub async fn get_remote_version(&mut self, force_refresh: bool) -> Option<ReleaseInfo> {
        self.get_remote_version_at(force_refresh, Utc::now()).await
    }

    /// Cache-aware lookup evaluated at `now`. Never fails: `None` means the
    /// remote version is unknown.
    pub async fn get_remote_version_at(
        &mut self,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Option<ReleaseInfo> {
        if !force_refresh {
            if let Some(cached) = &self.cache {
                if cached.age(now) < self.ttl {
                    debug!("using cached release info from {}", cached.fetched_at);
                    return Some(cached.data.clone());
                }
            }
        }

        match self.source.fetch_latest().await {
            Ok(data) => {
                let entry = CachedVersionCheck {
                    data: data.clone(),
                    fetched_at: now,
                };
                if let Err(e) = self.store.save(&entry) {
                    warn!("could not persist update cache: {}", e);
                }
                self.cache = Some(entry);
                Some(data)
            }
            Err(e) => {
                warn!("release check failed: {}", e);
                self.cache.as_ref().map(|c| c.data.clone())
            }
        }
    }

    pub async fn check(&mut self, local_version: &str, force_refresh: bool) -> UpdateStatus {
        self.check_at(local_version, force_refresh, Utc::now()).await
    }

    pub async fn check_at(
        &mut self,
        local_version: &str,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> UpdateStatus {
        let current = strip_prefix(local_version).to_string();
        let release = self.get_remote_version_at(force_refresh, now).await;

        let Some(release) = release else {
            return UpdateStatus::Unknown { current };
        };
        let Some(latest) = release.version() else {
            debug!("release carries no usable version tag");
            return UpdateStatus::Unknown { current };
        };

        if compare_versions(&latest, &current) == Ordering::Greater {
            info!("update available: {} -> {}", current, latest);
            UpdateStatus::Available {
                current,
                critical: release.is_critical(),
                latest,
            }
        } else {
            UpdateStatus::UpToDate { current }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_comparison() {
        assert_eq!(compare_versions("2.5.0", "2.6.0"), Ordering::Less);
        assert_eq!(compare_versions("v2.6.0-beta", "2.6.0"), Ordering::Equal);
        assert_eq!(compare_versions("2.10.0", "2.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("2.6", "2.6.0"), Ordering::Equal);
        assert_eq!(compare_versions("V3", "2.99.99"), Ordering::Greater);
        assert_eq!(compare_versions("2.6.1+build7", "2.6.0"), Ordering::Greater);
        assert_eq!(compare_versions("garbage", "0.0.0"), Ordering::Equal);
    }

    #[test]
    fn test_release_version_extraction() {
        assert_eq!(ReleaseInfo::from_tag("v2.7.0").version().as_deref(), Some("2.7.0"));
        assert_eq!(ReleaseInfo::from_tag("2.7.0-rc1").version().as_deref(), Some("2.7.0-rc1"));
        assert_eq!(ReleaseInfo::from_tag("nightly").version(), None);
        assert_eq!(ReleaseInfo::from_tag("").version(), None);
        assert_eq!(ReleaseInfo::default().version(), None);
    }

    #[test]
    fn test_local_version_defaults() {
        let v: LocalVersion = serde_json::from_str(r#"{"board":"ESP32-S3"}"#).unwrap();
        assert_eq!(v.firmware, "0.0.0");
        assert_eq!(v.board.as_deref(), Some("ESP32-S3"));
    }

    #[test]
    fn test_github_repo_validation() {
        assert!(GitHubReleaseSource::new("owner/repo").is_ok());
        assert!(GitHubReleaseSource::new("owner").is_err());
        assert!(GitHubReleaseSource::new("owner/").is_err());
        assert_eq!(
            GitHubReleaseSource::new("a/b").unwrap().url(),
            "https://api.github.com/repos/a/b/releases/latest"
        );
    }

    #[test]
    fn test_file_cache_store_roundtrip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let mut store = FileCacheStore::new(path.clone());
        assert!(store.load().is_none());

        let entry = CachedVersionCheck {
            data: ReleaseInfo::from_tag("v2.6.0"),
            fetched_at: Utc::now(),
        };
        store.save(&entry).unwrap();
        assert_eq!(store.load(), Some(entry));

        std::fs::write(&path, "{not json").unwrap();
        assert!(store.load().is_none());
    }
}
