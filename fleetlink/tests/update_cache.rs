//! Update checker caching and fail-soft behavior.

use chrono::{Duration, TimeZone, Utc};
use fleetlink::updater::{
    CachedVersionCheck, FileCacheStore, MemoryCacheStore, ReleaseInfo, UpdateChecker, UpdateStatus,
};
use fleetlink_devkit::MockReleaseSource;

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
}

#[tokio::test]
async fn test_second_check_within_ttl_uses_cache() {
    let source = MockReleaseSource::with_tag("v2.7.0");
    let mut checker = UpdateChecker::new(source.clone(), MemoryCacheStore::new());

    let first = checker.check_at("v2.6.1", false, t0()).await;
    let second = checker.check_at("v2.6.1", false, t0() + Duration::hours(23)).await;

    assert_eq!(source.fetches(), 1);
    assert_eq!(first, second);
    assert_eq!(
        first,
        UpdateStatus::Available {
            current: "2.6.1".to_string(),
            latest: "2.7.0".to_string(),
            critical: false,
        }
    );
}

#[tokio::test]
async fn test_expired_cache_refetches() {
    let source = MockReleaseSource::with_tag("v2.6.1");
    let mut checker = UpdateChecker::new(source.clone(), MemoryCacheStore::new());

    checker.check_at("2.6.1", false, t0()).await;
    source.set_latest(Some(ReleaseInfo::from_tag("v2.6.2")));
    let status = checker.check_at("2.6.1", false, t0() + Duration::hours(24)).await;

    assert_eq!(source.fetches(), 2);
    assert!(status.is_update_available());
    assert_eq!(checker.cached().map(|c| c.fetched_at), Some(t0() + Duration::hours(24)));
}

#[tokio::test]
async fn test_forced_refresh_always_fetches() {
    let source = MockReleaseSource::with_tag("v2.6.1");
    let mut checker = UpdateChecker::new(source.clone(), MemoryCacheStore::new());

    checker.check_at("2.6.1", true, t0()).await;
    checker.check_at("2.6.1", true, t0() + Duration::minutes(1)).await;
    assert_eq!(source.fetches(), 2);
}

#[tokio::test]
async fn test_failure_falls_back_to_cache() {
    let cached = CachedVersionCheck {
        data: ReleaseInfo::from_tag("v3.0.0"),
        fetched_at: t0() - Duration::hours(48),
    };
    let source = MockReleaseSource::offline();
    let mut checker = UpdateChecker::new(source.clone(), MemoryCacheStore::with_entry(cached));

    let status = checker.check_at("2.6.1", false, t0()).await;
    assert_eq!(source.fetches(), 1);
    assert_eq!(
        status,
        UpdateStatus::Available {
            current: "2.6.1".to_string(),
            latest: "3.0.0".to_string(),
            critical: false,
        }
    );
}

#[tokio::test]
async fn test_failure_without_cache_is_unknown() {
    let source = MockReleaseSource::offline();
    let mut checker = UpdateChecker::new(source.clone(), MemoryCacheStore::new());

    assert!(checker.get_remote_version_at(false, t0()).await.is_none());
    assert_eq!(
        checker.check_at("v2.6.1", false, t0()).await,
        UpdateStatus::Unknown {
            current: "2.6.1".to_string()
        }
    );
    assert!(checker.cached().is_none());
}

#[tokio::test]
async fn test_untagged_release_is_unknown() {
    let source = MockReleaseSource::new(Some(ReleaseInfo {
        name: Some("nightly".to_string()),
        ..ReleaseInfo::default()
    }));
    let mut checker = UpdateChecker::new(source, MemoryCacheStore::new());

    assert!(matches!(
        checker.check_at("2.6.1", false, t0()).await,
        UpdateStatus::Unknown { .. }
    ));
}

#[tokio::test]
async fn test_critical_release_flagged() {
    let source = MockReleaseSource::new(Some(ReleaseInfo {
        tag_name: Some("v2.6.2".to_string()),
        body: Some("[CRITICAL] fixes finish-gate lockup".to_string()),
        ..ReleaseInfo::default()
    }));
    let mut checker = UpdateChecker::new(source, MemoryCacheStore::new());

    match checker.check_at("2.6.1", false, t0()).await {
        UpdateStatus::Available { critical, .. } => assert!(critical),
        other => panic!("expected update, got {:?}", other),
    }
}

#[tokio::test]
async fn test_file_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleetlink").join("update_cache.json");

    let source = MockReleaseSource::with_tag("v2.6.1");
    let mut checker = UpdateChecker::new(source.clone(), FileCacheStore::new(path.clone()));
    assert_eq!(
        checker.check_at("2.6.1", false, t0()).await,
        UpdateStatus::UpToDate {
            current: "2.6.1".to_string()
        }
    );
    assert!(path.exists());

    // A fresh checker picks the entry up from disk.
    let mut restarted = UpdateChecker::new(source.clone(), FileCacheStore::new(path.clone()));
    restarted.check_at("2.6.1", false, t0() + Duration::hours(2)).await;
    assert_eq!(source.fetches(), 1);

    std::fs::write(&path, "{ truncated").unwrap();
    let mut corrupt = UpdateChecker::new(source.clone(), FileCacheStore::new(path));
    assert!(corrupt.cached().is_none());
    corrupt.check_at("2.6.1", false, t0() + Duration::hours(3)).await;
    assert_eq!(source.fetches(), 2);
}
