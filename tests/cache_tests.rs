/// Tests for the durable visa-data cache
/// Covers round-trip, TTL boundaries, the no-pollution invariant and
/// stale fallback reads
use chrono::{Duration, Utc};
use rust_visa_api::cache::VisaCache;
use rust_visa_api::models::{DataSource, Requirement, RequirementCategory, ScrapedVisaData};
use tempfile::TempDir;

fn live_record(country: &str, visa_type: &str) -> ScrapedVisaData {
    ScrapedVisaData {
        country: country.to_string(),
        visa_type: visa_type.to_string(),
        requirements: vec![Requirement {
            id: format!("{}_gen_001", country),
            title: "Valid Passport".to_string(),
            description: "A passport valid for the stay".to_string(),
            category: RequirementCategory::Documents,
            mandatory: true,
            applicable_to: vec![],
            notes: None,
        }],
        application_steps: vec!["Book an appointment".to_string()],
        processing_time: Some("10 days".to_string()),
        fees: None,
        source_url: "https://example.gov/visa".to_string(),
        scraped_at: Utc::now(),
        data_source: DataSource::ScrapedLive,
        scraping_warnings: vec![],
    }
}

#[tokio::test]
async fn test_cache_round_trip_rewrites_tag_to_cached() {
    let dir = TempDir::new().unwrap();
    let cache = VisaCache::new(dir.path(), 3600);

    let record = live_record("de", "tourist");
    cache.put(&record, None).await;

    let hit = cache.get_fresh("de", "tourist", None, false).await.unwrap();
    assert_eq!(hit.data_source, DataSource::Cached);

    // Everything except the provenance tag round-trips unchanged
    let mut expected = record;
    expected.data_source = DataSource::Cached;
    assert_eq!(hit, expected);
}

#[tokio::test]
async fn test_cache_survives_process_restart() {
    let dir = TempDir::new().unwrap();

    {
        let cache = VisaCache::new(dir.path(), 3600);
        cache.put(&live_record("fr", "student"), None).await;
    }

    // A fresh instance has an empty memory layer and must read from disk
    let cache = VisaCache::new(dir.path(), 3600);
    let hit = cache.get_fresh("fr", "student", None, false).await;
    assert!(hit.is_some());
    assert_eq!(hit.unwrap().data_source, DataSource::Cached);
}

#[tokio::test]
async fn test_ttl_boundary() {
    let dir = TempDir::new().unwrap();
    let ttl = 3600u64;
    let cache = VisaCache::new(dir.path(), ttl);

    let mut nearly_expired = live_record("de", "tourist");
    nearly_expired.scraped_at = Utc::now() - Duration::seconds(ttl as i64 - 1);
    assert!(cache.is_valid(&nearly_expired));

    let mut just_expired = live_record("de", "tourist");
    just_expired.scraped_at = Utc::now() - Duration::seconds(ttl as i64 + 1);
    assert!(!cache.is_valid(&just_expired));
}

#[tokio::test]
async fn test_expired_entry_is_a_fresh_miss_but_a_stale_hit() {
    let dir = TempDir::new().unwrap();
    let cache = VisaCache::new(dir.path(), 3600);

    let mut record = live_record("de", "tourist");
    record.scraped_at = Utc::now() - Duration::seconds(7200);
    cache.put(&record, None).await;

    // Expired: the fresh read path treats it as absent
    assert!(cache.get_fresh("de", "tourist", None, false).await.is_none());

    // The stale copy is still reachable for fallback
    let stale = cache.get_stale("de", "tourist", None).await.unwrap();
    assert_eq!(stale.data_source, DataSource::CachedStale);
    assert_eq!(stale.requirements.len(), 1);
}

#[tokio::test]
async fn test_force_refresh_bypasses_valid_entry() {
    let dir = TempDir::new().unwrap();
    let cache = VisaCache::new(dir.path(), 3600);

    cache.put(&live_record("de", "tourist"), None).await;

    assert!(cache.get_fresh("de", "tourist", None, true).await.is_none());
    assert!(cache.get_fresh("de", "tourist", None, false).await.is_some());
}

#[tokio::test]
async fn test_no_pollution_invariant() {
    let dir = TempDir::new().unwrap();
    let cache = VisaCache::new(dir.path(), 3600);

    for tag in [
        DataSource::Cached,
        DataSource::CachedStale,
        DataSource::ScrapingFailedNoUrl,
        DataSource::ScrapingFailedNoData,
        DataSource::ScrapingFailedError,
        DataSource::ScrapingFailedException,
    ] {
        let mut record = live_record("de", "tourist");
        record.data_source = tag;
        cache.put(&record, None).await;
    }

    assert!(cache.get("de_tourist").await.is_none());

    // All three live variants are accepted
    for tag in [
        DataSource::ScrapedLive,
        DataSource::ScrapedLiveMerged,
        DataSource::ScrapedLiveFallback,
    ] {
        let dir = TempDir::new().unwrap();
        let cache = VisaCache::new(dir.path(), 3600);
        let mut record = live_record("de", "tourist");
        record.data_source = tag;
        cache.put(&record, None).await;
        assert!(cache.get("de_tourist").await.is_some());
    }
}

#[tokio::test]
async fn test_nationality_extends_the_key() {
    let dir = TempDir::new().unwrap();
    let cache = VisaCache::new(dir.path(), 3600);

    cache.put(&live_record("de", "tourist"), Some("TR")).await;

    assert!(cache.get("de_tourist_tr").await.is_some());
    assert!(cache.get("de_tourist").await.is_none());
    assert!(cache
        .get_fresh("de", "tourist", Some("tr"), false)
        .await
        .is_some());
}

#[tokio::test]
async fn test_corrupted_entry_is_a_miss() {
    let dir = TempDir::new().unwrap();

    {
        let cache = VisaCache::new(dir.path(), 3600);
        cache.put(&live_record("de", "tourist"), None).await;
    }

    // Corrupt the sealed file on disk
    let path = dir.path().join("de_tourist.json");
    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, content.replace("Valid Passport", "Hacked Title")).unwrap();

    // A fresh instance (empty memory layer) must reject the entry
    let cache = VisaCache::new(dir.path(), 3600);
    assert!(cache.get("de_tourist").await.is_none());
}

#[tokio::test]
async fn test_cache_status_reporting() {
    let dir = TempDir::new().unwrap();
    let cache = VisaCache::new(dir.path(), 3600);

    let missing = cache.status("de", "tourist", None).await;
    assert!(!missing.cached);
    assert!(!missing.valid);
    assert_eq!(missing.ttl_seconds, 3600);
    assert!(missing.age_seconds.is_none());

    cache.put(&live_record("de", "tourist"), None).await;
    let present = cache.status("de", "tourist", None).await;
    assert!(present.cached);
    assert!(present.valid);
    assert!(present.age_seconds.unwrap() < 10);
    assert!(present.expires_in_seconds.unwrap() > 3590);

    let mut old = live_record("de", "student");
    old.scraped_at = Utc::now() - Duration::seconds(7200);
    cache.put(&old, None).await;
    let expired = cache.status("de", "student", None).await;
    assert!(expired.cached);
    assert!(!expired.valid);
    assert_eq!(expired.expires_in_seconds, Some(0));
}
