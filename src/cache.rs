use crate::cache_validator::SealedRecord;
use crate::models::{CacheStatus, DataSource, ScrapedVisaData};
use chrono::Utc;
use moka::future::Cache;
use std::path::PathBuf;
use std::time::Duration;

/// Durable visa-data cache with TTL and stale-fallback semantics.
///
/// Two layers: a moka in-process cache for hot keys and one checksum-sealed
/// JSON file per key under the configured cache root. The cache is an
/// optimization layer: every read/write problem is logged and treated as a
/// miss or a skip, never surfaced to the scrape path.
#[derive(Clone)]
pub struct VisaCache {
    memory: Cache<String, ScrapedVisaData>,
    root: PathBuf,
    ttl_seconds: u64,
}

impl VisaCache {
    pub fn new(root: impl Into<PathBuf>, ttl_seconds: u64) -> Self {
        // The memory layer shares the durable TTL; validity is still
        // re-checked against scraped_at on every fresh read.
        let memory = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_seconds))
            .max_capacity(10_000)
            .build();

        Self {
            memory,
            root: root.into(),
            ttl_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Composite cache key: `{country}_{visa_type}[_{nationality}]`,
    /// country and nationality lower-cased.
    pub fn cache_key(country: &str, visa_type: &str, nationality: Option<&str>) -> String {
        let mut key = format!("{}_{}", country.to_lowercase(), visa_type);
        if let Some(nat) = nationality {
            if !nat.trim().is_empty() {
                key.push('_');
                key.push_str(&nat.to_lowercase());
            }
        }
        key
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    /// Pure read with no freshness judgment: memory first, then the
    /// sealed file on disk. Corrupted or unreadable entries are misses.
    pub async fn get(&self, key: &str) -> Option<ScrapedVisaData> {
        if let Some(record) = self.memory.get(key).await {
            return Some(record);
        }

        let path = self.entry_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", path.display(), e);
                return None;
            }
        };

        let payload = SealedRecord::unseal(&content)?;
        match serde_json::from_str::<ScrapedVisaData>(&payload) {
            Ok(record) => {
                // Promote to the memory layer for subsequent reads
                self.memory.insert(key.to_string(), record.clone()).await;
                Some(record)
            }
            Err(e) => {
                tracing::warn!("Cache entry {} failed to deserialize: {}", key, e);
                None
            }
        }
    }

    /// Whether a record is still within the TTL window.
    pub fn is_valid(&self, record: &ScrapedVisaData) -> bool {
        (Utc::now() - record.scraped_at).num_seconds() < self.ttl_seconds as i64
    }

    /// Read-through entry point: returns a fresh entry with its tag
    /// rewritten to `Cached`, or nothing when absent, expired, or
    /// bypassed via `force_refresh`. An expired entry stays on disk for
    /// `get_stale`.
    pub async fn get_fresh(
        &self,
        country: &str,
        visa_type: &str,
        nationality: Option<&str>,
        force_refresh: bool,
    ) -> Option<ScrapedVisaData> {
        if force_refresh {
            tracing::debug!("Cache bypassed (force_refresh) for {}/{}", country, visa_type);
            return None;
        }

        let key = Self::cache_key(country, visa_type, nationality);
        let record = self.get(&key).await?;
        if !self.is_valid(&record) {
            tracing::info!("Cache entry {} expired, needs refresh", key);
            return None;
        }

        tracing::info!("✓ Cache hit for {}", key);
        let mut record = record;
        record.data_source = DataSource::Cached;
        Some(record)
    }

    /// Last-resort read for the stale-fallback path: returns whatever
    /// entry exists, however old, tagged `CachedStale`.
    pub async fn get_stale(
        &self,
        country: &str,
        visa_type: &str,
        nationality: Option<&str>,
    ) -> Option<ScrapedVisaData> {
        let key = Self::cache_key(country, visa_type, nationality);
        let mut record = self.get(&key).await?;
        tracing::warn!("Serving stale cache entry for {}", key);
        record.data_source = DataSource::CachedStale;
        Some(record)
    }

    /// Write-through persist. Only records produced by a live scrape are
    /// stored; failures and cached passthroughs are rejected so the cache
    /// never feeds on itself. `nationality` completes the composite key
    /// because the record itself does not carry it.
    pub async fn put(&self, record: &ScrapedVisaData, nationality: Option<&str>) {
        if !record.data_source.is_live() {
            tracing::debug!(
                "Not caching record for {}/{} with data_source {:?}",
                record.country,
                record.visa_type,
                record.data_source
            );
            return;
        }

        let key = Self::cache_key(&record.country, &record.visa_type, nationality);
        self.memory.insert(key.clone(), record.clone()).await;

        let payload = match serde_json::to_string(record) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        let sealed = SealedRecord::new(payload).seal();

        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            tracing::warn!("Failed to create cache dir {}: {}", self.root.display(), e);
            return;
        }
        let path = self.entry_path(&key);
        match tokio::fs::write(&path, sealed).await {
            Ok(()) => tracing::debug!("✓ Cached {} to {}", key, path.display()),
            Err(e) => tracing::warn!("Cache write failed for {}: {}", path.display(), e),
        }
    }

    /// Observability snapshot for one key.
    pub async fn status(
        &self,
        country: &str,
        visa_type: &str,
        nationality: Option<&str>,
    ) -> CacheStatus {
        let key = Self::cache_key(country, visa_type, nationality);
        match self.get(&key).await {
            Some(record) => {
                let age = (Utc::now() - record.scraped_at).num_seconds();
                let valid = self.is_valid(&record);
                CacheStatus {
                    cached: true,
                    valid,
                    age_seconds: Some(age),
                    ttl_seconds: self.ttl_seconds,
                    expires_in_seconds: Some((self.ttl_seconds as i64 - age).max(0)),
                }
            }
            None => CacheStatus {
                cached: false,
                valid: false,
                age_seconds: None,
                ttl_seconds: self.ttl_seconds,
                expires_in_seconds: None,
            },
        }
    }
}
