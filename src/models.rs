use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============ Scrape Result Models ============

/// Category of a visa requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementCategory {
    /// Paperwork: passport, forms, photos.
    Documents,
    /// Proof of funds, bank statements, income.
    Financial,
    /// Personal circumstances: employment, civil status.
    Personal,
    /// Health insurance, vaccination certificates.
    Medical,
    /// Appointments, fees, biometrics.
    Administrative,
}

impl RequirementCategory {
    /// Parses a free-form category string coming back from the LLM.
    ///
    /// Unknown values fall back to `Documents` rather than failing the
    /// whole extraction.
    pub fn parse_loose(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "financial" => RequirementCategory::Financial,
            "personal" => RequirementCategory::Personal,
            "medical" => RequirementCategory::Medical,
            "administrative" => RequirementCategory::Administrative,
            _ => RequirementCategory::Documents,
        }
    }
}

/// One discrete visa requirement extracted from a source page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// Unique within one scrape batch (`{country}_llm_001` / `{country}_gen_001`).
    /// Regenerated per source, never globally stable.
    pub id: String,
    /// Short human-readable name. The case/whitespace-folded value is the
    /// dedup key across a merge.
    pub title: String,
    /// Free text. A longer description from a later source replaces this
    /// one during merge.
    pub description: String,
    /// Requirement category.
    pub category: RequirementCategory,
    /// Whether the requirement is mandatory for all applicants.
    pub mandatory: bool,
    /// Profile tags this requirement applies to (e.g. "employed").
    /// Empty means it applies to everyone.
    #[serde(default)]
    pub applicable_to: Vec<String>,
    /// Free text. Merge appends provenance and cross-source notes here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Provenance tag recording how a `ScrapedVisaData` record was obtained.
///
/// Consumers branch on this tag instead of catching errors: only the
/// `ScrapedLive*` variants are ever persisted to cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fresh single-source scrape.
    ScrapedLive,
    /// Merge of multiple sources, at least one of them scraped live.
    ScrapedLiveMerged,
    /// Merge where every contributor was itself degraded but non-empty.
    ScrapedLiveFallback,
    /// Served from a valid cache entry.
    Cached,
    /// Served from an expired cache entry because a fresh fetch failed.
    CachedStale,
    /// No source URL was provided.
    ScrapingFailedNoUrl,
    /// The page was fetched but no requirements could be extracted.
    ScrapingFailedNoData,
    /// The crawler reported a fetch failure.
    ScrapingFailedError,
    /// An unexpected error was caught at the scrape boundary.
    ScrapingFailedException,
}

impl DataSource {
    /// True for records produced by a live scrape. Only these are cacheable.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            DataSource::ScrapedLive
                | DataSource::ScrapedLiveMerged
                | DataSource::ScrapedLiveFallback
        )
    }

    /// True for records representing a failed scrape attempt.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DataSource::ScrapingFailedNoUrl
                | DataSource::ScrapingFailedNoData
                | DataSource::ScrapingFailedError
                | DataSource::ScrapingFailedException
        )
    }
}

/// The unit cached and returned to consumers: everything scraped for one
/// (country, visa type) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedVisaData {
    /// Destination country code, lower-cased.
    pub country: String,
    /// Visa type (e.g. "tourist", "student"), lower-cased.
    pub visa_type: String,
    /// Discovery-ordered requirements. Folded titles are unique within
    /// this list; first-seen wins position during merge.
    pub requirements: Vec<Requirement>,
    /// Ordered application walkthrough, case-insensitively deduplicated.
    pub application_steps: Vec<String>,
    /// Expected processing time. Merge keeps the longest string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<String>,
    /// Fee breakdown. Merge keeps the map with the most keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<BTreeMap<String, String>>,
    /// Source URL, or a synthesized "Multiple sources (N): ..." string
    /// after a multi-source merge.
    pub source_url: String,
    /// Timestamp of the last successful build of this record.
    pub scraped_at: DateTime<Utc>,
    /// How this record was obtained. Drives caching decisions.
    pub data_source: DataSource,
    /// Non-fatal issues encountered while scraping.
    #[serde(default)]
    pub scraping_warnings: Vec<String>,
}

impl ScrapedVisaData {
    /// Builds an empty failure record carrying the given provenance tag
    /// and warning. Used by the scrape boundary, which returns a value
    /// for every outcome instead of erroring.
    pub fn failed(
        country: &str,
        visa_type: &str,
        source_url: &str,
        data_source: DataSource,
        warning: impl Into<String>,
    ) -> Self {
        Self {
            country: country.to_lowercase(),
            visa_type: visa_type.to_lowercase(),
            requirements: Vec::new(),
            application_steps: Vec::new(),
            processing_time: None,
            fees: None,
            source_url: source_url.to_string(),
            scraped_at: Utc::now(),
            data_source,
            scraping_warnings: vec![warning.into()],
        }
    }
}

/// Folds a requirement title for dedup: collapse whitespace, lowercase.
///
/// "Valid Passport" and "valid  passport " fold to the same key.
pub fn fold_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ============ Cache Observability ============

/// Cache state for one (country, visa type, nationality) key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    /// Whether an entry exists at all (fresh or stale).
    pub cached: bool,
    /// Whether the entry is within its TTL.
    pub valid: bool,
    /// Age of the entry in seconds, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_seconds: Option<i64>,
    /// Configured TTL in seconds.
    pub ttl_seconds: u64,
    /// Seconds until expiry (0 if already expired), if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<i64>,
}

// ============ API Request/Response Models ============

/// Query parameters for the requirements endpoint.
#[derive(Debug, Deserialize)]
pub struct RequirementsQuery {
    pub country: String,
    pub visa_type: String,
    pub nationality: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Body of an explicit multi-source scrape request.
#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub country: String,
    pub visa_type: String,
    /// Source URLs to scrape. Falls back to the official-source table
    /// for the country when omitted.
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    pub nationality: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Query parameters for the cache status endpoint.
#[derive(Debug, Deserialize)]
pub struct CacheStatusQuery {
    pub country: String,
    pub visa_type: String,
    pub nationality: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_title_collapses_case_and_whitespace() {
        assert_eq!(fold_title("Valid Passport"), "valid passport");
        assert_eq!(fold_title("  valid   PASSPORT "), "valid passport");
        assert_eq!(fold_title("valid\tpassport"), "valid passport");
    }

    #[test]
    fn test_data_source_classification() {
        assert!(DataSource::ScrapedLive.is_live());
        assert!(DataSource::ScrapedLiveMerged.is_live());
        assert!(DataSource::ScrapedLiveFallback.is_live());
        assert!(!DataSource::Cached.is_live());
        assert!(!DataSource::CachedStale.is_live());

        assert!(DataSource::ScrapingFailedNoUrl.is_failure());
        assert!(DataSource::ScrapingFailedNoData.is_failure());
        assert!(DataSource::ScrapingFailedError.is_failure());
        assert!(DataSource::ScrapingFailedException.is_failure());
        assert!(!DataSource::ScrapedLive.is_failure());
        assert!(!DataSource::Cached.is_failure());
    }

    #[test]
    fn test_data_source_serializes_snake_case() {
        let tag = serde_json::to_string(&DataSource::ScrapedLiveMerged).unwrap();
        assert_eq!(tag, "\"scraped_live_merged\"");
        let tag = serde_json::to_string(&DataSource::ScrapingFailedNoUrl).unwrap();
        assert_eq!(tag, "\"scraping_failed_no_url\"");
    }

    #[test]
    fn test_category_parse_loose_falls_back_to_documents() {
        assert_eq!(
            RequirementCategory::parse_loose("Financial"),
            RequirementCategory::Financial
        );
        assert_eq!(
            RequirementCategory::parse_loose("  MEDICAL "),
            RequirementCategory::Medical
        );
        assert_eq!(
            RequirementCategory::parse_loose("something else"),
            RequirementCategory::Documents
        );
    }
}
