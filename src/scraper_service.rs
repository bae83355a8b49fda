/// Scrape orchestration: single-source fetch, cache-aware entry points,
/// and the concurrent multi-source fan-out.
///
/// The layering follows one rule: everything below `fetch_many` encodes
/// degradation in the record's `data_source` tag instead of erroring, so
/// consumers make one policy decision ("is this tag acceptable?") instead
/// of wrapping every call in error handling. The only hard failure is
/// `fetch_many` with every source failed and no stale cache entry.
use crate::cache::VisaCache;
use crate::config::Config;
use crate::crawler::CrawlerClient;
use crate::errors::AppError;
use crate::extractor::RequirementExtractor;
use crate::merge::merge_scraped_results;
use crate::models::{CacheStatus, DataSource, ScrapedVisaData};
use crate::sources;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::task::JoinSet;
use url::Url;

/// Generic application walkthrough. Not source-derived: consular sites
/// describe documents well but rarely publish a clean step list, so every
/// record carries this fixed sequence (flagged in its warnings).
const APPLICATION_STEPS: &[&str] = &[
    "Determine the correct visa type for your travel purpose",
    "Gather the required documents listed for your profile",
    "Complete the official application form",
    "Create an account on the application portal if required",
    "Book an appointment at the embassy, consulate or application center",
    "Pay the visa fee and keep the receipt",
    "Attend the appointment and submit your documents",
    "Provide biometric data (fingerprints and photo) if requested",
    "Track your application status online",
    "Collect your passport or await courier delivery",
    "Check the visa sticker for errors before travelling",
];

const STEPS_WARNING: &str =
    "Application steps are a generic walkthrough, not scraped from the source";
const PROCESSING_WARNING: &str =
    "Processing time and fees are generic estimates, not scraped from the source";

const GENERIC_PROCESSING_TIME: &str =
    "Typically 10 to 15 business days, longer during peak season; check the official source for current estimates";

fn generic_fees() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "visa_fee".to_string(),
            "Varies by visa type and nationality; check the official fee table".to_string(),
        ),
        (
            "service_fee".to_string(),
            "An additional service fee may apply at external application centers".to_string(),
        ),
    ])
}

/// Scrape pipeline service. Constructed once at process start and shared
/// through `AppState`; cheap to clone (clients and cache are handles).
#[derive(Clone)]
pub struct ScraperService {
    crawler: CrawlerClient,
    extractor: RequirementExtractor,
    cache: VisaCache,
}

impl ScraperService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            crawler: CrawlerClient::new(config)?,
            extractor: RequirementExtractor::new(config),
            cache: VisaCache::new(&config.cache_dir, config.cache_ttl_seconds),
        })
    }

    /// Scrapes exactly one (country, visa type, URL). Always returns a
    /// record; every failure mode maps to a `ScrapingFailed*` tag.
    pub async fn scrape_single(
        &self,
        country: &str,
        visa_type: &str,
        url: &str,
    ) -> ScrapedVisaData {
        let country = country.to_lowercase();
        let visa_type = visa_type.to_lowercase();

        if url.trim().is_empty() {
            tracing::warn!("No source URL provided for {}/{}", country, visa_type);
            return ScrapedVisaData::failed(
                &country,
                &visa_type,
                url,
                DataSource::ScrapingFailedNoUrl,
                "No source URL provided, nothing was scraped",
            );
        }

        match self.scrape_single_inner(&country, &visa_type, url).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    "Unexpected failure scraping {} for {}/{}: {}",
                    url,
                    country,
                    visa_type,
                    e
                );
                ScrapedVisaData::failed(
                    &country,
                    &visa_type,
                    url,
                    DataSource::ScrapingFailedException,
                    format!("Unexpected scrape failure for {}: {}", url, e),
                )
            }
        }
    }

    /// The fallible inner sequence; `scrape_single` is the boundary that
    /// converts an `Err` into an exception-tagged record.
    async fn scrape_single_inner(
        &self,
        country: &str,
        visa_type: &str,
        url: &str,
    ) -> Result<ScrapedVisaData, AppError> {
        let resolved = sources::resolve_source_url(url, country, visa_type);
        Url::parse(&resolved)
            .map_err(|e| AppError::BadRequest(format!("Invalid source URL '{}': {}", resolved, e)))?;

        tracing::info!("Scraping {}/{} from {}", country, visa_type, resolved);
        let outcome = self.crawler.fetch(&resolved).await;

        if !outcome.success {
            let message = outcome
                .error_message
                .unwrap_or_else(|| "unknown crawler error".to_string());
            return Ok(ScrapedVisaData::failed(
                country,
                visa_type,
                &resolved,
                DataSource::ScrapingFailedError,
                format!("Crawler failed for {}: {}", resolved, message),
            ));
        }

        let requirements = self.extractor.extract(country, &outcome.text).await;

        let mut warnings = vec![STEPS_WARNING.to_string(), PROCESSING_WARNING.to_string()];
        let data_source = if requirements.is_empty() {
            warnings.push(format!(
                "No requirements could be extracted from {}",
                resolved
            ));
            DataSource::ScrapingFailedNoData
        } else {
            DataSource::ScrapedLive
        };

        Ok(ScrapedVisaData {
            country: country.to_string(),
            visa_type: visa_type.to_string(),
            requirements,
            application_steps: APPLICATION_STEPS.iter().map(|s| s.to_string()).collect(),
            processing_time: Some(GENERIC_PROCESSING_TIME.to_string()),
            fees: Some(generic_fees()),
            source_url: resolved,
            scraped_at: Utc::now(),
            data_source,
            scraping_warnings: warnings,
        })
    }

    /// Cache-aware single-source fetch. Never errors: serves a fresh
    /// cache hit, else scrapes live (persisting on success), else falls
    /// back to a stale entry, else returns the failure-tagged record.
    pub async fn fetch_one(
        &self,
        country: &str,
        visa_type: &str,
        url: &str,
        nationality: Option<&str>,
        force_refresh: bool,
    ) -> ScrapedVisaData {
        let country = country.to_lowercase();
        let visa_type = visa_type.to_lowercase();

        if let Some(hit) = self
            .cache
            .get_fresh(&country, &visa_type, nationality, force_refresh)
            .await
        {
            return hit;
        }

        let record = self.scrape_single(&country, &visa_type, url).await;
        if record.data_source.is_live() {
            self.cache.put(&record, nationality).await;
            return record;
        }

        // Live scrape failed; an expired entry beats no data at all.
        if let Some(stale) = self.cache.get_stale(&country, &visa_type, nationality).await {
            return stale;
        }

        record
    }

    /// Concurrent multi-source fetch and merge.
    ///
    /// One task per URL; a failing source never cancels the others. The
    /// merge base is the first successful result in input-URL order.
    /// Errors only when every source failed and no stale entry exists.
    pub async fn fetch_many(
        &self,
        country: &str,
        visa_type: &str,
        urls: &[String],
        nationality: Option<&str>,
        force_refresh: bool,
    ) -> Result<ScrapedVisaData, AppError> {
        let country = country.to_lowercase();
        let visa_type = visa_type.to_lowercase();

        if urls.is_empty() {
            return Err(AppError::BadRequest(
                "At least one source URL is required".to_string(),
            ));
        }

        if let Some(hit) = self
            .cache
            .get_fresh(&country, &visa_type, nationality, force_refresh)
            .await
        {
            return Ok(hit);
        }

        tracing::info!(
            "Starting multi-source scrape for {}/{} across {} URLs",
            country,
            visa_type,
            urls.len()
        );

        let mut tasks = JoinSet::new();
        for (index, url) in urls.iter().enumerate() {
            let service = self.clone();
            let (country, visa_type, url) = (country.clone(), visa_type.clone(), url.clone());
            tasks.spawn(async move {
                let record = service.scrape_single(&country, &visa_type, &url).await;
                (index, url, record)
            });
        }

        // Collect in arrival order; ordering for the merge is restored
        // from the input index afterwards.
        let mut successes: Vec<(usize, ScrapedVisaData)> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, url, record)) => {
                    if record.data_source.is_failure() {
                        errors.push(format!("{}: {}", url, describe_failure(&record)));
                    } else {
                        successes.push((index, record));
                    }
                }
                Err(e) => {
                    errors.push(format!("scrape task failed to complete: {}", e));
                }
            }
        }

        if successes.is_empty() {
            tracing::error!(
                "All {} sources failed for {}/{}: {:?}",
                urls.len(),
                country,
                visa_type,
                errors
            );
            if let Some(stale) = self.cache.get_stale(&country, &visa_type, nationality).await {
                return Ok(stale);
            }
            return Err(AppError::AllSourcesFailed(errors));
        }

        successes.sort_by_key(|(index, _)| *index);
        let results: Vec<ScrapedVisaData> =
            successes.into_iter().map(|(_, record)| record).collect();

        tracing::info!(
            "Merging {} successful results ({} sources failed) for {}/{}",
            results.len(),
            errors.len(),
            country,
            visa_type
        );
        let merged = merge_scraped_results(results, errors);

        self.cache.put(&merged, nationality).await;
        Ok(merged)
    }

    /// Cache observability for one (country, visa type, nationality) key.
    pub async fn cache_status(
        &self,
        country: &str,
        visa_type: &str,
        nationality: Option<&str>,
    ) -> CacheStatus {
        self.cache
            .status(&country.to_lowercase(), &visa_type.to_lowercase(), nationality)
            .await
    }
}

/// Short failure description for the orchestration error list.
fn describe_failure(record: &ScrapedVisaData) -> String {
    record
        .scraping_warnings
        .first()
        .cloned()
        .unwrap_or_else(|| format!("{:?}", record.data_source))
}
