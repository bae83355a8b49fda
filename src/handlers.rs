use crate::config::Config;
use crate::errors::AppError;
use crate::models::{
    CacheStatus, CacheStatusQuery, RequirementsQuery, ScrapeRequest, ScrapedVisaData,
};
use crate::scraper_service::ScraperService;
use crate::sources;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// Application state shared across all handlers.
///
/// Constructed once in `main` and passed down; no module holds global
/// mutable state of its own.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// The scrape pipeline (crawler, extractor, cache).
    pub scraper: ScraperService,
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-visa-api",
            "version": "0.1.0"
        })),
    )
}

/// GET /api/v1/visa/requirements
///
/// Main consumer endpoint: returns the merged requirement record for a
/// (country, visa type) pair, scraping the country's official sources on
/// a cache miss.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `params` - Query parameters: country, visa_type, optional nationality and force_refresh.
///
/// # Returns
///
/// * `Result<Json<ScrapedVisaData>, AppError>` - The merged record or an error.
pub async fn get_requirements(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RequirementsQuery>,
) -> Result<Json<ScrapedVisaData>, AppError> {
    tracing::info!("GET /visa/requirements - params: {:?}", params);

    if params.country.trim().is_empty() || params.visa_type.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Both country and visa_type are required".to_string(),
        ));
    }

    let urls = sources::official_sources(&params.country);
    if urls.is_empty() {
        return Err(AppError::NotFound(format!(
            "No known official sources for country '{}'; supply URLs via POST /api/v1/visa/scrape",
            params.country
        )));
    }

    let record = state
        .scraper
        .fetch_many(
            &params.country,
            &params.visa_type,
            &urls,
            params.nationality.as_deref(),
            params.force_refresh,
        )
        .await?;

    tracing::info!(
        "Returning {} requirements for {}/{} (data_source: {:?}, {} warnings)",
        record.requirements.len(),
        record.country,
        record.visa_type,
        record.data_source,
        record.scraping_warnings.len()
    );

    Ok(Json(record))
}

/// POST /api/v1/visa/scrape
///
/// Explicit multi-source scrape with caller-supplied URLs. Falls back to
/// the official-source table when the body omits them.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - Scrape request body.
///
/// # Returns
///
/// * `Result<Json<ScrapedVisaData>, AppError>` - The merged record or an error.
pub async fn scrape_visa_sources(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScrapeRequest>,
) -> Result<Json<ScrapedVisaData>, AppError> {
    tracing::info!(
        "POST /visa/scrape - {}/{} ({} URLs supplied)",
        request.country,
        request.visa_type,
        request.urls.as_ref().map(|u| u.len()).unwrap_or(0)
    );

    if request.country.trim().is_empty() || request.visa_type.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Both country and visa_type are required".to_string(),
        ));
    }

    let urls = match request.urls {
        Some(urls) if !urls.is_empty() => urls,
        _ => {
            let fallback = sources::official_sources(&request.country);
            if fallback.is_empty() {
                return Err(AppError::BadRequest(format!(
                    "No URLs supplied and no known official sources for country '{}'",
                    request.country
                )));
            }
            fallback
        }
    };

    let record = state
        .scraper
        .fetch_many(
            &request.country,
            &request.visa_type,
            &urls,
            request.nationality.as_deref(),
            request.force_refresh,
        )
        .await?;

    Ok(Json(record))
}

/// GET /api/v1/visa/cache/status
///
/// Cache observability for one (country, visa type, nationality) key.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `params` - Query parameters identifying the cache key.
///
/// # Returns
///
/// * `Json<CacheStatus>` - Whether the key is cached, valid, and when it expires.
pub async fn get_cache_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CacheStatusQuery>,
) -> Json<CacheStatus> {
    tracing::info!("GET /visa/cache/status - params: {:?}", params);

    let status = state
        .scraper
        .cache_status(
            &params.country,
            &params.visa_type,
            params.nationality.as_deref(),
        )
        .await;

    Json(status)
}
