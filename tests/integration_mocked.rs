/// Integration tests with mocked external services
/// Tests the complete scrape pipeline without hitting real government
/// sites or a real LLM endpoint
use rust_visa_api::config::Config;
use rust_visa_api::errors::AppError;
use rust_visa_api::models::DataSource;
use rust_visa_api::scraper_service::ScraperService;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config
fn create_test_config(llm_base_url: String, cache_dir: String) -> Config {
    Config {
        port: 8080,
        llm_api_key: "test_key".to_string(),
        llm_base_url,
        llm_model: "test-model".to_string(),
        llm_content_budget: 12000,
        crawler_timeout_secs: 5,
        cache_dir,
        cache_ttl_seconds: 3600,
    }
}

/// A visa page with keywords for three pattern classes: passport,
/// travel insurance, bank statement.
const VISA_PAGE_HTML: &str = r#"<html><body>
<h1>Tourist visa requirements</h1>
<p>You need a valid passport and travel health insurance.</p>
<ul><li>Bank statement covering the last three months</li></ul>
</body></html>"#;

/// Builds an LLM messages-API response whose text payload is a
/// requirements JSON object.
fn llm_response(requirements: serde_json::Value) -> serde_json::Value {
    json!({
        "id": "msg_test",
        "content": [{
            "type": "text",
            "text": json!({ "requirements": requirements }).to_string()
        }],
        "usage": { "input_tokens": 10, "output_tokens": 10 }
    })
}

fn default_llm_requirements() -> serde_json::Value {
    json!([
        {
            "title": "Valid Passport",
            "description": "Passport valid at least three months beyond departure, issued within ten years.",
            "category": "documents",
            "mandatory": true
        },
        {
            "title": "Proof of Sufficient Funds",
            "description": "Evidence of at least 50 EUR per day of stay.",
            "category": "financial",
            "mandatory": true
        }
    ])
}

#[tokio::test]
async fn test_scrape_single_live_success_unions_llm_and_patterns() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/visa-info"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VISA_PAGE_HTML))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(llm_response(default_llm_requirements())),
        )
        .mount(&mock_server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let config = create_test_config(
        mock_server.uri(),
        cache_dir.path().to_str().unwrap().to_string(),
    );
    let service = ScraperService::new(&config).unwrap();

    // "pt" has no URL pattern entry, so the full mock URL is used as-is
    let record = service
        .scrape_single("pt", "tourist", &format!("{}/visa-info", mock_server.uri()))
        .await;

    assert_eq!(record.data_source, DataSource::ScrapedLive);
    assert_eq!(record.country, "pt");

    let titles: Vec<&str> = record.requirements.iter().map(|r| r.title.as_str()).collect();
    // LLM records first, colliding pattern title (passport) absorbed,
    // non-colliding pattern classes appended
    assert_eq!(titles[0], "Valid Passport");
    assert!(titles.contains(&"Proof of Sufficient Funds"));
    assert!(titles.contains(&"Travel Health Insurance"));
    assert!(titles.contains(&"Bank Statement"));
    assert_eq!(record.requirements.len(), 4);

    // The LLM's description wins the passport title collision
    assert!(record.requirements[0].description.contains("ten years"));

    // Constant record shape: generic walkthrough and placeholder metadata
    assert_eq!(record.application_steps.len(), 11);
    assert!(record.processing_time.is_some());
    assert!(record.fees.is_some());
    assert!(record.scraping_warnings.len() >= 2);
}

#[tokio::test]
async fn test_llm_failure_falls_back_to_pattern_floor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/visa-info"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VISA_PAGE_HTML))
        .mount(&mock_server)
        .await;

    // Non-retryable LLM failure: extraction downgrades to zero yield
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&mock_server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let config = create_test_config(
        mock_server.uri(),
        cache_dir.path().to_str().unwrap().to_string(),
    );
    let service = ScraperService::new(&config).unwrap();

    let record = service
        .scrape_single("pt", "tourist", &format!("{}/visa-info", mock_server.uri()))
        .await;

    // The final list is exactly the keyword strategy's output
    assert_eq!(record.data_source, DataSource::ScrapedLive);
    let titles: Vec<&str> = record.requirements.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Valid Passport", "Travel Health Insurance", "Bank Statement"]
    );
    assert!(record.requirements.iter().all(|r| r.id.contains("_gen_")));
}

#[tokio::test]
async fn test_scrape_single_failure_tags() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let config = create_test_config(
        mock_server.uri(),
        cache_dir.path().to_str().unwrap().to_string(),
    );
    let service = ScraperService::new(&config).unwrap();

    // Missing URL: tagged without any network I/O
    let record = service.scrape_single("pt", "tourist", "").await;
    assert_eq!(record.data_source, DataSource::ScrapingFailedNoUrl);
    assert!(record.requirements.is_empty());

    // Crawl failure: the crawler's error lands in the warnings
    let record = service
        .scrape_single("pt", "tourist", &format!("{}/broken", mock_server.uri()))
        .await;
    assert_eq!(record.data_source, DataSource::ScrapingFailedError);
    assert!(record.requirements.is_empty());
    assert!(record.scraping_warnings[0].contains("Crawler failed"));

    // Unparseable URL: caught at the scrape boundary
    let record = service.scrape_single("pt", "tourist", "not a url").await;
    assert_eq!(record.data_source, DataSource::ScrapingFailedException);
}

#[tokio::test]
async fn test_fetch_one_serves_cache_on_second_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/visa-info"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VISA_PAGE_HTML))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(llm_response(default_llm_requirements())),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let config = create_test_config(
        mock_server.uri(),
        cache_dir.path().to_str().unwrap().to_string(),
    );
    let service = ScraperService::new(&config).unwrap();
    let url = format!("{}/visa-info", mock_server.uri());

    let first = service.fetch_one("pt", "tourist", &url, None, false).await;
    assert_eq!(first.data_source, DataSource::ScrapedLive);

    let second = service.fetch_one("pt", "tourist", &url, None, false).await;
    assert_eq!(second.data_source, DataSource::Cached);
    assert_eq!(second.requirements.len(), first.requirements.len());
}

#[tokio::test]
async fn test_fetch_many_partial_success_merges_and_warns() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VISA_PAGE_HTML))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VISA_PAGE_HTML))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&mock_server)
        .await;

    let cache_dir = TempDir::new().unwrap();
    let config = create_test_config(
        mock_server.uri(),
        cache_dir.path().to_str().unwrap().to_string(),
    );
    let service = ScraperService::new(&config).unwrap();

    let urls = vec![
        format!("{}/a", mock_server.uri()),
        format!("{}/b", mock_server.uri()),
        format!("{}/c", mock_server.uri()),
    ];
    let merged = service
        .fetch_many("pt", "tourist", &urls, None, false)
        .await
        .unwrap();

    assert_eq!(merged.data_source, DataSource::ScrapedLiveMerged);
    // Both successful sources carry the same three pattern classes
    assert_eq!(merged.requirements.len(), 3);
    // The kept records reference both contributing source URLs
    let notes = merged.requirements[0].notes.as_ref().unwrap();
    assert!(notes.contains("/a"));
    assert!(notes.contains("/b"));
    // The failed source surfaces as a warning, not an error
    assert!(merged
        .scraping_warnings
        .iter()
        .any(|w| w.contains("/c") && w.contains("Crawler failed")));
    assert!(merged.source_url.starts_with("Multiple sources (2):"));
}

#[tokio::test]
async fn test_fetch_many_all_fail_raises_with_all_messages() {
    let mock_server = MockServer::start().await;

    for p in ["/a", "/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&mock_server)
            .await;
    }

    let cache_dir = TempDir::new().unwrap();
    let config = create_test_config(
        mock_server.uri(),
        cache_dir.path().to_str().unwrap().to_string(),
    );
    let service = ScraperService::new(&config).unwrap();

    let urls = vec![
        format!("{}/a", mock_server.uri()),
        format!("{}/b", mock_server.uri()),
        format!("{}/c", mock_server.uri()),
    ];
    let result = service.fetch_many("pt", "tourist", &urls, None, false).await;

    match result {
        Err(AppError::AllSourcesFailed(errors)) => {
            assert_eq!(errors.len(), 3);
            assert!(errors.iter().all(|e| e.contains("Crawler failed")));
        }
        other => panic!("Expected AllSourcesFailed, got {:?}", other.map(|r| r.data_source)),
    }
}

#[tokio::test]
async fn test_fetch_many_stale_fallback_on_total_failure() {
    use chrono::{Duration, Utc};
    use rust_visa_api::cache::VisaCache;
    use rust_visa_api::models::{Requirement, RequirementCategory, ScrapedVisaData};

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&mock_server)
        .await;

    let cache_dir = TempDir::new().unwrap();

    // Seed an expired entry: an old successful scrape
    {
        let cache = VisaCache::new(cache_dir.path(), 3600);
        let record = ScrapedVisaData {
            country: "pt".to_string(),
            visa_type: "tourist".to_string(),
            requirements: vec![Requirement {
                id: "pt_gen_001".to_string(),
                title: "Valid Passport".to_string(),
                description: "A passport valid for the stay".to_string(),
                category: RequirementCategory::Documents,
                mandatory: true,
                applicable_to: vec![],
                notes: None,
            }],
            application_steps: vec![],
            processing_time: None,
            fees: None,
            source_url: "https://old.example/visa".to_string(),
            scraped_at: Utc::now() - Duration::seconds(7200),
            data_source: DataSource::ScrapedLive,
            scraping_warnings: vec![],
        };
        cache.put(&record, None).await;
    }

    let config = create_test_config(
        mock_server.uri(),
        cache_dir.path().to_str().unwrap().to_string(),
    );
    let service = ScraperService::new(&config).unwrap();

    let urls = vec![format!("{}/a", mock_server.uri())];
    let record = service
        .fetch_many("pt", "tourist", &urls, None, false)
        .await
        .unwrap();

    // Expired data beats no data: the stale entry is served, re-tagged
    assert_eq!(record.data_source, DataSource::CachedStale);
    assert_eq!(record.requirements.len(), 1);
    assert_eq!(record.requirements[0].title, "Valid Passport");
}

#[tokio::test]
async fn test_fetch_many_requires_urls() {
    let cache_dir = TempDir::new().unwrap();
    let config = create_test_config(
        "http://127.0.0.1:1".to_string(),
        cache_dir.path().to_str().unwrap().to_string(),
    );
    let service = ScraperService::new(&config).unwrap();

    let result = service.fetch_many("pt", "tourist", &[], None, false).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}
