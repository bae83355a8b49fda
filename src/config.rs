use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    /// Maximum page characters handed to the LLM before truncation.
    pub llm_content_budget: usize,
    pub crawler_timeout_secs: u64,
    /// Root directory for durable cache entries.
    pub cache_dir: String,
    /// Cache validity window in seconds.
    pub cache_ttl_seconds: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            llm_api_key: std::env::var("LLM_API_KEY")
                .map_err(|_| anyhow::anyhow!("LLM_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("LLM_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            llm_base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-5".to_string()),
            llm_content_budget: std::env::var("LLM_CONTENT_BUDGET")
                .unwrap_or_else(|_| "12000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("LLM_CONTENT_BUDGET must be a positive number"))?,
            crawler_timeout_secs: std::env::var("CRAWLER_TIMEOUT_SECS")
                .unwrap_or_else(|_| "45".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CRAWLER_TIMEOUT_SECS must be a positive number"))?,
            cache_dir: std::env::var("CACHE_DIR")
                .unwrap_or_else(|_| "data/visa_cache".to_string()),
            cache_ttl_seconds: std::env::var("CACHE_TTL_SECONDS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CACHE_TTL_SECONDS must be a positive number"))?,
        };

        if !config.llm_base_url.starts_with("http://") && !config.llm_base_url.starts_with("https://")
        {
            anyhow::bail!("LLM_BASE_URL must start with http:// or https://");
        }
        if config.cache_ttl_seconds == 0 {
            anyhow::bail!("CACHE_TTL_SECONDS must be greater than zero");
        }
        if config.cache_dir.trim().is_empty() {
            anyhow::bail!("CACHE_DIR cannot be empty");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("LLM Base URL: {}", config.llm_base_url);
        tracing::debug!("LLM Model: {}", config.llm_model);
        tracing::debug!("Cache dir: {}", config.cache_dir);
        tracing::debug!("Cache TTL: {}s", config.cache_ttl_seconds);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}
