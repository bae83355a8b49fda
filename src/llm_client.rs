use crate::config::Config;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Client for the LLM structured-generation endpoint.
///
/// All LLM interactions in the scrape pipeline go through this module.
/// Callers request JSON constrained to a schema; malformed output is
/// cleaned up (markdown fences stripped) before parsing is given up on.
const ANTHROPIC_MESSAGES_PATH: &str = "/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
/// Bounded retry: fixed attempt count with a fixed inter-attempt delay.
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 750;

/// LLM call failure modes.
#[derive(Debug)]
pub enum LlmError {
    /// Transport-level failure.
    Http(String),
    /// Non-success response from the API.
    Api { status: u16, message: String },
    /// Response text was not valid JSON for the requested schema.
    Parse(String),
    /// All retry attempts exhausted.
    Exhausted { attempts: u32 },
    /// The model returned no text content.
    EmptyContent,
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Http(msg) => write!(f, "HTTP error: {}", msg),
            LlmError::Api { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            LlmError::Parse(msg) => write!(f, "JSON parse error: {}", msg),
            LlmError::Exhausted { attempts } => {
                write!(f, "LLM call failed after {} attempts", attempts)
            }
            LlmError::EmptyContent => write!(f, "LLM returned empty content"),
        }
    }
}

impl std::error::Error for LlmError {}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

impl MessagesResponse {
    /// Extracts the text content from the first text block.
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Client wrapping the LLM messages API with retry logic and structured
/// output helpers.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
        }
    }

    /// Makes a raw call to the messages API, returning the response text.
    /// Retries on 429 (rate limit), 5xx, and transport errors with a fixed
    /// delay between attempts; other failures return immediately.
    pub async fn generate(
        &self,
        prompt: &str,
        system: &str,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let request_body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature,
            system,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let url = format!("{}{}", self.base_url, ANTHROPIC_MESSAGES_PATH);

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tracing::warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    RETRY_DELAY_MS
                );
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
            }

            let response = self
                .client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e.to_string()));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse the provider's error message
                let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: MessagesResponse = response
                .json()
                .await
                .map_err(|e| LlmError::Http(e.to_string()))?;

            let text = parsed.text().ok_or(LlmError::EmptyContent)?;
            tracing::debug!("LLM call succeeded: {} chars returned", text.len());
            return Ok(text.to_string());
        }

        Err(last_error.unwrap_or(LlmError::Exhausted {
            attempts: MAX_RETRIES,
        }))
    }

    /// Calls the LLM requesting JSON conforming to `schema` and parses the
    /// response. The schema is embedded in the system instruction; models
    /// that wrap the JSON in markdown fences are cleaned up before parsing.
    pub async fn generate_structured(
        &self,
        prompt: &str,
        system: &str,
        schema: &Value,
        temperature: f32,
    ) -> Result<Value, LlmError> {
        let schema_text =
            serde_json::to_string(schema).map_err(|e| LlmError::Parse(e.to_string()))?;
        let structured_system = format!(
            "{}\n\nRespond ONLY with valid JSON conforming to this JSON schema, \
             with no surrounding prose:\n{}",
            system, schema_text
        );

        let text = self.generate(prompt, &structured_system, temperature).await?;
        let cleaned = strip_json_fences(&text);

        serde_json::from_str(cleaned).map_err(|e| LlmError::Parse(e.to_string()))
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"requirements\": []}\n```";
        assert_eq!(strip_json_fences(input), "{\"requirements\": []}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"requirements\": []}\n```";
        assert_eq!(strip_json_fences(input), "{\"requirements\": []}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"requirements\": []}";
        assert_eq!(strip_json_fences(input), "{\"requirements\": []}");
    }
}
