// src/services/openai.rs
//! Language Analysis Gateway
//!
//! Wraps the OpenAI Chat Completions API. One request per call, output
//! constrained to the fixed word/phrase JSON schema. No automatic retries:
//! a transient provider failure surfaces to the caller for manual
//! re-submission.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, error, info};

use crate::capture::models::CaptureResult;
use crate::common::ValidationResult;

const DEFAULT_MODEL: &str = "gpt-4.1-2025-04-14";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, thiserror::Error)]
pub enum OpenAiError {
    #[error("API key not configured")]
    NotConfigured,

    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub organization: Option<String>,
    pub base_url: String,
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            organization: env::var("OPENAI_ORGANIZATION").ok(),
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        }
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.api_key.is_empty() {
            result.add_error("api_key", "API key is required");
        }
        if self.model.is_empty() {
            result.add_error("model", "Model is required");
        }

        result
    }
}

// ============================================================================
// Chat Completions wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct OpenAiStatus {
    pub status: String,
    pub message: String,
    pub timestamp: String,
}

// ============================================================================
// Service
// ============================================================================

/// OpenAI gateway. Constructed once at startup and shared via `AppState`.
#[derive(Debug)]
pub struct OpenAiService {
    config: OpenAiConfig,
    client: Client,
}

/// Seam for the capture pipeline, so tests can substitute a fake analyzer
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Segment `text` into learner words/phrases with English translations.
    /// `Ok(None)` means the provider returned no choices - an empty result,
    /// not an error.
    async fn process_text(
        &self,
        text: &str,
        language: &str,
    ) -> Result<Option<CaptureResult>, OpenAiError>;
}

impl OpenAiService {
    pub fn new(config: OpenAiConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub fn get_status(&self) -> OpenAiStatus {
        let validation = self.config.validate();
        let (status, message) = if validation.is_valid {
            (
                "healthy".to_string(),
                "OpenAI service is operational".to_string(),
            )
        } else {
            (
                "error".to_string(),
                format!(
                    "Configuration validation failed: {}",
                    validation.into_message()
                ),
            )
        };

        OpenAiStatus {
            status,
            message,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[async_trait]
impl TextAnalyzer for OpenAiService {
    async fn process_text(
        &self,
        text: &str,
        language: &str,
    ) -> Result<Option<CaptureResult>, OpenAiError> {
        if self.config.api_key.is_empty() {
            return Err(OpenAiError::NotConfigured);
        }

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: build_prompt(text, language),
            }],
            temperature: 0.2,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: "WordCaptureResponse".to_string(),
                    schema: capture_schema(),
                },
            },
        };

        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        debug!(
            model = %self.config.model,
            language = %language,
            text_len = text.len(),
            "Sending OpenAI text analysis request"
        );

        let mut builder = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request);

        if let Some(organization) = &self.config.organization {
            builder = builder.header("OpenAI-Organization", organization);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| OpenAiError::RequestFailed(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(OpenAiError::RateLimitExceeded);
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "OpenAI API request failed");
            return Err(OpenAiError::RequestFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| OpenAiError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = &completion.usage {
            info!(
                model = %self.config.model,
                tokens_used = usage.total_tokens,
                "OpenAI text analysis completed"
            );
        }

        parse_completion(completion)
    }
}

impl From<OpenAiError> for crate::common::ApiError {
    fn from(err: OpenAiError) -> Self {
        match err {
            OpenAiError::NotConfigured => {
                crate::common::ApiError::Configuration(err.to_string())
            }
            _ => crate::common::ApiError::Provider(err.to_string()),
        }
    }
}

/// Extract and parse the schema-constrained JSON content. Empty `choices`
/// is an empty result; malformed JSON is fatal rather than silently
/// defaulting to empty lists.
fn parse_completion(
    completion: ChatCompletionResponse,
) -> Result<Option<CaptureResult>, OpenAiError> {
    let choice = match completion.choices.first() {
        Some(c) => c,
        None => return Ok(None),
    };

    let result: CaptureResult = serde_json::from_str(&choice.message.content)
        .map_err(|e| OpenAiError::InvalidResponse(e.to_string()))?;

    Ok(Some(result))
}

fn build_prompt(text: &str, language: &str) -> String {
    format!(
        r#"You are a linguist. Analyze the following {language} text:
"{text}"
Split it into useful phrases and words for a learner.
Return:
- A list of unique single words that appear in the text.
- A list of useful multi-word phrases that are meaningful for learners. Include full sentences as well as shorter phrases if they are meaningful.
- For each word or phrase, return a translation into English.
- Avoid duplicates.
- Do not include names, places, or numbers unless they are linguistically relevant.

Only use information from the input text.
Translate accurately and concisely.
Return the response in JSON format."#
    )
}

/// Fixed output schema: words[] and phrases[], each {text, translation[]}
fn capture_schema() -> serde_json::Value {
    let word_phrase = serde_json::json!({
        "type": "object",
        "properties": {
            "text": { "type": "string" },
            "translation": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["text", "translation"]
    });

    serde_json::json!({
        "type": "object",
        "properties": {
            "words": { "type": "array", "items": word_phrase },
            "phrases": { "type": "array", "items": word_phrase }
        },
        "required": ["words", "phrases"]
    })
}
