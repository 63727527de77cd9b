//! Scoring client
//!
//! One call in, one parsed JSON value (or one error) out. No retries and no
//! look inside the payload: retry policy belongs to the run controller and
//! semantic checks to the validator.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use shorts_common::config::EvaluatorConfig;
use shorts_common::{Audience, Category};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Scoring client errors
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// External scoring capability
#[async_trait]
pub trait ScoringClient: Send + Sync {
    /// Submit one prompt and return the model's answer parsed as JSON
    async fn score(&self, prompt: &str) -> Result<Value, ScoringError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// JSON schema the model is asked to follow
pub fn response_schema() -> Value {
    let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
    let audiences: Vec<&str> = Audience::ALL.iter().map(Audience::as_str).collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "evaluations": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "reddit_id": { "type": "STRING" },
                        "score": { "type": "INTEGER" },
                        "category": { "type": "STRING", "enum": categories },
                        "target_audience": { "type": "STRING", "enum": audiences }
                    },
                    "required": ["reddit_id", "score", "category", "target_audience"]
                }
            }
        },
        "required": ["evaluations"]
    })
}

/// Pull the answer text out of a `generateContent` response body
fn extract_text(body: &str) -> Result<String, ScoringError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| ScoringError::ParseError(e.to_string()))?;

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        let feedback = response
            .prompt_feedback
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no candidates".to_string());
        ScoringError::EmptyResponse(feedback)
    })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ScoringError::EmptyResponse(format!(
            "finish reason {}",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

/// Parse the model's text as JSON, tolerating a markdown code fence
fn parse_answer(text: &str) -> Result<Value, ScoringError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced.trim()).map_err(|e| ScoringError::ParseError(e.to_string()))
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn new(config: &EvaluatorConfig, api_key: String) -> Result<Self, ScoringError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ScoringError::NetworkError(e.to_string()))?;

        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            http_client,
            endpoint,
            api_key,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": response_schema(),
                "temperature": self.temperature
            }
        })
    }
}

#[async_trait]
impl ScoringClient for GeminiClient {
    async fn score(&self, prompt: &str) -> Result<Value, ScoringError> {
        let start = Instant::now();
        debug!("Scoring call starting - prompt_length={} chars", prompt.len());

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| ScoringError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ScoringError::ApiError(status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScoringError::NetworkError(e.to_string()))?;

        let text = extract_text(&body)?;
        let value = parse_answer(&text)?;

        let elapsed: Duration = start.elapsed();
        info!(
            "Scoring call completed - duration={:.2}s, response_length={} chars",
            elapsed.as_secs_f32(),
            text.len()
        );

        Ok(value)
    }
}
