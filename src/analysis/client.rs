//! Generative AI service client
//!
//! `GenerativeModel` is the seam between the analysis pipeline and the
//! external service. `GeminiClient` talks to the Generative Language REST
//! API (`models/{model}:generateContent` and `models/{model}:embedContent`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::AnalysisError;
use crate::config::AiConfig;

/// Base64-encoded image sent inline with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// Operations the analysis pipeline needs from the model provider
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Ask a question about an image; returns the model's text answer
    async fn generate(&self, prompt: &str, image: &InlineImage) -> Result<String, AnalysisError>;

    /// Embed an image directly
    async fn embed_image(&self, image: &InlineImage) -> Result<Vec<f32>, AnalysisError>;

    /// Embed a piece of text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, AnalysisError>;
}

pub struct GeminiClient {
    http: reqwest::Client,
    config: AiConfig,
}

impl GeminiClient {
    pub fn new(config: AiConfig) -> Result<Self, AnalysisError> {
        if !config.is_enabled() {
            return Err(AnalysisError::Disabled);
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("atelier/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AnalysisError::Service(format!("HTTP client error: {}", e)))?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            model,
            method
        )
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, AnalysisError> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AnalysisError::Service(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Service(format!(
                "HTTP {}: {}",
                status,
                truncate(&detail, 300)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AnalysisError::InvalidResponse(format!("Bad JSON from model service: {}", e)))
    }

    async fn embed(&self, model: &str, part: Value) -> Result<Vec<f32>, AnalysisError> {
        let body = json!({
            "model": format!("models/{}", model),
            "content": { "parts": [part] }
        });
        let value = self.post(&self.endpoint(model, "embedContent"), &body).await?;
        let parsed: EmbedResponse = serde_json::from_value(value)
            .map_err(|e| AnalysisError::InvalidResponse(format!("Unexpected embedding response: {}", e)))?;

        if parsed.embedding.values.is_empty() {
            return Err(AnalysisError::InvalidResponse("Empty embedding".into()));
        }
        Ok(parsed.embedding.values)
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Value>,
}

fn inline_part(image: &InlineImage) -> Value {
    json!({
        "inline_data": {
            "mime_type": image.mime_type,
            "data": image.data,
        }
    })
}

/// Concatenated text parts of the first candidate
fn candidate_text(value: Value) -> Result<String, AnalysisError> {
    let parsed: GenerateResponse = serde_json::from_value(value)
        .map_err(|e| AnalysisError::InvalidResponse(format!("Unexpected response: {}", e)))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnalysisError::InvalidResponse("Model returned no text".into()));
    }
    Ok(text)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str, image: &InlineImage) -> Result<String, AnalysisError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }, inline_part(image)]
            }],
            "generationConfig": { "temperature": 0.2 }
        });
        let value = self
            .post(
                &self.endpoint(&self.config.generation_model, "generateContent"),
                &body,
            )
            .await?;
        candidate_text(value)
    }

    async fn embed_image(&self, image: &InlineImage) -> Result<Vec<f32>, AnalysisError> {
        self.embed(&self.config.multimodal_embedding_model, inline_part(image))
            .await
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, AnalysisError> {
        self.embed(&self.config.text_embedding_model, json!({ "text": text }))
            .await
    }
}
