//! Gemini REST client for image generation and text embeddings.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{EmbeddingProvider, GeneratedImage, GenerationPrompt, ImageGenerator};
use crate::errors::GenerationError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
    image_model: String,
    embedding_model: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Embedding,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    content: serde_json::Value,
    #[serde(rename = "taskType")]
    task_type: &'a str,
}

impl GeminiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(api_key: String) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::NotConfigured);
        }
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("deckforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::Api(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_models(mut self, image_model: Option<String>, embedding_model: Option<String>) -> Self {
        if let Some(model) = image_model {
            self.image_model = model;
        }
        if let Some(model) = embedding_model {
            self.embedding_model = model;
        }
        self
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &impl Serialize,
    ) -> Result<T, GenerationError> {
        let res = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Api(format!("request failed: {}", e)))?;

        match res.status() {
            s if s.is_success() => res
                .json::<T>()
                .await
                .map_err(|e| GenerationError::Api(format!("invalid response body: {}", e))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(GenerationError::Api("API key was rejected".to_string()))
            }
            s => {
                let body = res.text().await.unwrap_or_default();
                Err(GenerationError::Api(format!("http {}: {}", s.as_u16(), body)))
            }
        }
    }
}

/// Text sent alongside the optional source image.
pub fn prompt_text(prompt: &GenerationPrompt) -> String {
    let mut text = prompt.prompt.trim().to_string();
    if prompt.source.is_some() {
        text = format!("Redraw the attached card art. {}", text);
    }
    format!("{}\n\nArt style: {}", text, prompt.style.trim())
}

fn request_body(prompt: &GenerationPrompt) -> serde_json::Value {
    let mut parts = vec![json!({ "text": prompt_text(prompt) })];
    if let Some(source) = &prompt.source {
        parts.push(json!({
            "inlineData": {
                "mimeType": source.mime_type,
                "data": STANDARD.encode(&source.bytes),
            }
        }));
    }
    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": { "responseModalities": ["IMAGE"] },
    })
}

/// First inline image in a `generateContent` response.
fn first_image(response: GenerateResponse) -> Result<GeneratedImage, GenerationError> {
    let inline = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data)
        .ok_or(GenerationError::EmptyResponse)?;
    let bytes = STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| GenerationError::Api(format!("image data is not base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(GeneratedImage {
        bytes,
        mime_type: inline.mime_type,
    })
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<GeneratedImage, GenerationError> {
        let url = self.endpoint(&self.image_model, "generateContent");
        tracing::debug!(model = %self.image_model, style = %prompt.style, "Requesting image generation");
        let response: GenerateResponse = self.post_json(&url, &request_body(prompt)).await?;
        first_image(response)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError> {
        let url = self.endpoint(&self.embedding_model, "embedContent");
        let body = EmbedRequest {
            content: json!({ "parts": [{ "text": text }] }),
            task_type: "SEMANTIC_SIMILARITY",
        };
        let response: EmbedResponse = self.post_json(&url, &body).await?;
        if response.embedding.values.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(response.embedding.values)
    }
}
