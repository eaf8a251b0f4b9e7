//! AI image generation behind trait seams.
//!
//! `ImageService` is the only caller. It consults the gallery family before
//! touching the generator, so the traits here see only real cache misses.

pub mod gemini;
pub mod service;
pub mod storage;

use anyhow::Result;
use async_trait::async_trait;

use crate::errors::GenerationError;

pub use gemini::GeminiClient;
pub use service::{GenerateOutcome, GenerateRequest, ImageService};
pub use storage::FsImageStore;

/// Raw image bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct GenerationPrompt {
    pub prompt: String,
    pub style: String,
    /// Public url of the art being restyled, if any.
    pub source_url: Option<String>,
    /// Bytes of that art when the store could load them.
    pub source: Option<GeneratedImage>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &GenerationPrompt) -> Result<GeneratedImage, GenerationError>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GenerationError>;
}

/// Persists generated bytes and hands back the url they are served from.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn put(&self, image: &GeneratedImage) -> Result<String>;
    /// Load a previously stored image by its public url. `None` for urls this
    /// store does not own.
    async fn load(&self, url: &str) -> Result<Option<GeneratedImage>>;
    /// Remove a stored image. `false` when the url is not ours or is gone.
    async fn delete(&self, url: &str) -> Result<bool>;
}

/// File extension for a stored image of this MIME type.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

pub fn mime_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("application/octet-stream"), "png");
        assert_eq!(mime_for(extension_for("image/webp")), "image/webp");
    }
}
