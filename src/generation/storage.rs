use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{GeneratedImage, ImageStore, extension_for, mime_for};

/// Url prefix the server mounts the media directory under.
pub const MEDIA_PREFIX: &str = "/media";

/// Stores generated images as files in one flat directory.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    dir: PathBuf,
}

impl FsImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a url under `/media`, or `None` for anything else.
    fn file_name_for(url: &str) -> Option<&str> {
        let name = url.strip_prefix(MEDIA_PREFIX)?.strip_prefix('/')?;
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !name.starts_with('.');
        valid.then_some(name)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn put(&self, image: &GeneratedImage) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create media directory {}", self.dir.display()))?;
        let name = format!(
            "{}.{}",
            uuid::Uuid::new_v4(),
            extension_for(&image.mime_type)
        );
        let path = self.dir.join(&name);
        tokio::fs::write(&path, &image.bytes)
            .await
            .with_context(|| format!("Failed to write image {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = image.bytes.len(), "Stored generated image");
        Ok(format!("{}/{}", MEDIA_PREFIX, name))
    }

    async fn load(&self, url: &str) -> Result<Option<GeneratedImage>> {
        let Some(name) = Self::file_name_for(url) else {
            return Ok(None);
        };
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let extension = name.rsplit('.').next().unwrap_or_default();
                Ok(Some(GeneratedImage {
                    bytes,
                    mime_type: mime_for(extension).to_string(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read image {}", path.display())),
        }
    }

    async fn delete(&self, url: &str) -> Result<bool> {
        let Some(name) = Self::file_name_for(url) else {
            return Ok(false);
        };
        let path = self.dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed stored image");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove image {}", path.display())),
        }
    }
}
