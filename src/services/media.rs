//! Product image uploads.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::domain::seo::slug_or;

/// Upload size cap; product photos are resized client-side before upload.
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Unsupported content type {0}")]
    UnsupportedType(String),
    #[error("Image is larger than {} bytes", MAX_IMAGE_BYTES)]
    TooLarge,
    #[error("Image is empty")]
    Empty,
    #[error("Could not store image: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait MediaStore: Send + Sync + 'static {
    /// Stores the file and returns its public URL.
    async fn upload(&self, file_name: &str, content_type: &str, bytes: &[u8]) -> Result<String, MediaError>;
}

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Writes uploads to a directory served under `base_url`.
pub struct LocalMediaStore {
    root: PathBuf,
    base_url: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self { root: root.into(), base_url: base_url.into().trim_end_matches('/').to_string() }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn upload(&self, file_name: &str, content_type: &str, bytes: &[u8]) -> Result<String, MediaError> {
        let ext = extension_for(content_type).ok_or_else(|| MediaError::UnsupportedType(content_type.to_string()))?;
        if bytes.is_empty() { return Err(MediaError::Empty); }
        if bytes.len() > MAX_IMAGE_BYTES { return Err(MediaError::TooLarge); }

        let stem = file_name.rsplit_once('.').map_or(file_name, |(stem, _)| stem);
        let name = format!("{}-{}.{ext}", Uuid::new_v4().simple(), slug_or(stem, "gorsel"));
        let dir = self.root.join("products");
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), bytes).await?;
        info!(%name, size = bytes.len(), "stored product image");
        Ok(format!("{}/products/{name}", self.base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf { std::env::temp_dir().join(format!("perde-media-{}", Uuid::new_v4())) }

    #[tokio::test]
    async fn test_upload_writes_file() {
        let root = temp_root();
        let store = LocalMediaStore::new(&root, "https://cdn.test/media/");
        let url = store.upload("Şönil Fon.JPG", "image/jpeg", b"\xff\xd8\xff").await.unwrap();
        assert!(url.starts_with("https://cdn.test/media/products/"));
        assert!(url.ends_with("-sonil-fon.jpg"));
        let name = url.rsplit('/').next().unwrap();
        assert_eq!(tokio::fs::read(root.join("products").join(name)).await.unwrap(), b"\xff\xd8\xff");
        let _ = tokio::fs::remove_dir_all(root).await;
    }

    #[tokio::test]
    async fn test_rejects_non_images() {
        let store = LocalMediaStore::new(temp_root(), "/media");
        assert!(matches!(store.upload("a.pdf", "application/pdf", b"%PDF").await, Err(MediaError::UnsupportedType(_))));
        assert!(matches!(store.upload("a.png", "image/png", b"").await, Err(MediaError::Empty)));
    }
}
