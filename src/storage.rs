//! Storage for uploaded multimedia. Only the returned relative path is kept in
//! the database.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("empty upload")]
    Empty,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persists `bytes` and returns the reference to store in `multimedia.file_path`.
    async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, StorageError>;
}

/// Writes uploads to `<root>/multimedia/<uuid>.<ext>`.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStore for DiskStore {
    async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }

        let relative = generated_path(original_name);
        let full = self.root.join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;

        tracing::debug!("Stored upload {} ({} bytes)", relative, bytes.len());
        Ok(relative)
    }
}

/// `multimedia/<uuid>[.<ext>]`, keeping only a short alphanumeric extension
/// from the client-supplied name.
pub fn generated_path(original_name: &str) -> String {
    let ext = Path::new(original_name)
        .components()
        .last()
        .and_then(|c| match c {
            Component::Normal(name) => Path::new(name).extension(),
            _ => None,
        })
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());

    match ext {
        Some(ext) => format!("multimedia/{}.{}", Uuid::new_v4(), ext),
        None => format!("multimedia/{}", Uuid::new_v4()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_path_keeps_a_safe_extension() {
        let path = generated_path("foto bache.JPG");
        assert!(path.starts_with("multimedia/"));
        assert!(path.ends_with(".jpg"));
    }

    #[test]
    fn generated_path_drops_suspicious_extensions() {
        assert!(!generated_path("../../etc/passwd").contains(".."));
        let path = generated_path("audio.m4a;rm -rf");
        assert_eq!(path.matches('.').count(), 0);
    }

    #[tokio::test]
    async fn disk_store_writes_under_root() {
        let root = std::env::temp_dir().join(format!("media-test-{}", Uuid::new_v4()));
        let store = DiskStore::new(&root);

        let relative = store.save("clip.mp4", b"data").await.unwrap();
        let written = tokio::fs::read(root.join(&relative)).await.unwrap();
        assert_eq!(written, b"data");

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let store = DiskStore::new(std::env::temp_dir());
        assert!(matches!(store.save("x.png", b"").await, Err(StorageError::Empty)));
    }
}
