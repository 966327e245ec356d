//! Object storage collaborator for raw document content.
//!
//! The orchestrator only ever holds storage keys, never the bytes. The
//! filesystem implementation stores content-addressed files under a
//! two-level hash-prefix layout for filesystem efficiency:
//! `{objects_dir}/{hash[0..2]}/{hash[0..8]}.{extension}`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Key→bytes object store owned by the external storage collaborator.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, content: &[u8]) -> anyhow::Result<()>;
    async fn get_object(&self, key: &str) -> anyhow::Result<Vec<u8>>;
    async fn object_exists(&self, key: &str) -> anyhow::Result<bool>;
}

/// Compute the SHA-256 hash of content, hex-encoded.
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Content-addressed key for uploaded bytes:
/// `{hash[0..2]}/{hash[0..8]}.{extension}`.
pub fn content_key(content: &[u8], extension: &str) -> String {
    let hash = compute_hash(content);
    format!("{}/{}.{}", &hash[..2], &hash[..8], extension)
}

/// Filesystem-backed object store rooted at a directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, key: &str, content: &[u8]) -> anyhow::Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path_for(key)).await?)
    }

    async fn object_exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}

/// Extension for a stored object, derived from the original filename.
pub fn extension_for(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_layout() {
        let key = content_key(b"Hello, World!", "pdf");
        // two-level prefix plus short hash
        let (dir, file) = key.split_once('/').unwrap();
        assert_eq!(dir.len(), 2);
        assert!(file.ends_with(".pdf"));
        assert!(file.starts_with(dir));
    }

    #[test]
    fn test_compute_hash_is_sha256_hex() {
        assert_eq!(compute_hash(b"x").len(), 64);
    }

    #[tokio::test]
    async fn test_fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let key = content_key(b"report body", "txt");
        assert!(!store.object_exists(&key).await.unwrap());

        store.put_object(&key, b"report body").await.unwrap();
        assert!(store.object_exists(&key).await.unwrap());
        assert_eq!(store.get_object(&key).await.unwrap(), b"report body");
    }
}
