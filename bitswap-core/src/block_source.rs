//! Block lookup backends
//!
//! The responder never touches storage directly. It asks a [`BlockSource`]
//! for content or existence by storage key (see
//! [`crate::cid_util::cid_to_key`]), so CIDs that only differ in version or
//! codec resolve to the same block.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cid_util::{cid_to_key, sha256_cid};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Invalid block key: {0}")]
    InvalidKey(String),

    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Read access to locally held blocks.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Load block content. `None` when the block is not held.
    async fn fetch(&self, key: &str) -> Result<Option<Bytes>, SourceError>;

    /// Whether the block is held, without loading it.
    async fn query(&self, key: &str) -> Result<bool, SourceError>;
}

/// Statistics about a block source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub block_count: usize,
    pub total_size: usize,
}

/// In-memory block source keyed by storage key
#[derive(Default)]
pub struct MemoryBlockSource {
    blocks: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw data under its CIDv1 (raw, sha2-256) and return that CID.
    pub async fn insert(&self, data: impl Into<Bytes>) -> Result<Cid, SourceError> {
        let data = data.into();
        let cid = sha256_cid(&data).map_err(|e| SourceError::InvalidBlock(e.to_string()))?;
        self.insert_with_cid(&cid, data).await;
        Ok(cid)
    }

    /// Store data under the key of an externally computed CID.
    pub async fn insert_with_cid(&self, cid: &Cid, data: impl Into<Bytes>) {
        let key = cid_to_key(cid);
        let data = data.into();
        debug!("Holding block {} ({} bytes)", key, data.len());
        self.blocks.write().await.insert(key, data);
    }

    pub async fn remove(&self, cid: &Cid) -> bool {
        self.blocks.write().await.remove(&cid_to_key(cid)).is_some()
    }

    pub async fn stats(&self) -> SourceStats {
        let blocks = self.blocks.read().await;
        SourceStats {
            block_count: blocks.len(),
            total_size: blocks.values().map(|b| b.len()).sum(),
        }
    }
}

#[async_trait]
impl BlockSource for MemoryBlockSource {
    async fn fetch(&self, key: &str) -> Result<Option<Bytes>, SourceError> {
        Ok(self.blocks.read().await.get(key).cloned())
    }

    async fn query(&self, key: &str) -> Result<bool, SourceError> {
        Ok(self.blocks.read().await.contains_key(key))
    }
}

/// Directory-backed block source: one file per storage key.
pub struct FsBlockSource {
    root: PathBuf,
}

impl FsBlockSource {
    /// Open `root`, creating it if missing.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self, SourceError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        info!("Opened block directory at {:?}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SourceError> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SourceError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    /// Store raw data under its CIDv1 (raw, sha2-256) and return that CID.
    pub async fn put(&self, data: &[u8]) -> Result<Cid, SourceError> {
        let cid = sha256_cid(data).map_err(|e| SourceError::InvalidBlock(e.to_string()))?;
        self.put_with_cid(&cid, data).await?;
        Ok(cid)
    }

    pub async fn put_with_cid(&self, cid: &Cid, data: &[u8]) -> Result<(), SourceError> {
        let key = cid_to_key(cid);
        let path = self.path_for(&key)?;
        tokio::fs::write(&path, data).await?;
        debug!("Stored block {} ({} bytes)", key, data.len());
        Ok(())
    }

    pub async fn stats(&self) -> Result<SourceStats, SourceError> {
        let mut stats = SourceStats::default();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                stats.block_count += 1;
                stats.total_size += metadata.len() as usize;
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl BlockSource for FsBlockSource {
    async fn fetch(&self, key: &str) -> Result<Option<Bytes>, SourceError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn query(&self, key: &str) -> Result<bool, SourceError> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_memory_insert_fetch() {
        let source = MemoryBlockSource::new();
        let cid = source.insert(&b"hello world"[..]).await.unwrap();

        assert_eq!(cid.codec(), crate::cid_util::RAW_CODEC);
        let key = cid_to_key(&cid);
        assert_eq!(
            source.fetch(&key).await.unwrap(),
            Some(Bytes::from_static(b"hello world"))
        );
        assert!(source.query(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_missing() {
        let source = MemoryBlockSource::new();
        assert_eq!(source.fetch("zmissing").await.unwrap(), None);
        assert!(!source.query("zmissing").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_key_ignores_version() {
        let source = MemoryBlockSource::new();
        let v1 =
            Cid::from_str("bafybeiccfclkdtucu6y4yc5cpr6y3yuinr67svmii46v5cfcrkp47ihehy").unwrap();
        source.insert_with_cid(&v1, &b"node"[..]).await;

        let v0 = Cid::from_str("QmSnuWmxptJZdLJpKRarxBMS2Ju2oANVrgbr2xWbie9b2D").unwrap();
        assert!(source.query(&cid_to_key(&v0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_stats_and_remove() {
        let source = MemoryBlockSource::new();
        assert_eq!(source.stats().await, SourceStats::default());

        let a = source.insert(vec![1u8; 100]).await.unwrap();
        source.insert(vec![2u8; 200]).await.unwrap();
        source.insert(vec![2u8; 200]).await.unwrap();

        let stats = source.stats().await;
        assert_eq!(stats.block_count, 2);
        assert_eq!(stats.total_size, 300);

        assert!(source.remove(&a).await);
        assert!(!source.remove(&a).await);
        assert_eq!(source.stats().await.block_count, 1);
    }

    #[tokio::test]
    async fn test_fs_put_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsBlockSource::open(dir.path().join("blocks")).await.unwrap();

        let cid = source.put(b"on disk").await.unwrap();
        let key = cid_to_key(&cid);
        assert!(source.root().join(&key).is_file());

        assert_eq!(
            source.fetch(&key).await.unwrap(),
            Some(Bytes::from_static(b"on disk"))
        );
        assert!(source.query(&key).await.unwrap());
        assert_eq!(source.fetch("zQmNotThere").await.unwrap(), None);
        assert!(!source.query("zQmNotThere").await.unwrap());

        let stats = source.stats().await.unwrap();
        assert_eq!(stats.block_count, 1);
        assert_eq!(stats.total_size, 7);
    }

    #[tokio::test]
    async fn test_fs_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsBlockSource::open(dir.path()).await.unwrap();

        for key in ["", "..", "../etc/passwd", "a/b"] {
            assert!(matches!(
                source.fetch(key).await,
                Err(SourceError::InvalidKey(_))
            ));
        }
    }
}
