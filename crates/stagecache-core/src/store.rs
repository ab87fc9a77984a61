//! Durable artifact storage.
//!
//! Publishing is lock-free: an artifact is written to a uniquely named temp
//! file in its namespace directory, synced, then hard-linked under its final
//! name. The link fails if the name exists, so the first writer wins and a
//! reader sees either nothing or a complete artifact.
//!
//! # Layout
//!
//! ```text
//! {root}/{namespace}/
//!   pipeline.json    # prefix stage identities
//!   0.json           # artifact for index 0
//!   1.json
//!   ...
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatasetResult;
use crate::fingerprint::Fingerprint;

#[path = "store_next/mod.rs"]
mod store_next;

/// Key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub namespace: String,
    pub index: usize,
}

impl ArtifactKey {
    pub fn new(namespace: impl Into<String>, index: usize) -> Self {
        Self {
            namespace: namespace.into(),
            index,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.index)
    }
}

/// Durable storage seam used by the dataset.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn exists(&self, key: &ArtifactKey) -> DatasetResult<bool>;

    /// Stored bytes, or `None` when absent.
    async fn read(&self, key: &ArtifactKey) -> DatasetResult<Option<Vec<u8>>>;

    /// Publish `bytes` unless the key already holds an artifact.
    ///
    /// Returns `true` when this call published.
    async fn write_if_absent(&self, key: &ArtifactKey, bytes: &[u8]) -> DatasetResult<bool>;

    /// Record the pipeline a namespace belongs to. Optional for backends.
    async fn register(&self, _fingerprint: &Fingerprint) -> DatasetResult<()> {
        Ok(())
    }
}

/// Stage identities of a namespace, stored next to its artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineManifest {
    pub namespace: String,
    pub fingerprint: String,
    pub stages: Vec<String>,
    pub format: u32,
    pub created_at: DateTime<Utc>,
}

/// Summary of one namespace directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub namespace: String,
    pub entries: usize,
    #[serde(default)]
    pub manifest: Option<PipelineManifest>,
}

/// Result of an integrity scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyReport {
    pub namespace: String,
    pub checked: usize,
    pub corrupt: Vec<usize>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty()
    }
}

/// Filesystem artifact store.
#[derive(Debug, Clone)]
pub struct DiskStore {
    /// Base cache directory.
    root: PathBuf,
}

impl DiskStore {
    /// Create a store at the default location.
    pub fn new() -> DatasetResult<Self> {
        let root = crate::config::default_cache_dir()?;
        Ok(Self { root })
    }

    /// Create a store rooted at a custom directory.
    pub fn with_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> DatasetResult<PathBuf> {
        store_next::keys::validate_namespace(namespace)?;
        Ok(store_next::keys::namespace_dir_impl(&self.root, namespace))
    }

    fn artifact_path(&self, key: &ArtifactKey) -> DatasetResult<PathBuf> {
        store_next::keys::validate_namespace(&key.namespace)?;
        Ok(store_next::keys::artifact_path_impl(&self.root, key))
    }

    /// Manifest of a namespace, if one was written.
    pub async fn manifest(&self, namespace: &str) -> Option<PipelineManifest> {
        store_next::read::manifest_impl(self, namespace).await
    }

    /// Indices stored under a namespace, ascending.
    pub async fn list(&self, namespace: &str) -> DatasetResult<Vec<usize>> {
        store_next::read::list_impl(self, namespace).await
    }

    /// All namespaces with entry counts.
    pub async fn list_namespaces(&self) -> DatasetResult<Vec<NamespaceInfo>> {
        store_next::read::list_namespaces_impl(self).await
    }

    /// Re-check every artifact of a namespace.
    pub async fn verify(&self, namespace: &str) -> DatasetResult<VerifyReport> {
        store_next::read::verify_impl(self, namespace).await
    }

    /// Remove one artifact. Returns `false` when it was not present.
    pub async fn evict(&self, key: &ArtifactKey) -> DatasetResult<bool> {
        store_next::evict::evict_impl(self, key).await
    }

    /// Remove a namespace with all its artifacts.
    pub async fn evict_namespace(&self, namespace: &str) -> DatasetResult<()> {
        store_next::evict::evict_namespace_impl(self, namespace).await
    }

    /// Remove everything under the root.
    pub async fn clear(&self) -> DatasetResult<()> {
        store_next::evict::clear_impl(self).await
    }
}

#[async_trait]
impl ArtifactStore for DiskStore {
    async fn exists(&self, key: &ArtifactKey) -> DatasetResult<bool> {
        store_next::read::exists_impl(self, key).await
    }

    async fn read(&self, key: &ArtifactKey) -> DatasetResult<Option<Vec<u8>>> {
        store_next::read::read_impl(self, key).await
    }

    async fn write_if_absent(&self, key: &ArtifactKey, bytes: &[u8]) -> DatasetResult<bool> {
        store_next::put::put_impl(self, key, bytes).await
    }

    async fn register(&self, fingerprint: &Fingerprint) -> DatasetResult<()> {
        store_next::put::write_manifest_impl(self, fingerprint).await
    }
}
