//! Eviction/cleanup.

use std::io::ErrorKind;

use tokio::fs;
use tracing::debug;

use crate::error::{DatasetError, DatasetResult};

use super::super::{ArtifactKey, DiskStore};

pub(crate) async fn evict_impl(store: &DiskStore, key: &ArtifactKey) -> DatasetResult<bool> {
    match fs::remove_file(store.artifact_path(key)?).await {
        Ok(()) => {
            debug!(key = %key, "evicted artifact");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DatasetError::storage("failed to evict artifact", e)),
    }
}

pub(crate) async fn evict_namespace_impl(store: &DiskStore, namespace: &str) -> DatasetResult<()> {
    let dir = store.namespace_dir(namespace)?;

    if dir.exists() {
        fs::remove_dir_all(&dir)
            .await
            .map_err(|e| DatasetError::storage("failed to evict namespace", e))?;
        debug!(namespace, "evicted namespace");
    }
    Ok(())
}

pub(crate) async fn clear_impl(store: &DiskStore) -> DatasetResult<()> {
    if store.root.exists() {
        fs::remove_dir_all(&store.root)
            .await
            .map_err(|e| DatasetError::storage("failed to clear cache", e))?;
        debug!(root = %store.root.display(), "cleared artifact cache");
    }
    Ok(())
}
