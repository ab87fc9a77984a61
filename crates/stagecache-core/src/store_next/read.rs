//! Read path and directory scans.

use std::io::ErrorKind;

use tokio::fs;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{DatasetError, DatasetResult};

use super::super::{ArtifactKey, DiskStore, NamespaceInfo, PipelineManifest, VerifyReport};
use super::keys;

pub(crate) async fn exists_impl(store: &DiskStore, key: &ArtifactKey) -> DatasetResult<bool> {
    fs::try_exists(store.artifact_path(key)?)
        .await
        .map_err(|e| DatasetError::storage("failed to stat artifact", e))
}

pub(crate) async fn read_impl(
    store: &DiskStore,
    key: &ArtifactKey,
) -> DatasetResult<Option<Vec<u8>>> {
    match fs::read(store.artifact_path(key)?).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(key = %key, "artifact not in store");
            Ok(None)
        }
        Err(e) => Err(DatasetError::storage("failed to read artifact", e)),
    }
}

pub(crate) async fn manifest_impl(store: &DiskStore, namespace: &str) -> Option<PipelineManifest> {
    let path = store.namespace_dir(namespace).ok()?.join(keys::MANIFEST_FILE);

    let content = fs::read(&path).await.ok()?;
    serde_json::from_slice(&content).ok()
}

pub(crate) async fn list_impl(store: &DiskStore, namespace: &str) -> DatasetResult<Vec<usize>> {
    let dir = store.namespace_dir(namespace)?;
    let mut indices = Vec::new();

    if !dir.exists() {
        return Ok(indices);
    }

    let mut entries = fs::read_dir(&dir)
        .await
        .map_err(|e| DatasetError::storage("failed to read namespace directory", e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DatasetError::storage("failed to read directory entry", e))?
    {
        let name = entry.file_name();
        if let Some(index) = keys::index_from_file_name(&name.to_string_lossy()) {
            indices.push(index);
        }
    }

    indices.sort_unstable();
    Ok(indices)
}

pub(crate) async fn list_namespaces_impl(store: &DiskStore) -> DatasetResult<Vec<NamespaceInfo>> {
    let mut result = Vec::new();

    if !store.root.exists() {
        return Ok(result);
    }

    let mut entries = fs::read_dir(&store.root)
        .await
        .map_err(|e| DatasetError::storage("failed to read cache directory", e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DatasetError::storage("failed to read directory entry", e))?
    {
        if !entry.path().is_dir() {
            continue;
        }
        let namespace = entry.file_name().to_string_lossy().to_string();
        // Foreign directories under the root are not namespaces.
        if keys::validate_namespace(&namespace).is_err() {
            continue;
        }
        let entries = list_impl(store, &namespace).await?.len();
        let manifest = manifest_impl(store, &namespace).await;

        result.push(NamespaceInfo {
            namespace,
            entries,
            manifest,
        });
    }

    result.sort_by(|a, b| a.namespace.cmp(&b.namespace));
    Ok(result)
}

pub(crate) async fn verify_impl(store: &DiskStore, namespace: &str) -> DatasetResult<VerifyReport> {
    let mut report = VerifyReport {
        namespace: namespace.to_string(),
        ..VerifyReport::default()
    };

    for index in list_impl(store, namespace).await? {
        let key = ArtifactKey::new(namespace, index);
        report.checked += 1;

        // Evicted between listing and reading; nothing to check.
        let Some(bytes) = read_impl(store, &key).await? else {
            report.checked -= 1;
            continue;
        };

        let ok = match codec::open(&bytes) {
            Ok(artifact) => artifact.namespace == namespace && artifact.index == index,
            Err(_) => false,
        };
        if !ok {
            warn!(key = %key, "corrupt artifact");
            report.corrupt.push(index);
        }
    }

    Ok(report)
}
