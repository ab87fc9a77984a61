//! Write path.

use chrono::Utc;
use tracing::debug;

use crate::error::DatasetResult;
use crate::fingerprint::{Fingerprint, ARTIFACT_FORMAT};

use super::super::{ArtifactKey, DiskStore, PipelineManifest};
use super::{io, keys};

pub(crate) async fn put_impl(
    store: &DiskStore,
    key: &ArtifactKey,
    bytes: &[u8],
) -> DatasetResult<bool> {
    let path = store.artifact_path(key)?;
    let published = io::publish_if_absent_impl(&path, bytes).await?;

    if published {
        debug!(key = %key, bytes = bytes.len(), "published artifact");
    } else {
        debug!(key = %key, "artifact already present, write skipped");
    }
    Ok(published)
}

pub(crate) async fn write_manifest_impl(
    store: &DiskStore,
    fingerprint: &Fingerprint,
) -> DatasetResult<()> {
    let manifest = PipelineManifest {
        namespace: fingerprint.namespace.clone(),
        fingerprint: fingerprint.hex.clone(),
        stages: fingerprint.components.clone(),
        format: ARTIFACT_FORMAT,
        created_at: Utc::now(),
    };
    let content = serde_json::to_vec_pretty(&manifest)?;
    let path = store
        .namespace_dir(&fingerprint.namespace)?
        .join(keys::MANIFEST_FILE);

    if io::publish_if_absent_impl(&path, &content).await? {
        debug!(
            namespace = %fingerprint.namespace,
            stages = ?fingerprint.components,
            "registered namespace"
        );
    }
    Ok(())
}
