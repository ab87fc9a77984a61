//! Atomic publish helpers.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

use crate::error::{DatasetError, DatasetResult};

/// Publish `content` at `path` unless something is already there.
///
/// Returns `true` when this call created `path`.
pub(crate) async fn publish_if_absent_impl(path: &Path, content: &[u8]) -> DatasetResult<bool> {
    let dir = path.parent().ok_or_else(|| DatasetError::Storage {
        message: format!("artifact path has no parent: {}", path.display()),
    })?;

    fs::create_dir_all(dir)
        .await
        .map_err(|e| DatasetError::storage("failed to create cache directory", e))?;

    let temp_path = temp_path_for(dir, path);
    if let Err(e) = write_synced(&temp_path, content).await {
        remove_temp(&temp_path).await;
        return Err(DatasetError::storage("failed to write temp file", e));
    }

    let linked = fs::hard_link(&temp_path, path).await;
    remove_temp(&temp_path).await;

    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(DatasetError::storage("failed to publish artifact", e)),
    }
}

fn temp_path_for(dir: &Path, path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    dir.join(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
}

async fn write_synced(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    Ok(())
}

async fn remove_temp(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove temp file");
        }
    }
}
