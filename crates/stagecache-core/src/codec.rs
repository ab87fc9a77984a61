//! Durable artifact encoding.
//!
//! One artifact per (namespace, index): a JSON envelope carrying the prefix
//! output and a digest of its canonical bytes, verified on every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::digest::sha256_hex_bytes;
use crate::error::{DatasetError, DatasetResult};
use crate::fingerprint::ARTIFACT_FORMAT;
use crate::record::Record;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub format: u32,
    pub namespace: String,
    pub index: usize,
    /// Digest of `record` as compact JSON (sha256:...).
    pub digest: String,
    pub created_at: DateTime<Utc>,
    pub record: serde_json::Value,
}

pub(crate) fn encode<R: Record>(
    namespace: &str,
    index: usize,
    record: &R,
) -> DatasetResult<Vec<u8>> {
    let value = serde_json::to_value(record)?;
    // JSON has no NaN or infinity; serde_json writes them as null, which
    // would only fail on the next read. Refuse them before publishing.
    if let Err(e) = serde_json::from_value::<R>(value.clone()) {
        return Err(DatasetError::Codec {
            message: format!(
                "record for {namespace}/{index} does not survive JSON encoding \
                 (non-finite float?): {e}"
            ),
        });
    }
    let canonical = serde_json::to_vec(&value)?;

    let artifact = Artifact {
        format: ARTIFACT_FORMAT,
        namespace: namespace.to_string(),
        index,
        digest: sha256_hex_bytes(&canonical),
        created_at: Utc::now(),
        record: value,
    };
    Ok(serde_json::to_vec(&artifact)?)
}

/// Parse and verify an artifact without decoding the record type.
pub fn open(bytes: &[u8]) -> DatasetResult<Artifact> {
    let artifact: Artifact = serde_json::from_slice(bytes)?;
    if artifact.format != ARTIFACT_FORMAT {
        return Err(DatasetError::Codec {
            message: format!(
                "unsupported artifact format {} (expected {ARTIFACT_FORMAT})",
                artifact.format
            ),
        });
    }

    let canonical = serde_json::to_vec(&artifact.record)?;
    let actual = sha256_hex_bytes(&canonical);
    if actual != artifact.digest {
        warn!(
            namespace = %artifact.namespace,
            index = artifact.index,
            expected = %artifact.digest,
            actual = %actual,
            "artifact integrity check failed"
        );
        return Err(DatasetError::Corrupt {
            index: artifact.index,
            namespace: artifact.namespace,
            expected: artifact.digest,
            actual,
        });
    }

    Ok(artifact)
}

pub(crate) fn decode<R: Record>(namespace: &str, index: usize, bytes: &[u8]) -> DatasetResult<R> {
    let artifact = match open(bytes) {
        Ok(a) => a,
        // A file that does not even parse is corrupt from the reader's view.
        Err(DatasetError::Codec { message }) => {
            return Err(DatasetError::Corrupt {
                index,
                namespace: namespace.to_string(),
                expected: "valid artifact".to_string(),
                actual: message,
            })
        }
        Err(e) => return Err(e),
    };

    if artifact.namespace != namespace || artifact.index != index {
        return Err(DatasetError::Corrupt {
            index,
            namespace: namespace.to_string(),
            expected: format!("{namespace}/{index}"),
            actual: format!("{}/{}", artifact.namespace, artifact.index),
        });
    }

    Ok(serde_json::from_value(artifact.record)?)
}
