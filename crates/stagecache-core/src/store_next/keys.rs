//! Key/path derivation.

use std::path::{Path, PathBuf};

use crate::error::{DatasetError, DatasetResult};
use crate::fingerprint::NAMESPACE_LEN;

use super::super::ArtifactKey;

pub(crate) const MANIFEST_FILE: &str = "pipeline.json";
const ARTIFACT_EXT: &str = "json";

/// Namespaces are lowercase hex of fixed length, so a name can never leave
/// the cache root.
pub(crate) fn validate_namespace(namespace: &str) -> DatasetResult<()> {
    let valid = namespace.len() == NAMESPACE_LEN
        && namespace
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !valid {
        return Err(DatasetError::config(format!(
            "invalid namespace '{namespace}' (expected {NAMESPACE_LEN} lowercase hex characters)"
        )));
    }
    Ok(())
}

pub(crate) fn namespace_dir_impl(root: &Path, namespace: &str) -> PathBuf {
    root.join(namespace)
}

pub(crate) fn artifact_path_impl(root: &Path, key: &ArtifactKey) -> PathBuf {
    namespace_dir_impl(root, &key.namespace).join(format!("{}.{ARTIFACT_EXT}", key.index))
}

/// Index encoded in an artifact file name; `None` for anything else
/// (manifest, temp files, foreign files).
pub(crate) fn index_from_file_name(name: &str) -> Option<usize> {
    let stem = name.strip_suffix(ARTIFACT_EXT)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_roundtrip() {
        let key = ArtifactKey::new("0123abcd", 42);
        let path = artifact_path_impl(Path::new("/cache"), &key);
        assert_eq!(path, PathBuf::from("/cache/0123abcd/42.json"));

        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(index_from_file_name(name), Some(42));
    }

    #[test]
    fn namespace_must_be_fixed_length_hex() {
        assert!(validate_namespace("0123456789abcdef").is_ok());
        for bad in [
            "../precious",
            "..",
            "",
            "0123456789ABCDEF",
            "0123456789abcde",
            "0123456789abcdef0",
            "0123456789abcd/f",
        ] {
            let err = validate_namespace(bad).unwrap_err();
            assert!(matches!(err, DatasetError::Config { .. }), "{bad}: {err:?}");
        }
    }

    #[test]
    fn non_artifact_names_are_skipped() {
        assert_eq!(index_from_file_name(MANIFEST_FILE), None);
        assert_eq!(index_from_file_name(".3.json.5f1c.tmp"), None);
        assert_eq!(index_from_file_name("+3.json"), None);
        assert_eq!(index_from_file_name(".json"), None);
        assert_eq!(index_from_file_name("7.yaml"), None);
    }
}
