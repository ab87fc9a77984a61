use serde::{Deserialize, Serialize};

use crate::digest::sha256_hex_raw;
use crate::transform::SplitPipeline;

/// Artifact format version. Bumping it invalidates every namespace.
pub const ARTIFACT_FORMAT: u32 = 1;

/// Length of the hex namespace used as directory name.
pub(crate) const NAMESPACE_LEN: usize = 16;

/// Identity of the cached prefix of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Short hex namespace keying durable artifacts.
    pub namespace: String,
    /// Full sha256 over `components`.
    pub hex: String,
    /// `name@version` per prefix stage, in order.
    pub components: Vec<String>,
}

/// Computes the namespace for a split pipeline.
///
/// Stage order matters; renaming or re-versioning any prefix stage yields a
/// new namespace so artifacts from an older pipeline are never served.
pub fn compute<R>(split: &SplitPipeline<R>) -> Fingerprint {
    let components: Vec<String> = split
        .prefix()
        .iter()
        .map(|s| format!("{}@{}", s.name(), s.version()))
        .collect();

    let mut parts = Vec::with_capacity(components.len() + 1);
    parts.push(format!("stagecache-artifact-v{ARTIFACT_FORMAT}"));
    parts.extend(components.iter().map(|c| format!("stage={c}")));

    let raw = parts.join("\n");
    let hex = sha256_hex_raw(raw.as_bytes());

    Fingerprint {
        namespace: hex[..NAMESPACE_LEN].to_string(),
        hex,
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Lambda, Pipeline, RandLambda};

    fn square() -> Lambda<i64> {
        Lambda::new("square", |x: i64| Ok(x * x))
    }

    #[test]
    fn suffix_stages_do_not_affect_namespace() {
        let a = Pipeline::new()
            .then(square())
            .then(RandLambda::new("noise", |x: i64, _| Ok(x)));
        let b = Pipeline::new()
            .then(square())
            .then(RandLambda::new("other_noise", |x: i64, _| Ok(x + 1)));
        assert_eq!(compute(&a.split(None)), compute(&b.split(None)));
    }

    #[test]
    fn version_bump_changes_namespace() {
        let v1 = Pipeline::new().then(square());
        let v2 = Pipeline::new().then(square().with_version("2"));
        let f1 = compute(&v1.split(None));
        let f2 = compute(&v2.split(None));
        assert_ne!(f1.namespace, f2.namespace);
        assert_eq!(f2.components, vec!["square@2"]);
    }

    #[test]
    fn stage_order_matters() {
        let inc = || Lambda::new("inc", |x: i64| Ok(x + 1));
        let a = Pipeline::new().then(square()).then(inc());
        let b = Pipeline::new().then(inc()).then(square());
        assert_ne!(compute(&a.split(None)).hex, compute(&b.split(None)).hex);
    }

    #[test]
    fn namespace_is_short_hex() {
        let f = compute(&Pipeline::new().then(square()).split(None));
        assert_eq!(f.namespace.len(), NAMESPACE_LEN);
        assert!(f.namespace.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(f.hex.starts_with(&f.namespace));
    }
}
