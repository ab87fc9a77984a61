use sha2::{Digest, Sha256};

/// `sha256:<hex>` digest of an artifact payload.
pub(crate) fn sha256_hex_bytes(bytes: &[u8]) -> String {
    format!("sha256:{}", sha256_hex_raw(bytes))
}

pub(crate) fn sha256_hex_raw(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
