use sha2::{Sha256, Digest};
use std::path::Path;
use crate::error::Result;

/// SHA256 of file contents, hex encoded
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let content = std::fs::read(path)?;
    Ok(hash_bytes(&content))
}

/// SHA256 of an in-memory buffer, hex encoded
pub fn hash_bytes(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Source paths are stored with forward slashes and no leading `./` or `/`,
/// so the same export maps to the same row on every platform.
pub fn normalize_source_path(relative_path: &str) -> String {
    let normalized = relative_path.replace('\\', "/");
    normalized
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}
