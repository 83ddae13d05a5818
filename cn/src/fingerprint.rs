//! Content fingerprints for publish dedup
//!
//! A document's fingerprint is the blake3 digest of its bytes as read.
//! The publisher compares the current fingerprint with the one stored at
//! the last successful publish; equal digests mean no remote call.

use std::path::Path;

use eyre::{Context, Result};

/// Fingerprint a string.
pub fn fingerprint(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Fingerprint a file's current contents.
pub fn fingerprint_file(path: impl AsRef<Path>) -> Result<String> {
    let bytes = std::fs::read(path.as_ref())
        .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("same content"), fingerprint("same content"));
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        assert_ne!(fingerprint("a"), fingerprint("b"));
    }

    #[test]
    fn test_fingerprint_file_matches_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "body text").unwrap();
        assert_eq!(fingerprint_file(&path).unwrap(), fingerprint("body text"));
    }
}
