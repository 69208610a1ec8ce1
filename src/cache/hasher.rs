//! Key Hasher
//!
//! Maps logical keys onto a two-level sharded directory layout.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Hex digest of a logical key.
pub fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Builds physical paths under a storage root.
///
/// `root/<d0>/<d1>/<digest>` where `d0` and `d1` are the first two hex
/// characters, giving 256 leaf directories.
#[derive(Debug, Clone)]
pub struct KeyHasher {
    root: PathBuf,
}

impl KeyHasher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Physical file path for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let hash = digest(key);
        self.root.join(&hash[0..1]).join(&hash[1..2]).join(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_fixed_width_hex() {
        let d = digest("some key");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(d, digest("some key"));
        assert_ne!(d, digest("some key2"));
    }

    #[test]
    fn test_path_layout() {
        let hasher = KeyHasher::new("/var/cache/app");
        let d = digest("user:1");
        let path = hasher.path_for("user:1");

        let expected = PathBuf::from("/var/cache/app")
            .join(&d[0..1])
            .join(&d[1..2])
            .join(&d);
        assert_eq!(path, expected);
    }
}
