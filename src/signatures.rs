// Concurrent signature database.
// One fingerprint per non-empty, non-comment line; the backing file is
// always fully rewritten on mutation so external edits are tolerated.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{ScanError, ScanResult};
use crate::hasher::Fingerprint;

/// A concurrently readable set of hex-digest fingerprints backed by a
/// text-line file. Many readers may call `contains` without blocking each
/// other; mutation (`add`, `load`, `reload`) takes an exclusive lock for
/// the duration of the in-memory update and the backing-file rewrite.
pub struct SignatureStore {
    path: PathBuf,
    signatures: RwLock<HashSet<Fingerprint>>,
}

impl SignatureStore {
    /// Load (or create) a signature store backed by `path`.
    pub fn load(path: impl AsRef<Path>) -> ScanResult<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            signatures: RwLock::new(HashSet::new()),
        };
        store.reload_from_disk()?;
        Ok(store)
    }

    /// Re-read the current backing path, clearing and repopulating the
    /// in-memory set. Synonym for `reload` per the spec's open question:
    /// there is no network signature-update protocol, only a local reload.
    pub fn reload(&self) -> ScanResult<()> {
        self.reload_from_disk()
    }

    fn reload_from_disk(&self) -> ScanResult<()> {
        let mut set = self.signatures.write();
        set.clear();

        if !self.path.exists() {
            warn!(path = %self.path.display(), "signature database not found, creating empty one");
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(|e| ScanError::io(&self.path, e))?;
                }
            }
            fs::File::create(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
        let mut loaded = 0usize;
        for line in contents.lines() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let stripped: String = line.chars().filter(|c| !c.is_whitespace()).collect();
            if stripped.is_empty() {
                continue;
            }
            set.insert(stripped.to_lowercase());
            loaded += 1;
        }

        info!(count = loaded, path = %self.path.display(), "loaded signatures");
        Ok(())
    }

    /// Lock-protected membership check. Never blocks another `contains`.
    pub fn contains(&self, fingerprint: &str) -> bool {
        self.signatures.read().contains(&fingerprint.to_lowercase())
    }

    /// Insert a fingerprint and synchronously rewrite the backing file.
    /// Write failures propagate: an `add` must never be silently lost.
    pub fn add(&self, fingerprint: &str) -> ScanResult<()> {
        let normalized = fingerprint.to_lowercase();
        let mut set = self.signatures.write();
        set.insert(normalized);
        self.rewrite_backing_file(&set)
    }

    /// Number of distinct fingerprints currently held.
    pub fn count(&self) -> usize {
        self.signatures.read().len()
    }

    fn rewrite_backing_file(&self, set: &HashSet<Fingerprint>) -> ScanResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ScanError::io(&self.path, e))?;
            }
        }

        let mut sorted: Vec<&Fingerprint> = set.iter().collect();
        sorted.sort();

        let mut file = fs::File::create(&self.path).map_err(|e| ScanError::io(&self.path, e))?;
        for fingerprint in sorted {
            writeln!(file, "{fingerprint}").map_err(|e| ScanError::io(&self.path, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_file_creates_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signatures.db");
        let store = SignatureStore::load(&path).unwrap();
        assert_eq!(store.count(), 0);
        assert!(path.exists());
    }

    #[test]
    fn add_then_contains_is_true() {
        let dir = tempdir().unwrap();
        let store = SignatureStore::load(dir.path().join("signatures.db")).unwrap();
        let hash = "a".repeat(64);
        store.add(&hash).unwrap();
        assert!(store.contains(&hash));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn add_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let store = SignatureStore::load(dir.path().join("signatures.db")).unwrap();
        store.add(&"ABCD".repeat(16)).unwrap();
        assert!(store.contains(&"abcd".repeat(16)));
    }

    #[test]
    fn reload_survives_process_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signatures.db");
        let hash = "b".repeat(64);
        {
            let store = SignatureStore::load(&path).unwrap();
            store.add(&hash).unwrap();
        }
        let reloaded = SignatureStore::load(&path).unwrap();
        assert!(reloaded.contains(&hash));
    }

    #[test]
    fn comment_and_blank_lines_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signatures.db");
        fs::write(&path, "# a comment\n\n   \nabc123\n  # another\nDEF456\n").unwrap();
        let store = SignatureStore::load(&path).unwrap();
        assert_eq!(store.count(), 2);
        assert!(store.contains("abc123"));
        assert!(store.contains("def456"));
    }

    #[test]
    fn whitespace_inside_a_line_is_stripped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signatures.db");
        fs::write(&path, "ab cd\t12 34\n").unwrap();
        let store = SignatureStore::load(&path).unwrap();
        assert!(store.contains("abcd1234"));
    }

    #[test]
    fn load_save_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("signatures.db");
        let store = SignatureStore::load(&path).unwrap();
        store.add(&"1".repeat(64)).unwrap();
        store.add(&"2".repeat(64)).unwrap();

        store.reload().unwrap();
        assert_eq!(store.count(), 2);
    }
}
