// Detection pipeline: composes the hasher, signature store, and
// heuristics into a single per-file verdict.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, warn};
use walkdir::WalkDir;

use crate::config::ScannerConfig;
use crate::hasher;
use crate::heuristics;
use crate::quarantine::QuarantineVault;
use crate::signatures::SignatureStore;

/// The tag distinguishing why a `Verdict::Malicious` fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalwareTag {
    SignatureHit,
    HighEntropy,
    SuspiciousPe,
    PackerSignature,
    SuspiciousStrings,
    ShellcodePattern,
    RansomwareBurst,
}

/// The reason a scan could not produce a clean/malicious verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFailure {
    NotFound,
    IoError(String),
}

/// The pipeline's terminal classification for a file. `Error` is never a
/// substitute for `Clean` — it is a distinct, third outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Malicious(MalwareTag),
    Error(ScanFailure),
}

impl Verdict {
    pub fn is_malicious(&self) -> bool {
        matches!(self, Verdict::Malicious(_))
    }
}

/// Aggregate result of scanning a directory tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryScanReport {
    pub files_scanned: u64,
    pub threats_found: u64,
}

/// Composes C1 (hasher), C2 (signature store), and C3 (heuristics) into a
/// per-file verdict, and can additionally drive a quarantine vault over a
/// whole directory tree.
pub struct DetectionPipeline {
    config: ScannerConfig,
    signatures: Arc<SignatureStore>,
}

impl DetectionPipeline {
    pub fn new(config: ScannerConfig, signatures: Arc<SignatureStore>) -> Self {
        Self { config, signatures }
    }

    pub fn signatures(&self) -> &Arc<SignatureStore> {
        &self.signatures
    }

    /// Scan a single file and return its verdict. Never panics; any I/O
    /// failure is reported as `Verdict::Error`, distinct from `Clean`.
    pub fn scan_file(&self, path: &Path) -> Verdict {
        if !path.exists() {
            return Verdict::Error(ScanFailure::NotFound);
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) => return Verdict::Error(ScanFailure::IoError(e.to_string())),
        };

        if metadata.len() > self.config.max_file_size {
            warn!(path = %path.display(), size = metadata.len(), "file exceeds max size, skipping");
            return Verdict::Clean;
        }

        let hash = match hasher::sha256_file(path) {
            Ok(h) => h,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to hash file");
                return Verdict::Error(ScanFailure::IoError(e.to_string()));
            }
        };

        if self.signatures.contains(&hash) {
            return Verdict::Malicious(MalwareTag::SignatureHit);
        }

        self.heuristic_gate(path)
    }

    /// Heuristic gate: short-circuits on the first positive signal so the
    /// resulting tag is deterministic for a fixed input.
    fn heuristic_gate(&self, path: &Path) -> Verdict {
        if heuristics::entropy(path) > self.config.pipeline_entropy_threshold {
            return Verdict::Malicious(MalwareTag::HighEntropy);
        }
        if heuristics::is_suspicious_pe(path) {
            return Verdict::Malicious(MalwareTag::SuspiciousPe);
        }
        if heuristics::has_packer_signature(path) {
            return Verdict::Malicious(MalwareTag::PackerSignature);
        }
        if heuristics::has_suspicious_strings(path) {
            return Verdict::Malicious(MalwareTag::SuspiciousStrings);
        }
        Verdict::Clean
    }

    /// Recursively walk `root`, scanning every regular file exactly once.
    /// Positive verdicts trigger quarantine via `vault`. Per-file errors
    /// are logged and do not abort the walk.
    pub fn scan_directory(&self, root: &Path, vault: &QuarantineVault) -> DirectoryScanReport {
        let mut report = DirectoryScanReport::default();

        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path: PathBuf = entry.into_path();
            report.files_scanned += 1;

            let verdict = self.scan_file(&path);
            match verdict {
                Verdict::Malicious(_) => {
                    report.threats_found += 1;
                    if let Err(e) = vault.quarantine(&path) {
                        error!(path = %path.display(), error = %e, "failed to quarantine threat");
                    }
                }
                Verdict::Error(ref failure) => {
                    error!(path = %path.display(), ?failure, "scan failed for path");
                }
                Verdict::Clean => {}
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn pipeline(dir: &Path) -> DetectionPipeline {
        let mut config = ScannerConfig::default();
        config.signature_db_path = dir.join("signatures.db").to_string_lossy().to_string();
        let signatures = Arc::new(SignatureStore::load(&config.signature_db_path).unwrap());
        DetectionPipeline::new(config, signatures)
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        let verdict = p.scan_file(&dir.path().join("nope.txt"));
        assert_eq!(verdict, Verdict::Error(ScanFailure::NotFound));
    }

    #[test]
    fn empty_file_with_no_signature_is_clean() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        let file = dir.path().join("empty.txt");
        fs::write(&file, []).unwrap();
        assert_eq!(p.scan_file(&file), Verdict::Clean);
    }

    #[test]
    fn signature_hit_wins_over_heuristics() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        let file = dir.path().join("empty.txt");
        fs::write(&file, []).unwrap();

        let hash = hasher::sha256_file(&file).unwrap();
        p.signatures.add(&hash).unwrap();

        assert_eq!(
            p.scan_file(&file),
            Verdict::Malicious(MalwareTag::SignatureHit)
        );
    }

    #[test]
    fn high_entropy_file_is_malicious() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        let file = dir.path().join("r.bin");

        let mut bytes = vec![0u8; 1 << 16];
        let mut state: u32 = 0xDEAD_BEEF;
        for b in bytes.iter_mut() {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            *b = (state & 0xFF) as u8;
        }
        fs::write(&file, &bytes).unwrap();

        assert_eq!(
            p.scan_file(&file),
            Verdict::Malicious(MalwareTag::HighEntropy)
        );
    }

    #[test]
    fn file_exceeding_max_size_is_skipped_as_clean() {
        let dir = tempdir().unwrap();
        let mut config = ScannerConfig::default();
        config.signature_db_path = dir.path().join("signatures.db").to_string_lossy().to_string();
        config.max_file_size = 10;
        let signatures = Arc::new(SignatureStore::load(&config.signature_db_path).unwrap());
        let p = DetectionPipeline::new(config, signatures);

        let file = dir.path().join("big.bin");
        fs::write(&file, vec![0x41u8; 100]).unwrap();
        assert_eq!(p.scan_file(&file), Verdict::Clean);
    }

    #[test]
    fn scan_directory_covers_every_regular_file() {
        let dir = tempdir().unwrap();
        let p = pipeline(dir.path());
        let vault = QuarantineVault::new(dir.path().join("quarantine"));

        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::write(dir.path().join("b.txt"), b"world").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("c.txt"), b"nested").unwrap();

        let report = p.scan_directory(dir.path(), &vault);
        assert!(report.files_scanned >= 4); // a, b, c + signatures.db
    }
}
