// Streaming content digests.
// Reads in fixed-size chunks so large files never load into memory at once.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha2::{Digest, Sha256};

use crate::config::SCAN_BUFFER_SIZE;
use crate::error::{ScanError, ScanResult};

/// A lowercase hex digest identifying a file's content.
pub type Fingerprint = String;

/// Computes the SHA-256 fingerprint of a file, streaming it in
/// `SCAN_BUFFER_SIZE` chunks.
pub fn sha256_file(path: &Path) -> ScanResult<Fingerprint> {
    digest_file::<Sha256>(path)
}

/// Computes the MD5 fingerprint of a file. Kept available for legacy
/// signature formats; the pipeline itself only consumes SHA-256.
pub fn md5_file(path: &Path) -> ScanResult<Fingerprint> {
    digest_file::<Md5>(path)
}

fn digest_file<D: Digest>(path: &Path) -> ScanResult<Fingerprint> {
    let mut file = File::open(path).map_err(|e| ScanError::io(path, e))?;
    let mut hasher = D::new();
    let mut buffer = [0u8; SCAN_BUFFER_SIZE];

    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| ScanError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
