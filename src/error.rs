// Error taxonomy for the scanner core.
// Library code returns `ScanError`; the CLI binary wraps it in `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed signature line: {0}")]
    Parse(String),

    #[error("invalid state: {0}")]
    State(String),

    #[error("unrecoverable failure: {0}")]
    Fatal(String),
}

impl ScanError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
