// Scanner configuration management.
// Loads settings from environment variables with the defaults from the
// original implementation's Config constants.

use serde::{Deserialize, Serialize};

/// Streaming chunk size used by the hasher and heuristics (8 KiB).
pub const SCAN_BUFFER_SIZE: usize = 8192;

/// Coarse entropy gate used by the detection pipeline.
pub const PIPELINE_ENTROPY_THRESHOLD: f64 = 6.5;

/// Aggressive entropy gate used by the real-time monitor.
pub const MONITOR_ENTROPY_THRESHOLD: f64 = 7.0;

/// Files larger than this are skipped (logged at WARNING) rather than scanned.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Poll interval used while waiting for a freshly-changed file to become ready.
pub const MONITOR_POLL_MS: u64 = 100;

/// Number of readiness polls before an event is dropped.
pub const MONITOR_POLL_RETRIES: u32 = 10;

/// Reserved for future network telemetry; unused by the core pipeline.
pub const NETWORK_BUFFER_SIZE: usize = 64 * 1024;

/// Window within which repeated modifications to the same path count toward a burst.
pub const BURST_WINDOW_SECS: u64 = 60;

/// Per-path modification count that triggers a sibling-directory burst check.
pub const BURST_COUNT_THRESHOLD: u32 = 5;

/// Number of recently-active sibling paths that confirms a ransomware burst.
pub const BURST_SIBLING_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Path to the signature database text file.
    pub signature_db_path: String,

    /// Directory that quarantined files are relocated into.
    pub quarantine_path: String,

    /// Append-only scan log path.
    pub log_path: String,

    /// Pipeline-stage entropy threshold.
    pub pipeline_entropy_threshold: f64,

    /// Monitor-stage entropy threshold.
    pub monitor_entropy_threshold: f64,

    /// Files above this size are skipped entirely.
    pub max_file_size: u64,

    /// Poll interval, in milliseconds, for file-readiness checks.
    pub monitor_poll_ms: u64,
}

impl ScannerConfig {
    /// Load configuration from environment variables with defaults.
    pub fn load() -> Self {
        let signature_db_path = std::env::var("SENTINEL_AV_SIGNATURE_DB")
            .unwrap_or_else(|_| "data/signatures.db".to_string());

        let quarantine_path = std::env::var("SENTINEL_AV_QUARANTINE_DIR")
            .unwrap_or_else(|_| "data/quarantine".to_string());

        let log_path = std::env::var("SENTINEL_AV_LOG_PATH")
            .unwrap_or_else(|_| "logs/scan_results.log".to_string());

        let pipeline_entropy_threshold = std::env::var("SENTINEL_AV_PIPELINE_ENTROPY")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(PIPELINE_ENTROPY_THRESHOLD);

        let monitor_entropy_threshold = std::env::var("SENTINEL_AV_MONITOR_ENTROPY")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(MONITOR_ENTROPY_THRESHOLD);

        let max_file_size = std::env::var("SENTINEL_AV_MAX_FILE_SIZE")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(MAX_FILE_SIZE);

        let monitor_poll_ms = std::env::var("SENTINEL_AV_MONITOR_POLL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(MONITOR_POLL_MS);

        Self {
            signature_db_path,
            quarantine_path,
            log_path,
            pipeline_entropy_threshold,
            monitor_entropy_threshold,
            max_file_size,
            monitor_poll_ms,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            signature_db_path: "data/signatures.db".to_string(),
            quarantine_path: "data/quarantine".to_string(),
            log_path: "logs/scan_results.log".to_string(),
            pipeline_entropy_threshold: PIPELINE_ENTROPY_THRESHOLD,
            monitor_entropy_threshold: MONITOR_ENTROPY_THRESHOLD,
            max_file_size: MAX_FILE_SIZE,
            monitor_poll_ms: MONITOR_POLL_MS,
        }
    }
}
