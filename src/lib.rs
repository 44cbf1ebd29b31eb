//! Host-based anti-malware scanner core: hashing, a concurrently-readable
//! signature database, heuristic analysis, a detection pipeline, a
//! recoverable quarantine vault, and a real-time directory monitor.

pub mod config;
pub mod error;
pub mod hasher;
pub mod heuristics;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod quarantine;
pub mod signatures;

pub use config::ScannerConfig;
pub use error::{ScanError, ScanResult};
pub use monitor::{MonitorState, RealTimeMonitor};
pub use pipeline::{DetectionPipeline, DirectoryScanReport, MalwareTag, ScanFailure, Verdict};
pub use quarantine::QuarantineVault;
pub use signatures::SignatureStore;
