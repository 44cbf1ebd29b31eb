// Real-time monitor: watches a directory tree for changes, gates each
// changed file through readiness polling, exclusion filtering, the
// detection pipeline, and burst-based ransomware detection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::{ScannerConfig, BURST_COUNT_THRESHOLD, BURST_SIBLING_THRESHOLD, BURST_WINDOW_SECS, MONITOR_POLL_RETRIES};
use crate::error::{ScanError, ScanResult};
use crate::heuristics::{self, HIGH_RISK_EXTENSIONS};
use crate::pipeline::{DetectionPipeline, MalwareTag};
use crate::quarantine::QuarantineVault;

/// Substrings (matched case-insensitively) that exempt a changed path from
/// aggressive scanning. Log, quarantine, and package-manager directories
/// are the most common source of watch-induced false positives.
const EXCLUDED_PATTERNS: &[&str] = &[
    "/windows/",
    "/program files/",
    "/programdata/",
    "/appdata/",
    "/temp/",
    ".quarantine",
    "/logs/",
    "/system32/",
    "/syswow64/",
    ".dll",
    ".sys",
    "scan_results.log",
    "signatures.db",
    "/.git/",
    "/node_modules/",
    "/packages/",
];

/// Lifecycle state of a [`RealTimeMonitor`]. `start`/`stop` are idempotent:
/// calling `start` while `Running` or `stop` while `Idle` logs and returns
/// without disturbing the existing watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Tracks per-path modification timestamps and counts within a sliding
/// window, used to flag ransomware-style mass-rewrite bursts. Stale
/// entries are evicted on every record so the map cannot grow unbounded
/// across a long-running watch.
#[derive(Default)]
struct ChangeTracker {
    last_change: HashMap<PathBuf, Instant>,
    change_count: HashMap<PathBuf, u32>,
}

impl ChangeTracker {
    /// Record a change to `path`, returning the change count within the
    /// current burst window (reset to 1 if the window has lapsed).
    fn record(&mut self, path: &Path) -> u32 {
        let now = Instant::now();
        let window = Duration::from_secs(BURST_WINDOW_SECS);

        let count = match self.last_change.get(path) {
            Some(&last) if now.duration_since(last) < window => {
                let entry = self.change_count.entry(path.to_path_buf()).or_insert(0);
                *entry += 1;
                *entry
            }
            _ => {
                self.change_count.insert(path.to_path_buf(), 1);
                1
            }
        };

        self.last_change.insert(path.to_path_buf(), now);
        self.evict_stale(now, window);
        count
    }

    fn evict_stale(&mut self, now: Instant, window: Duration) {
        let stale: Vec<PathBuf> = self
            .last_change
            .iter()
            .filter(|(_, &t)| now.duration_since(t) >= window)
            .map(|(p, _)| p.clone())
            .collect();
        for path in stale {
            self.last_change.remove(&path);
            self.change_count.remove(&path);
        }
    }

    /// Count of other tracked paths sharing `path`'s parent directory.
    fn active_siblings(&self, path: &Path) -> usize {
        let Some(dir) = path.parent() else {
            return 0;
        };
        self.last_change
            .keys()
            .filter(|p| p.as_path() != path && p.parent() == Some(dir))
            .count()
    }
}

fn is_excluded_path(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    EXCLUDED_PATTERNS.iter().any(|p| lower.contains(p))
}

fn is_high_risk_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| HIGH_RISK_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Poll for a changed file to stop growing before scanning it, matching
/// the writer's own flush cadence instead of racing a half-written file.
fn wait_until_ready(path: &Path, poll_ms: u64) -> bool {
    for _ in 0..MONITOR_POLL_RETRIES {
        if let Ok(metadata) = std::fs::metadata(path) {
            if metadata.len() > 0 {
                return true;
            }
        }
        thread::sleep(Duration::from_millis(poll_ms));
    }
    path.exists()
}

/// Watches a directory tree and drives the detection pipeline over every
/// changed file, quarantining anything that comes back malicious.
pub struct RealTimeMonitor {
    state: Arc<RwLock<MonitorState>>,
    stop_flag: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    config: ScannerConfig,
}

impl RealTimeMonitor {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            config,
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.state.read()
    }

    /// Begin watching `root`. A no-op (with a warning log) if already
    /// running or mid-transition.
    pub fn start(
        &self,
        root: PathBuf,
        pipeline: Arc<DetectionPipeline>,
        vault: Arc<QuarantineVault>,
    ) -> ScanResult<()> {
        {
            let mut state = self.state.write();
            if *state != MonitorState::Idle {
                warn!("monitor is already running");
                return Ok(());
            }
            *state = MonitorState::Starting;
        }

        self.stop_flag.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| ScanError::Fatal(format!("failed to create filesystem watcher: {e}")))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| ScanError::Fatal(format!("failed to watch {}: {e}", root.display())))?;

        let state = Arc::clone(&self.state);
        let stop_flag = Arc::clone(&self.stop_flag);
        let config = self.config.clone();

        let join_handle = thread::spawn(move || {
            run_watch_loop(watcher, rx, &state, &stop_flag, &config, &pipeline, &vault, &root);
        });

        *self.handle.lock() = Some(join_handle);

        // Give the watch loop a moment to flip to Running before returning,
        // mirroring the file-readiness poll used per changed path.
        for _ in 0..MONITOR_POLL_RETRIES {
            if *self.state.read() != MonitorState::Starting {
                break;
            }
            thread::sleep(Duration::from_millis(self.config.monitor_poll_ms));
        }

        Ok(())
    }

    /// Stop watching. A no-op (with a warning log) if already idle.
    pub fn stop(&self) {
        {
            let mut state = self.state.write();
            if *state == MonitorState::Idle {
                warn!("monitor is not running");
                return;
            }
            *state = MonitorState::Stopping;
        }

        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }

        *self.state.write() = MonitorState::Idle;
    }
}

#[allow(clippy::too_many_arguments)]
fn run_watch_loop(
    watcher: RecommendedWatcher,
    rx: mpsc::Receiver<notify::Result<notify::Event>>,
    state: &Arc<RwLock<MonitorState>>,
    stop_flag: &Arc<AtomicBool>,
    config: &ScannerConfig,
    pipeline: &Arc<DetectionPipeline>,
    vault: &Arc<QuarantineVault>,
    root: &Path,
) {
    let _watcher = watcher; // keep alive for the duration of the loop
    *state.write() = MonitorState::Running;
    info!(root = %root.display(), "real-time monitoring started");

    let mut tracker = ChangeTracker::default();
    let poll_timeout = Duration::from_millis(config.monitor_poll_ms);

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        match rx.recv_timeout(poll_timeout) {
            Ok(Ok(event)) => {
                for path in event.paths {
                    handle_changed_path(&path, config, pipeline, vault, &mut tracker);
                }
            }
            Ok(Err(e)) => warn!(error = %e, "filesystem watcher error"),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    *state.write() = MonitorState::Idle;
    info!("real-time monitoring stopped");
}

fn handle_changed_path(
    path: &Path,
    config: &ScannerConfig,
    pipeline: &Arc<DetectionPipeline>,
    vault: &Arc<QuarantineVault>,
    tracker: &mut ChangeTracker,
) {
    if !wait_until_ready(path, config.monitor_poll_ms) || !path.exists() {
        return;
    }

    let excluded = is_excluded_path(path);
    if excluded {
        info!(path = %path.display(), "change in excluded path, skipping aggressive scan");
    }

    if is_high_risk_extension(path) || !excluded {
        if heuristics::entropy(path) > config.monitor_entropy_threshold {
            warn!(path = %path.display(), "high entropy detected on changed file");
            quarantine_and_log(path, vault);
            return;
        }

        if let crate::pipeline::Verdict::Malicious(tag) = pipeline.scan_file(path) {
            warn!(path = %path.display(), ?tag, "threat detected on changed file");
            quarantine_and_log(path, vault);
            return;
        }

        if heuristics::has_shellcode_pattern(path) {
            warn!(path = %path.display(), tag = ?MalwareTag::ShellcodePattern, "shellcode pattern detected on changed file");
            quarantine_and_log(path, vault);
            return;
        }
    }

    let count = tracker.record(path);
    if count > BURST_COUNT_THRESHOLD && tracker.active_siblings(path) > BURST_SIBLING_THRESHOLD {
        warn!(path = %path.display(), count, "ransomware burst pattern detected");
        quarantine_and_log(path, vault);
    }
}

fn quarantine_and_log(path: &Path, vault: &Arc<QuarantineVault>) {
    if let Err(e) = vault.quarantine(path) {
        error!(path = %path.display(), error = %e, "failed to quarantine threat");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_patterns_match_system_directories() {
        assert!(is_excluded_path(Path::new("/home/user/AppData/foo.txt")));
        assert!(is_excluded_path(Path::new("/var/logs/scan_results.log")));
        assert!(is_excluded_path(Path::new("/repo/.git/index")));
        assert!(!is_excluded_path(Path::new("/home/user/documents/report.docx")));
    }

    #[test]
    fn high_risk_extensions_are_recognized() {
        assert!(is_high_risk_extension(Path::new("payload.exe")));
        assert!(is_high_risk_extension(Path::new("script.PS1")));
        assert!(!is_high_risk_extension(Path::new("notes.txt")));
    }

    #[test]
    fn change_tracker_resets_after_window_elapses() {
        let mut tracker = ChangeTracker::default();
        let path = PathBuf::from("/tmp/a.txt");
        assert_eq!(tracker.record(&path), 1);
        assert_eq!(tracker.record(&path), 2);
        assert_eq!(tracker.record(&path), 3);
    }

    #[test]
    fn active_siblings_counts_same_directory_paths() {
        let mut tracker = ChangeTracker::default();
        tracker.record(Path::new("/tmp/dir/a.txt"));
        tracker.record(Path::new("/tmp/dir/b.txt"));
        tracker.record(Path::new("/tmp/dir/c.txt"));
        tracker.record(Path::new("/tmp/other/d.txt"));

        assert_eq!(tracker.active_siblings(Path::new("/tmp/dir/a.txt")), 2);
    }

    #[test]
    fn new_monitor_starts_idle() {
        let monitor = RealTimeMonitor::new(ScannerConfig::default());
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn stopping_an_idle_monitor_is_a_harmless_no_op() {
        let monitor = RealTimeMonitor::new(ScannerConfig::default());
        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Idle);
    }
}
