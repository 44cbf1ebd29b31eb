// Tracing setup: the teacher's console layer plus a spec-mandated flat-file
// sink at `logs/scan_results.log` in `[YYYY-MM-DD HH:MM:SS] LEVEL: message`
// format. File I/O failures are swallowed — logging must never fail a scan.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::ScannerConfig;

/// Initialize global tracing: `RUST_LOG`-filtered console output (teacher
/// style) plus the flat-file scan log required by the external interface.
pub fn init(config: &ScannerConfig) {
    let file_layer = FileLogLayer::new(&config.log_path);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_av=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
}

/// A `tracing_subscriber::Layer` that appends one flat line per event.
struct FileLogLayer {
    file: Mutex<Option<File>>,
}

impl FileLogLayer {
    fn new(path: impl AsRef<Path>) -> Self {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = fs::create_dir_all(parent);
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).ok();
        Self {
            file: Mutex::new(file),
        }
    }
}

impl<S> Layer<S> for FileLogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!(
            "[{timestamp}] {}: {}\n",
            spec_level_name(event.metadata().level()),
            visitor.message
        );

        let mut guard = self.file.lock();
        if let Some(file) = guard.as_mut() {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

/// Maps `tracing::Level` to the external log format's fixed spellings
/// (spec §6: `INFO, WARNING, ERROR, DEBUG`). `tracing::Level::WARN`
/// otherwise Displays as `WARN`, which the format does not allow.
fn spec_level_name(level: &tracing::Level) -> &'static str {
    match *level {
        tracing::Level::ERROR => "ERROR",
        tracing::Level::WARN => "WARNING",
        tracing::Level::INFO => "INFO",
        tracing::Level::DEBUG => "DEBUG",
        tracing::Level::TRACE => "DEBUG",
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}
