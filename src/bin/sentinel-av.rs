// CLI front-end for the sentinel-av scanner core.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use sentinel_av::{logging, DetectionPipeline, QuarantineVault, RealTimeMonitor, ScannerConfig, SignatureStore};

#[derive(Parser)]
#[command(name = "sentinel-av", version, about = "Host-based anti-malware scanner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a single file or recursively scan a directory.
    Scan {
        /// File or directory to scan.
        path: PathBuf,
    },
    /// Watch a directory tree in real time, quarantining threats as they appear.
    Watch {
        /// Directory to watch.
        path: PathBuf,
    },
    /// Inspect or recover files held in the quarantine vault.
    Quarantine {
        #[command(subcommand)]
        action: QuarantineAction,
    },
    /// Manage the signature database.
    Signatures {
        #[command(subcommand)]
        action: SignatureAction,
    },
}

#[derive(Subcommand)]
enum QuarantineAction {
    /// List everything currently quarantined.
    List,
    /// Restore a single quarantine entry by name.
    Restore { name: String },
    /// Restore every quarantined entry.
    RestoreAll,
}

#[derive(Subcommand)]
enum SignatureAction {
    /// Reload the signature database from disk.
    Reload,
    /// Add a fingerprint to the signature database.
    Add { hash: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ScannerConfig::load();
    logging::init(&config);

    info!("sentinel-av v{} starting", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let signatures = Arc::new(
        SignatureStore::load(&config.signature_db_path)
            .context("failed to load signature database")?,
    );
    let vault = Arc::new(QuarantineVault::new(&config.quarantine_path));
    let pipeline = Arc::new(DetectionPipeline::new(config.clone(), Arc::clone(&signatures)));

    match cli.command {
        Command::Scan { path } => {
            if path.is_dir() {
                let report = pipeline.scan_directory(&path, &vault);
                println!(
                    "scanned {} files, {} threats quarantined",
                    report.files_scanned, report.threats_found
                );
            } else {
                let verdict = pipeline.scan_file(&path);
                println!("{}: {:?}", path.display(), verdict);
                if verdict.is_malicious() {
                    vault.quarantine(&path).context("failed to quarantine threat")?;
                }
            }
        }
        Command::Watch { path } => {
            let monitor = RealTimeMonitor::new(config.clone());
            monitor.start(path.clone(), Arc::clone(&pipeline), Arc::clone(&vault))?;
            println!("watching {} — press Ctrl+C to stop", path.display());
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            monitor.stop();
        }
        Command::Quarantine { action } => match action {
            QuarantineAction::List => {
                for name in vault.list()? {
                    println!("{name}");
                }
            }
            QuarantineAction::Restore { name } => {
                let restored = vault.restore(&name)?;
                println!("restored to {}", restored.display());
            }
            QuarantineAction::RestoreAll => {
                let all_ok = vault.restore_all()?;
                println!("restore all: {}", if all_ok { "ok" } else { "partial failure" });
            }
        },
        Command::Signatures { action } => match action {
            SignatureAction::Reload => {
                signatures.reload()?;
                println!("reloaded {} signatures", signatures.count());
            }
            SignatureAction::Add { hash } => {
                signatures.add(&hash)?;
                println!("added signature, {} total", signatures.count());
            }
        },
    }

    Ok(())
}
