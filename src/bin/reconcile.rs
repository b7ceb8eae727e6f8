//! reconcile - thin driver around `reconciled::Syncer`
//!
//! Not part of the core: a smoke-test harness wiring a manifest file and
//! the real `tokio::fs`/`reqwest`/`zip` collaborators into `Syncer` so the
//! engine can be exercised from a shell. Production embedders are expected
//! to construct `Syncer` directly and supply their own manifest producer.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use reconciled::{Manifest, SyncerOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reconcile")]
#[command(author = "reconciled contributors")]
#[command(version)]
#[command(about = "Reconcile a local directory against a JSON asset manifest")]
struct Cli {
    /// Path to a JSON file containing an array of manifest entries.
    manifest_file: PathBuf,

    /// Directory to keep in sync.
    #[arg(short, long, default_value = "./downloads")]
    working_directory: PathBuf,

    /// Reconciliation interval, in seconds.
    #[arg(short, long, default_value = "60")]
    interval_secs: u64,

    /// Run a single tick and exit instead of looping.
    #[arg(long)]
    once: bool,

    /// Enable verbose logging (use RUST_LOG=debug for more detail).
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(if cli.verbose { "reconciled=debug".parse()? } else { "reconciled=info".parse()? }),
            )
            .init();
    }

    let raw = std::fs::read_to_string(&cli.manifest_file)
        .with_context(|| format!("failed to read manifest {}", cli.manifest_file.display()))?;
    let manifest: Manifest = serde_json::from_str(&raw).context("failed to parse manifest JSON")?;

    let options = SyncerOptions {
        download_manifest: manifest,
        working_directory: cli.working_directory,
        interval: Duration::from_secs(cli.interval_secs),
        disable_immediate_download: false,
        ..Default::default()
    };

    let syncer = reconciled::Syncer::new(options)?;

    if cli.once {
        let handles = syncer.tick().await;
        futures::future::join_all(handles).await;
    } else {
        syncer.init().await;
        tokio::signal::ctrl_c().await.ok();
        syncer.close().await;
    }

    Ok(())
}
