//! Public configuration options (spec.md §6).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::manifest::Manifest;

/// Function supplied by the embedder to map a retry count to a back-off
/// delay, in seconds. Expected to be pure and total.
pub type DownloadDelayFn = Arc<dyn Fn(u32) -> u64 + Send + Sync>;

/// Async manifest producer, overriding `download_manifest` each tick.
#[async_trait::async_trait]
pub trait ManifestProvider: Send + Sync {
    async fn get_manifest(&self) -> anyhow::Result<Manifest>;
}

/// Errors from [`SyncerOptions::validate`], surfaced from
/// [`crate::reconciler::Syncer::new`] the same way the installer's
/// `InstallConfig::validate` rejects a bad config before doing any I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("manifest entry {index} has an empty url")]
    EmptyUrl { index: usize },
}

/// Construction-time options for [`crate::reconciler::Syncer`].
///
/// Unlike the original's `verbose` flag, this crate has no `verbose` knob of
/// its own: `Syncer` emits `tracing` events unconditionally, and which of
/// them reach stdout (verbose vs. silent) is a property of the embedder's
/// `tracing_subscriber` filter, the same way the installer's own library
/// code never reads `verbose` — only its `main.rs` does, to configure the
/// subscriber before any installer code runs (see `bin/reconcile.rs`).
#[derive(Clone)]
pub struct SyncerOptions {
    /// How long an in-flight record may occupy a destination before it is
    /// considered abandoned.
    pub abandoned_timeout: Duration,

    /// Delay applied to a manifest entry that does not specify its own
    /// `delayInSeconds`.
    pub default_delay_in_seconds: u64,

    /// Retry ceiling applied to a manifest entry that does not specify its
    /// own `retryLimit`.
    pub default_retry_limit: u32,

    /// Overrides the back-off delay as a function of the current retry
    /// count, in place of `entry.delay_in_seconds`/`default_delay_in_seconds`.
    pub get_download_delay: Option<DownloadDelayFn>,

    /// Disables archive extraction; archive entries are then considered
    /// present iff the archive file itself exists (spec.md §9 note 4).
    pub disable_unzip: bool,

    /// Initial manifest, used before any `get_manifest` producer replaces it.
    pub download_manifest: Manifest,

    /// Reconciliation tick interval.
    pub interval: Duration,

    /// Local root all managed files live under.
    pub working_directory: PathBuf,

    /// Async manifest producer invoked at the start of every tick.
    pub get_manifest: Option<Arc<dyn ManifestProvider>>,

    /// Skips the synchronous tick normally fired as soon as `init` runs.
    pub disable_immediate_download: bool,
}

impl SyncerOptions {
    /// Rejects a manifest containing an entry with an empty `url`, the one
    /// precondition spec.md §3 calls out as required. Mirrors the shape of
    /// the installer's own `InstallConfig::validate` (check each
    /// precondition, return the first violation) without its filesystem
    /// checks, since this crate's `working_directory` is created on demand
    /// rather than required to pre-exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, entry) in self.download_manifest.iter().enumerate() {
            if entry.url.trim().is_empty() {
                return Err(ConfigError::EmptyUrl { index });
            }
        }
        Ok(())
    }
}

impl Default for SyncerOptions {
    fn default() -> Self {
        Self {
            abandoned_timeout: Duration::from_millis(1_800_000),
            default_delay_in_seconds: 0,
            default_retry_limit: 5,
            get_download_delay: None,
            disable_unzip: false,
            download_manifest: Manifest::new(),
            interval: Duration::from_millis(60_000),
            working_directory: PathBuf::from("./downloads"),
            get_manifest: None,
            disable_immediate_download: false,
        }
    }
}
