//! `reconciled` — a resilient manifest-driven asset synchronizer.
//!
//! Keeps a local working directory in sync with a declarative manifest of
//! remote assets: downloads what is missing, retries failures with
//! back-off, extracts archives, and purges whatever the manifest no longer
//! references. See [`reconciler::Syncer`] for the public entry point.

pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod fs;
pub mod manifest;
pub mod postprocess;
pub mod reconciler;

pub use config::{ConfigError, SyncerOptions};
pub use error::DownloadError;
pub use manifest::{Manifest, ManifestEntry, RequestConfig};
pub use reconciler::Syncer;
