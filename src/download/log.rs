//! Per-destination download statistics, kept for the lifetime of the
//! process only (spec.md §3, `DownloadLog`; explicitly not persisted across
//! restarts per spec.md §1 Non-goals).
//!
//! Shaped like the installer's own per-mod bookkeeping
//! (`collection::db::ModDbEntry` tracks `status`/`error_message` per
//! destination) but kept in memory rather than sqlite, since spec.md §1
//! rules out durable persistence for this component.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Long-lived per-destination statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadLog {
    pub retries: u32,
    pub last_download_attempt: Option<i64>,
    pub downloaded_at: Option<i64>,
}

/// Registry of [`DownloadLog`]s keyed by absolute destination path.
#[derive(Default)]
pub struct DownloadLogRegistry {
    logs: Mutex<HashMap<PathBuf, DownloadLog>>,
}

impl DownloadLogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a log entry exists for `destination`, per spec.md §4.4 step 1.
    pub fn ensure(&self, destination: &Path) {
        self.logs
            .lock()
            .unwrap()
            .entry(destination.to_path_buf())
            .or_default();
    }

    pub fn retries(&self, destination: &Path) -> u32 {
        self.logs
            .lock()
            .unwrap()
            .get(destination)
            .map(|l| l.retries)
            .unwrap_or(0)
    }

    pub fn get(&self, destination: &Path) -> Option<DownloadLog> {
        self.logs.lock().unwrap().get(destination).copied()
    }

    pub fn record_attempt(&self, destination: &Path, now_millis: i64) {
        let mut logs = self.logs.lock().unwrap();
        let log = logs.entry(destination.to_path_buf()).or_default();
        log.last_download_attempt = Some(now_millis);
    }

    /// On failure that is *not* a duplicate-family error, bump `retries`.
    pub fn increment_retries(&self, destination: &Path) {
        let mut logs = self.logs.lock().unwrap();
        let log = logs.entry(destination.to_path_buf()).or_default();
        log.retries += 1;
    }

    /// On success, reset `retries` to 0 and record `downloadedAt`.
    pub fn record_success(&self, destination: &Path, now_millis: i64) {
        let mut logs = self.logs.lock().unwrap();
        let log = logs.entry(destination.to_path_buf()).or_default();
        log.retries = 0;
        log.downloaded_at = Some(now_millis);
    }
}
