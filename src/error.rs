//! Typed errors surfaced by the Download Engine.
//!
//! The original implementation this crate is a faithful port of compared
//! error *messages* by substring (`"duplicate"`) to decide whether a failed
//! `Start` call should bump a retry counter. That is not an option here: the
//! Retry Coordinator dispatches on `DownloadError` variants directly, the
//! same way `installer::config::ConfigError` lets `InstallConfig::validate`
//! callers match on kind instead of parsing a string.

use std::path::PathBuf;

/// Failure kinds a caller of [`crate::download::Engine::start`] may observe.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("download already in flight for {0}")]
    Duplicate(PathBuf),

    #[error("download already scheduled for {0}, starting in {1}s")]
    DuplicateScheduled(PathBuf, u64),

    #[error("cannot schedule {0}: an unexpired download is already in flight")]
    DuplicateInFlight(PathBuf),

    #[error("in-flight download for {0} exceeded the abandon timeout and was evicted")]
    Abandoned(PathBuf),

    #[error("server responded with HTTP {0}")]
    HttpStatus(u16),

    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),

    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// True for every variant that represents an *inhibited* attempt rather
    /// than a failed one. Per spec, the Retry Coordinator must not increment
    /// `retries` for these.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            DownloadError::Duplicate(_)
                | DownloadError::DuplicateScheduled(_, _)
                | DownloadError::DuplicateInFlight(_)
        )
    }
}
