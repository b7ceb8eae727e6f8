//! Retry/Back-off Coordinator — decides, after a single [`Engine::start`]
//! attempt fails, whether to give up or schedule another attempt.
//!
//! Grounded on the installer's own retry loop for mod downloads
//! (`collection::download::download_with_retries`), which also distinguishes
//! "this attempt didn't really happen" (rate limited, already in progress)
//! from "this attempt happened and failed" before deciding whether to spend
//! a retry. Here that distinction is carried by [`DownloadError::is_duplicate`]
//! rather than matching on an HTTP status, since duplicate/in-flight
//! rejections never call the Fetcher at all.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::DownloadError;

use super::engine::{Engine, StartOptions};
use super::log::DownloadLogRegistry;

/// Outcome of driving one manifest entry through to either success or
/// exhaustion of its retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    RetriesExhausted,
    /// The engine was closed mid-retry; the caller should stop looping.
    Cancelled,
}

/// Drives repeated [`Engine::start`] calls for a single destination until it
/// succeeds, is cancelled, or exhausts `retry_limit`.
#[derive(Clone)]
pub struct RetryCoordinator {
    engine: Engine,
    log: Arc<DownloadLogRegistry>,
    clock: Arc<dyn Clock>,
    default_retry_limit: u32,
}

impl RetryCoordinator {
    pub fn new(
        engine: Engine,
        log: Arc<DownloadLogRegistry>,
        clock: Arc<dyn Clock>,
        default_retry_limit: u32,
    ) -> Self {
        Self { engine, log, clock, default_retry_limit }
    }

    /// Attempts `destination` until it succeeds, is cancelled, or `retries`
    /// exceeds `retry_limit` (`None` means "use the engine's
    /// `default_retry_limit`"; per spec.md §3/§4.4 the resolution is
    /// `entry.retryLimit ?? defaultRetryLimit`, so an explicit `Some(0)` means
    /// zero retries — one attempt total — not "fall back to the default").
    ///
    /// Per spec.md §4.4 step 2, the limit check is strict `>` and runs
    /// *before* each attempt against the retry count left by the previous
    /// attempt, so a destination is attempted `retry_limit + 1` times in
    /// total (retries 0..=retry_limit) before being abandoned without a
    /// further attempt — see spec.md §9 Open Question 2 and invariant P6.
    /// `delay_fn` recomputes the scheduling delay passed to the Engine from
    /// the *current* retry count on every attempt (spec.md §4.4 step 3),
    /// since `getDownloadDelay` is a function of the retry count, not a
    /// fixed value chosen once. Duplicate/in-flight rejections are retried
    /// immediately and never count against the budget.
    pub async fn run(
        &self,
        destination: &Path,
        request_config: crate::manifest::RequestConfig,
        retry_limit: Option<u32>,
        delay_fn: impl Fn(u32) -> u64,
        on_new_download: Option<super::engine::OnNewDownload>,
    ) -> AttemptOutcome {
        let limit = retry_limit.unwrap_or(self.default_retry_limit);
        self.log.ensure(destination);

        loop {
            let retries = self.log.retries(destination);
            if retries > limit {
                warn!("{}: retries ({retries}) exceed limit ({limit}), abandoning", destination.display());
                return AttemptOutcome::RetriesExhausted;
            }

            let options = StartOptions {
                delay_in_seconds: Some(delay_fn(retries)),
                on_new_download: on_new_download.clone(),
            };

            let result = self
                .engine
                .start(destination.to_path_buf(), request_config.clone(), options)
                .await;

            match result {
                Ok(_) => {
                    self.log.record_success(destination, self.clock.now_millis());
                    return AttemptOutcome::Succeeded;
                }
                Err(DownloadError::Cancelled) => {
                    return AttemptOutcome::Cancelled;
                }
                Err(ref e) if e.is_duplicate() => {
                    info!("{}: {e}, retrying shortly", destination.display());
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(e) => {
                    self.log.increment_retries(destination);
                    warn!(
                        "{}: attempt failed ({e}), retries now {}/{limit}",
                        destination.display(),
                        self.log.retries(destination)
                    );
                }
            }
        }
    }
}
