//! Time source abstraction.
//!
//! Mirrors the instrumentation the installer already leans on for its
//! stall detector (`downloaders::http::DownloadProgress`, built on
//! `std::time::Instant`) but pulled out behind a trait so ticks, timers and
//! `abandonedTimeout` comparisons are deterministic in tests.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Time source for the reconciliation engine.
///
/// `now` is monotonic and only ever used for relative comparisons
/// (`abandonedTimeout`, scheduling delays). `now_millis` is wall-clock epoch
/// time, used solely for `CatalogFile.downloadedAt` and `DownloadLog`
/// timestamps, which are meant to be human-legible.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic "now", used for elapsed-time comparisons.
    fn now(&self) -> Instant;

    /// Wall-clock "now" in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// Sleep for the given duration. Implementations used in production
    /// must be cancel-safe: dropping the future must not leave stray state.
    async fn sleep(&self, duration: Duration);
}

/// Default `Clock` backed by `std::time` and the Tokio timer wheel.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
