//! Download Engine and its Retry Coordinator (spec.md §4.3, §4.4).

pub mod engine;
pub mod log;
pub mod retry;

pub use engine::{Engine, OnNewDownload, StartOptions};
pub use log::{DownloadLog, DownloadLogRegistry};
pub use retry::{AttemptOutcome, RetryCoordinator};
