//! Download Engine — the per-destination state machine described in
//! spec.md §4.3.
//!
//! Shared state (`currentDownloads`, `scheduledDownloads`) lives in one
//! `EngineState` behind a single `tokio::sync::Mutex`, the same low-
//! contention pattern the installer uses for its own concurrently-shared
//! bookkeeping (`collection::download::DownloadContext` guards a
//! `Vec<FailedDownloadInfo>` with `tokio::sync::Mutex` while many downloads
//! run concurrently via `buffer_unordered`). Cancellation of an admitted,
//! in-flight transfer is cooperative (checked at each chunk read) rather
//! than a hard task abort, so that partial files are always cleaned up —
//! aborting a scheduled *timer* that never opened a writer is safe and uses
//! `AbortHandle` instead, matching the distinction spec.md draws between
//! §4.3.1 (abort a pending timer) and §5 ("in-flight streams... must still
//! clean up partial files").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::DownloadError;
use crate::fetcher::Fetcher;
use crate::fs::FileSystem;
use crate::manifest::RequestConfig;

use super::log::DownloadLogRegistry;

/// An in-flight download: presence means a writer currently owns this path.
#[derive(Debug, Clone, Copy)]
struct DownloadRecord {
    start_time: std::time::Instant,
}

/// A pending download awaiting its timer.
struct ScheduledRecord {
    fire_at: std::time::Instant,
    cancel: tokio::task::AbortHandle,
}

#[derive(Default)]
struct EngineState {
    current: HashMap<PathBuf, DownloadRecord>,
    scheduled: HashMap<PathBuf, ScheduledRecord>,
}

/// Callback invoked synchronously once a download has been admitted.
pub type OnNewDownload = Arc<dyn Fn(&Path) + Send + Sync>;

/// Per-call options for [`Engine::start`].
#[derive(Default, Clone)]
pub struct StartOptions {
    pub delay_in_seconds: Option<u64>,
    pub on_new_download: Option<OnNewDownload>,
}

/// Per-destination download state machine. Cheaply `Clone`: all fields are
/// `Arc`-backed or `Copy`.
#[derive(Clone)]
pub struct Engine {
    state: Arc<Mutex<EngineState>>,
    fs: Arc<dyn FileSystem>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    log: Arc<DownloadLogRegistry>,
    abandoned_timeout: Duration,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        log: Arc<DownloadLogRegistry>,
        abandoned_timeout: Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState::default())),
            fs,
            fetcher,
            clock,
            log,
            abandoned_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Starts (or schedules) a download to `destination`. See spec.md §4.3.
    pub async fn start(
        &self,
        destination: PathBuf,
        request_config: RequestConfig,
        options: StartOptions,
    ) -> Result<PathBuf, DownloadError> {
        let delay = options.delay_in_seconds.unwrap_or(0);
        if delay > 0 {
            self.start_scheduled(destination, request_config, options, delay).await
        } else {
            self.start_immediate(destination, request_config, options).await
        }
    }

    /// Cancels all pending timers and causes any in-flight transfer's next
    /// chunk read to fail with [`DownloadError::Cancelled`], cleaning up its
    /// partial file. Does not itself await those cleanups finishing; the
    /// caller (the Reconciliation Loop) owns the task handles and should
    /// await them.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let mut state = self.state.lock().await;
        for (_, scheduled) in state.scheduled.drain() {
            scheduled.cancel.abort();
        }
    }

    async fn start_scheduled(
        &self,
        destination: PathBuf,
        request_config: RequestConfig,
        options: StartOptions,
        delay_secs: u64,
    ) -> Result<PathBuf, DownloadError> {
        {
            let mut state = self.state.lock().await;

            if let Some(existing) = state.scheduled.get(&destination) {
                let remaining = existing
                    .fire_at
                    .saturating_duration_since(self.clock.now())
                    .as_secs();
                return Err(DownloadError::DuplicateScheduled(destination, remaining));
            }

            if let Some(record) = state.current.get(&destination).copied() {
                let expired = self.clock.now().saturating_duration_since(record.start_time) > self.abandoned_timeout;
                if expired {
                    state.current.remove(&destination);
                    drop(state);
                    let _ = self.fs.remove_file(&destination).await;
                    // Fall through and re-acquire the lock below to schedule.
                } else {
                    return Err(DownloadError::DuplicateInFlight(destination));
                }
            }
        }

        let engine = self.clone();
        let dest_for_task = destination.clone();
        let rc_for_task = request_config.clone();
        let cb_for_task = options.on_new_download.clone();

        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        let join = tokio::spawn(async move {
            engine.clock.sleep(Duration::from_secs(delay_secs)).await;
            {
                let mut state = engine.state.lock().await;
                state.scheduled.remove(&dest_for_task);
            }
            let immediate_options = StartOptions {
                delay_in_seconds: None,
                on_new_download: cb_for_task,
            };
            let result = engine
                .start_immediate(dest_for_task, rc_for_task, immediate_options)
                .await;
            let _ = result_tx.send(result);
        });

        {
            let mut state = self.state.lock().await;
            state.scheduled.insert(
                destination.clone(),
                ScheduledRecord {
                    fire_at: self.clock.now() + Duration::from_secs(delay_secs),
                    cancel: join.abort_handle(),
                },
            );
        }

        match result_rx.await {
            Ok(result) => result,
            Err(_) => Err(DownloadError::Cancelled),
        }
    }

    async fn start_immediate(
        &self,
        destination: PathBuf,
        request_config: RequestConfig,
        options: StartOptions,
    ) -> Result<PathBuf, DownloadError> {
        {
            let mut state = self.state.lock().await;

            if let Some(scheduled) = state.scheduled.remove(&destination) {
                scheduled.cancel.abort();
            }

            if let Some(record) = state.current.get(&destination).copied() {
                let expired = self.clock.now().saturating_duration_since(record.start_time) > self.abandoned_timeout;
                if expired {
                    state.current.remove(&destination);
                    drop(state);
                    let _ = self.fs.remove_file(&destination).await;
                    return Err(DownloadError::Abandoned(destination));
                }
                return Err(DownloadError::Duplicate(destination));
            }

            state
                .current
                .insert(destination.clone(), DownloadRecord { start_time: self.clock.now() });
        }

        self.log.ensure(&destination);
        self.log.record_attempt(&destination, self.clock.now_millis());

        let _ = self.fs.remove_file(&destination).await;

        if let Some(callback) = &options.on_new_download {
            callback(&destination);
        }

        let result = self.drive_download(&destination, &request_config).await;

        self.remove_current(&destination).await;

        if result.is_err() {
            let _ = self.fs.remove_file(&destination).await;
        }

        result
    }

    async fn drive_download(
        &self,
        destination: &Path,
        request_config: &RequestConfig,
    ) -> Result<PathBuf, DownloadError> {
        let mut writer = self
            .fs
            .create_writer(destination)
            .await
            .map_err(DownloadError::Transport)?;

        let response = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(DownloadError::Cancelled),
            response = self.fetcher.fetch(request_config) => response.map_err(DownloadError::Transport)?,
        };

        if !(200..300).contains(&response.status) {
            return Err(DownloadError::HttpStatus(response.status));
        }

        let mut body = response.body;
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(DownloadError::Cancelled),
                chunk = body.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            writer.write_all(&bytes).await.map_err(|e| DownloadError::Transport(e.into()))?;
                        }
                        Some(Err(e)) => return Err(DownloadError::Transport(e)),
                        None => break,
                    }
                }
            }
        }

        writer.flush().await.map_err(|e| DownloadError::Transport(e.into()))?;
        debug!("download complete: {}", destination.display());
        Ok(destination.to_path_buf())
    }

    async fn remove_current(&self, destination: &Path) {
        let mut state = self.state.lock().await;
        if state.current.remove(destination).is_none() {
            warn!("remove_current: no record for {}", destination.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::fetcher::test_support::{ScriptedFetcher, ScriptedResponse};
    use crate::fs::test_support::InMemoryFileSystem;
    use crate::manifest::request_config_with_url;

    fn make_engine(
        fs: InMemoryFileSystem,
        fetcher: ScriptedFetcher,
        clock: Arc<FakeClock>,
        abandoned_timeout: Duration,
    ) -> Engine {
        Engine::new(
            Arc::new(fs),
            Arc::new(fetcher),
            clock,
            Arc::new(DownloadLogRegistry::new()),
            abandoned_timeout,
        )
    }

    #[tokio::test]
    async fn successful_download_writes_full_body() {
        let fs = InMemoryFileSystem::new();
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok {
            status: 200,
            body: b"hello world".to_vec(),
        }]);
        let clock = Arc::new(FakeClock::new(0));
        let fs_clone = fs.clone();
        let engine = make_engine(fs, fetcher, clock, Duration::from_secs(60));

        let dest = PathBuf::from("/w/a.bin");
        let rc = request_config_with_url(None, "http://h/a.bin");
        let result = engine.start(dest.clone(), rc, StartOptions::default()).await;

        assert_eq!(result.unwrap(), dest);
        assert_eq!(fs_clone.read_file(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn non_2xx_status_fails_and_removes_partial_file() {
        let fs = InMemoryFileSystem::new();
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok {
            status: 404,
            body: b"not found".to_vec(),
        }]);
        let clock = Arc::new(FakeClock::new(0));
        let fs_clone = fs.clone();
        let engine = make_engine(fs, fetcher, clock, Duration::from_secs(60));

        let dest = PathBuf::from("/w/a.bin");
        let rc = request_config_with_url(None, "http://h/a.bin");
        let err = engine.start(dest.clone(), rc, StartOptions::default()).await.unwrap_err();

        assert!(matches!(err, DownloadError::HttpStatus(404)));
        assert!(fs_clone.read_file(&dest).is_none());
    }

    #[tokio::test]
    async fn duplicate_in_flight_is_rejected() {
        let fs = InMemoryFileSystem::new();
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok {
            status: 200,
            body: b"data".to_vec(),
        }]);
        let clock = Arc::new(FakeClock::new(0));
        let engine = make_engine(fs, fetcher, clock, Duration::from_secs(60));

        // Manually occupy the destination to simulate a still-running transfer.
        {
            let mut state = engine.state.lock().await;
            state.current.insert(
                PathBuf::from("/w/a.bin"),
                DownloadRecord {
                    start_time: engine.clock.now(),
                },
            );
        }

        let rc = request_config_with_url(None, "http://h/a.bin");
        let err = engine
            .start(PathBuf::from("/w/a.bin"), rc, StartOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Duplicate(_)));
    }

    #[tokio::test]
    async fn abandoned_record_is_evicted_and_partial_file_removed() {
        let fs = InMemoryFileSystem::new();
        let dest = PathBuf::from("/w/a.bin");
        fs.put_file(&dest, b"partial".to_vec());
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok {
            status: 200,
            body: b"fresh".to_vec(),
        }]);
        let clock = Arc::new(FakeClock::new(0));
        let fs_clone = fs.clone();
        let engine = make_engine(fs, fetcher, clock.clone(), Duration::from_millis(100));

        {
            let mut state = engine.state.lock().await;
            state.current.insert(
                dest.clone(),
                DownloadRecord {
                    start_time: engine.clock.now(),
                },
            );
        }
        clock.advance(Duration::from_millis(200));

        let rc = request_config_with_url(None, "http://h/a.bin");
        let err = engine.start(dest.clone(), rc.clone(), StartOptions::default()).await.unwrap_err();
        assert!(matches!(err, DownloadError::Abandoned(_)));
        assert!(fs_clone.read_file(&dest).is_none());

        // A subsequent Start proceeds normally.
        let result = engine.start(dest.clone(), rc, StartOptions::default()).await;
        assert_eq!(result.unwrap(), dest);
    }

    #[tokio::test]
    async fn scheduled_download_waits_then_runs() {
        let fs = InMemoryFileSystem::new();
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok {
            status: 200,
            body: b"data".to_vec(),
        }]);
        let clock = Arc::new(FakeClock::new(0));
        let fs_clone = fs.clone();
        let engine = make_engine(fs, fetcher, clock.clone(), Duration::from_secs(60));

        let dest = PathBuf::from("/w/a.bin");
        let rc = request_config_with_url(None, "http://h/a.bin");
        let options = StartOptions {
            delay_in_seconds: Some(30),
            on_new_download: None,
        };
        let result = engine.start(dest.clone(), rc, options).await;
        assert_eq!(result.unwrap(), dest);
        assert_eq!(fs_clone.read_file(&dest).unwrap(), b"data");
        assert_eq!(clock.sleeps.lock().unwrap().as_slice(), &[Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn duplicate_scheduled_reports_remaining_seconds() {
        let fs = InMemoryFileSystem::new();
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok {
            status: 200,
            body: b"data".to_vec(),
        }]);
        let clock = Arc::new(FakeClock::new(0));
        let engine = make_engine(fs, fetcher, clock, Duration::from_secs(60));

        let dest = PathBuf::from("/w/a.bin");
        {
            let mut state = engine.state.lock().await;
            state.scheduled.insert(
                dest.clone(),
                ScheduledRecord {
                    fire_at: engine.clock.now() + Duration::from_secs(42),
                    cancel: tokio::spawn(async {}).abort_handle(),
                },
            );
        }

        let rc = request_config_with_url(None, "http://h/a.bin");
        let options = StartOptions {
            delay_in_seconds: Some(10),
            on_new_download: None,
        };
        let err = engine.start(dest, rc, options).await.unwrap_err();
        match err {
            DownloadError::DuplicateScheduled(_, remaining) => assert_eq!(remaining, 42),
            other => panic!("expected DuplicateScheduled, got {other:?}"),
        }
    }
}
