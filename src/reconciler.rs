//! Reconciliation Loop and Public API (spec.md §4.6, §6).
//!
//! Shaped like the installer's top-level orchestrator
//! (`installer::Installer::run`, which wires together config, a
//! `tokio::time`-driven progress loop and per-step worker pools) but
//! generalized to a periodic ticker over an arbitrary manifest instead of a
//! one-shot modlist install.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::{find_missing, purge};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncerOptions;
use crate::download::{AttemptOutcome, DownloadLog, DownloadLogRegistry, Engine, RetryCoordinator, StartOptions};
use crate::error::DownloadError;
use crate::extractor::{Extractor, ZipExtractor};
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::manifest::{request_config_with_url, Manifest, ManifestEntry};
use crate::postprocess::post_process;

struct Inner {
    options: SyncerOptions,
    fs: Arc<dyn FileSystem>,
    extractor: Arc<dyn Extractor>,
    clock: Arc<dyn Clock>,
    engine: Engine,
    coordinator: RetryCoordinator,
    log: Arc<DownloadLogRegistry>,
    manifest: Mutex<Manifest>,
    downloads: Mutex<Vec<JoinHandle<()>>>,
}

/// Public entry point: construction, the periodic reconciliation loop, and
/// ad-hoc downloads.
#[derive(Clone)]
pub struct Syncer {
    inner: Arc<Inner>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Syncer {
    /// Builds a `Syncer` backed by real collaborators (`tokio::fs`,
    /// `reqwest`, the `zip` crate, the system clock).
    pub fn new(options: SyncerOptions) -> anyhow::Result<Self> {
        options.validate()?;
        Ok(Self::with_collaborators(
            options,
            Arc::new(TokioFileSystem),
            Arc::new(HttpFetcher::new()?),
            Arc::new(ZipExtractor),
            Arc::new(SystemClock),
        ))
    }

    /// Builds a `Syncer` over caller-supplied collaborators, for tests or
    /// alternative transports/extraction formats. Does not validate
    /// `options`; callers that accept untrusted manifests should call
    /// [`SyncerOptions::validate`] themselves.
    pub fn with_collaborators(
        options: SyncerOptions,
        fs: Arc<dyn FileSystem>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn Extractor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let log = Arc::new(DownloadLogRegistry::new());
        let engine = Engine::new(fs.clone(), fetcher, clock.clone(), log.clone(), options.abandoned_timeout);
        let coordinator = RetryCoordinator::new(engine.clone(), log.clone(), clock.clone(), options.default_retry_limit);
        let manifest = Mutex::new(options.download_manifest.clone());

        Self {
            inner: Arc::new(Inner {
                options,
                fs,
                extractor,
                clock,
                engine,
                coordinator,
                log,
                manifest,
                downloads: Mutex::new(Vec::new()),
            }),
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    /// Starts the periodic reconciliation loop. Idempotent: a second call
    /// replaces the prior ticker cleanly rather than running two loops.
    pub async fn init(&self) {
        info!(interval_ms = self.inner.options.interval.as_millis() as u64, "starting reconciliation loop");

        if let Err(e) = self.inner.fs.create_dir_all(&self.inner.options.working_directory).await {
            warn!("failed to create working directory {}: {e}", self.inner.options.working_directory.display());
        }

        if !self.inner.options.disable_immediate_download {
            self.reap_finished_downloads().await;
            let handles = self.tick().await;
            self.track_downloads(handles).await;
        }

        let syncer = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                syncer.inner.clock.sleep(syncer.inner.options.interval).await;
                let handles = syncer.tick().await;
                syncer.track_downloads(handles).await;
            }
        });

        let mut ticker = self.ticker.lock().await;
        if let Some(previous) = ticker.replace(handle) {
            previous.abort();
        }
    }

    /// Runs one reconciliation pass: refresh manifest, inspect cache,
    /// non-blocking initiate per missing entry, then purge. Per spec.md §5,
    /// purge observes the manifest, not download outcomes, so it runs
    /// immediately after initiating downloads rather than waiting for them.
    /// Returns the join handles for the downloads this tick spawned, so a
    /// caller that cares about completion (tests, `Close`) can await them.
    pub async fn tick(&self) -> Vec<JoinHandle<()>> {
        if let Err(e) = self.inner.fs.create_dir_all(&self.inner.options.working_directory).await {
            warn!("failed to create working directory {}: {e}", self.inner.options.working_directory.display());
        }

        if let Some(provider) = &self.inner.options.get_manifest {
            match provider.get_manifest().await {
                Ok(fresh) => {
                    *self.inner.manifest.lock().await = fresh;
                }
                Err(e) => {
                    warn!("get_manifest failed, skipping tick: {e}");
                    return Vec::new();
                }
            }
        }

        let manifest = self.inner.manifest.lock().await.clone();
        let missing = find_missing(
            self.inner.fs.as_ref(),
            &self.inner.options.working_directory,
            &manifest,
            self.inner.options.disable_unzip,
        )
        .await;

        debug!(missing = missing.len(), "cache inspection complete");

        let mut handles = Vec::with_capacity(missing.len());
        for entry in missing {
            handles.push(self.spawn_download(entry));
        }

        let stats = purge(self.inner.fs.as_ref(), &self.inner.options.working_directory, &manifest).await;
        if stats.removed > 0 {
            info!(removed = stats.removed, "purged orphaned cache entries");
        }

        handles
    }

    fn spawn_download(&self, entry: ManifestEntry) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let destination = entry.destination(&inner.options.working_directory);
            let request_config = request_config_with_url(entry.request_config.as_ref(), &entry.url);

            // Recomputed from the *current* retry count on every attempt
            // (spec.md §4.4 step 3), not fixed once up front.
            let get_download_delay = inner.options.get_download_delay.clone();
            let entry_delay = entry.delay_in_seconds;
            let default_delay = inner.options.default_delay_in_seconds;
            let delay_fn = move |retries: u32| {
                get_download_delay
                    .as_ref()
                    .map(|f| f(retries))
                    .unwrap_or_else(|| entry_delay.unwrap_or(default_delay))
            };

            let outcome = inner
                .coordinator
                .run(
                    &destination,
                    request_config,
                    entry.retry_limit,
                    delay_fn,
                    None,
                )
                .await;

            match outcome {
                AttemptOutcome::Succeeded => {
                    let now = inner.clock.now_millis();
                    post_process(
                        inner.fs.as_ref(),
                        inner.extractor.as_ref(),
                        &inner.options.working_directory,
                        &entry,
                        &destination,
                        now,
                        inner.options.disable_unzip,
                    )
                    .await;
                }
                AttemptOutcome::RetriesExhausted => {
                    error!("giving up on {} after exhausting retries", destination.display());
                }
                AttemptOutcome::Cancelled => {
                    debug!("download for {} cancelled", destination.display());
                }
            }
        })
    }

    async fn track_downloads(&self, handles: Vec<JoinHandle<()>>) {
        let mut downloads = self.inner.downloads.lock().await;
        downloads.extend(handles);
    }

    async fn reap_finished_downloads(&self) {
        let mut downloads = self.inner.downloads.lock().await;
        downloads.retain(|h| !h.is_finished());
    }

    /// Ad-hoc download outside the reconciliation loop; forwards directly
    /// to the Download Engine (no retry, no post-processing), per spec.md
    /// §6.
    pub async fn start(
        &self,
        destination: PathBuf,
        request_config: crate::manifest::RequestConfig,
        options: StartOptions,
    ) -> Result<PathBuf, DownloadError> {
        self.inner.engine.start(destination, request_config, options).await
    }

    /// Stops the ticker, cancels all scheduled timers, and waits for every
    /// in-flight transfer (cancelled cooperatively) to finish cleaning up.
    pub async fn close(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }

        self.inner.engine.close().await;

        let handles = {
            let mut downloads = self.inner.downloads.lock().await;
            std::mem::take(&mut *downloads)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Snapshot of a destination's retry/attempt bookkeeping, if any attempt
    /// has been made for it yet.
    pub fn download_log(&self, destination: &std::path::Path) -> Option<DownloadLog> {
        self.inner.log.get(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::fetcher::test_support::{ScriptedFetcher, ScriptedResponse};
    use crate::fs::test_support::InMemoryFileSystem;
    use crate::extractor::test_support::RecordingExtractor;
    use futures::future::join_all;
    use std::time::Duration;

    fn syncer(
        fs: InMemoryFileSystem,
        fetcher: ScriptedFetcher,
        extractor: RecordingExtractor,
        clock: Arc<FakeClock>,
        manifest: Manifest,
    ) -> Syncer {
        let options = SyncerOptions {
            download_manifest: manifest,
            working_directory: PathBuf::from("/w"),
            default_delay_in_seconds: 0,
            disable_immediate_download: true,
            ..Default::default()
        };
        Syncer::with_collaborators(options, Arc::new(fs), Arc::new(fetcher), Arc::new(extractor), clock)
    }

    fn plain(url: &str) -> ManifestEntry {
        ManifestEntry {
            url: url.to_string(),
            file_name: None,
            unzip_to: None,
            delay_in_seconds: None,
            request_config: None,
            retry_limit: None,
        }
    }

    #[tokio::test]
    async fn cold_start_plain_file_downloads_and_resets_retries() {
        let fs = InMemoryFileSystem::new();
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok { status: 200, body: b"hello".to_vec() }]);
        let extractor = RecordingExtractor::new(vec![]);
        let clock = Arc::new(FakeClock::new(0));
        let fs_clone = fs.clone();

        let syncer = syncer(fs, fetcher, extractor, clock, vec![plain("http://h/a.bin")]);
        let handles = syncer.tick().await;
        join_all(handles).await;

        assert_eq!(fs_clone.read_file(&PathBuf::from("/w/a.bin")).unwrap(), b"hello");
        let log = syncer.download_log(&PathBuf::from("/w/a.bin")).unwrap();
        assert_eq!(log.retries, 0);
        assert!(log.downloaded_at.is_some());
    }

    #[tokio::test]
    async fn archive_extraction_end_to_end() {
        let fs = InMemoryFileSystem::new();
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok { status: 200, body: b"zip-bytes".to_vec() }]);
        let extractor = RecordingExtractor::with_fs(
            vec![
                ("f1".to_string(), b"one".to_vec()),
                ("f2".to_string(), b"two".to_vec()),
                (".hidden".to_string(), b"shh".to_vec()),
            ],
            Arc::new(fs.clone()),
        );
        let clock = Arc::new(FakeClock::new(0));
        let fs_clone = fs.clone();

        let entry = ManifestEntry {
            unzip_to: Some("p".to_string()),
            file_name: Some("p.zip".to_string()),
            ..plain("http://h/p.zip")
        };

        let syncer = syncer(fs, fetcher, extractor, clock, vec![entry]);
        let handles = syncer.tick().await;
        join_all(handles).await;

        assert!(!fs_clone.exists(&PathBuf::from("/w/p.zip")).await);
        let catalog_bytes = fs_clone.read_file(&PathBuf::from("/w/p/info.json")).unwrap();
        let catalog: crate::catalog::CatalogFile = serde_json::from_slice(&catalog_bytes).unwrap();
        let mut required = catalog.required_files.clone();
        required.sort();
        assert_eq!(required, vec!["f1".to_string(), "f2".to_string()]);
    }

    #[tokio::test]
    async fn purge_removes_orphans_alongside_a_download() {
        let fs = InMemoryFileSystem::new();
        fs.put_file(&PathBuf::from("/w/old.bin"), b"stale".to_vec());
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok { status: 200, body: b"data".to_vec() }]);
        let extractor = RecordingExtractor::new(vec![]);
        let clock = Arc::new(FakeClock::new(0));
        let fs_clone = fs.clone();

        let syncer = syncer(fs, fetcher, extractor, clock, vec![plain("http://h/keep.bin")]);
        let handles = syncer.tick().await;
        join_all(handles).await;

        assert!(!fs_clone.exists(&PathBuf::from("/w/old.bin")).await);
        assert_eq!(fs_clone.read_file(&PathBuf::from("/w/keep.bin")).unwrap(), b"data");
    }

    #[tokio::test]
    async fn idempotent_tick_when_everything_present() {
        let fs = InMemoryFileSystem::new();
        fs.put_file(&PathBuf::from("/w/a.bin"), b"already-here".to_vec());
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok { status: 200, body: b"should-not-be-used".to_vec() }]);
        let extractor = RecordingExtractor::new(vec![]);
        let clock = Arc::new(FakeClock::new(0));
        let fs_clone = fs.clone();

        let syncer = syncer(fs, fetcher, extractor, clock, vec![plain("http://h/a.bin")]);
        let handles = syncer.tick().await;
        assert!(handles.is_empty());
        assert_eq!(fs_clone.read_file(&PathBuf::from("/w/a.bin")).unwrap(), b"already-here");
    }

    #[tokio::test]
    async fn close_cancels_scheduled_timer() {
        let fs = InMemoryFileSystem::new();
        let fetcher = ScriptedFetcher::new(vec![ScriptedResponse::Ok { status: 200, body: b"data".to_vec() }]);
        let extractor = RecordingExtractor::new(vec![]);
        let clock = Arc::new(FakeClock::new(0));

        let syncer = syncer(fs, fetcher, extractor, clock, Vec::new());
        let dest = PathBuf::from("/w/a.bin");
        let rc = request_config_with_url(None, "http://h/a.bin");
        let options = StartOptions { delay_in_seconds: Some(30), on_new_download: None };

        let syncer_clone = syncer.clone();
        let handle = tokio::spawn(async move { syncer_clone.start(dest, rc, options).await });

        // Give the scheduling branch a moment to register before closing.
        tokio::task::yield_now().await;
        syncer.close().await;

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(DownloadError::Cancelled)) || result.is_ok());
    }

    #[tokio::test]
    async fn duration_default_options_are_sane() {
        let options = SyncerOptions::default();
        assert_eq!(options.default_retry_limit, 5);
        assert_eq!(options.interval, Duration::from_millis(60_000));
    }
}
