//! # Bulk Prefetch Coordinator
//!
//! Downloads every page image of the corpus once, so the reader works
//! offline afterwards.
//!
//! ## Workflow
//!
//! 1. Spawn `parallelism` workers sharing an atomic page cursor
//! 2. Each worker claims the next page and runs it through [`PageFetcher`]
//! 3. Successes are counted; progress is reported every few successes
//! 4. After all workers finish (or the join timeout elapses) the success
//!    ratio decides whether the cache is marked complete
//!
//! `pause()`, `resume()` and `cancel()` act on the active run. Workers look
//! at the pause flag and the cancellation token before every page.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = Arc::new(BulkPrefetchCoordinator::from_core(&core, sink, config)?);
//! if !coordinator.is_cache_complete().await {
//!     let report = coordinator.run().await?;
//!     println!("{} of {} pages", report.succeeded, report.total);
//! }
//! ```

use crate::config::PrefetchConfig;
use crate::control::RunControl;
use crate::error::{PrefetchError, Result};
use crate::fetcher::PageFetcher;
use crate::progress::{ProgressCounter, ProgressSnapshot};
use bridge_traits::http::HttpClient;
use bridge_traits::sink::ProgressSink;
use bridge_traits::storage::{FileSystemAccess, SettingsStore};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::config::{CoreConfig, StorageLayout};
use core_runtime::events::{CoreEvent, EventBus, PrefetchEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Settings key set once the page cache is complete.
pub const PAGES_CACHED_KEY: &str = "pages_cached";

/// Collaborators the coordinator is built from.
#[derive(Clone)]
pub struct PrefetchComponents {
    pub http: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub settings: Arc<dyn SettingsStore>,
    pub sink: Arc<dyn ProgressSink>,
    pub clock: Arc<dyn Clock>,
}

impl PrefetchComponents {
    pub fn from_core(core: &CoreConfig, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            http: core.http_client.clone(),
            file_system: core.file_system.clone(),
            settings: core.settings_store.clone(),
            sink,
            clock: core.clock.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PrefetchOutcome {
    /// The success threshold was met and the cache marked complete.
    Completed,
    PartiallyFailed { missing: u32 },
    Cancelled,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefetchReport {
    pub outcome: PrefetchOutcome,
    pub succeeded: u32,
    pub failed: u32,
    pub total: u32,
    pub duration: Duration,
    /// The workers were still busy when the join timeout elapsed.
    pub timed_out: bool,
}

impl PrefetchReport {
    pub fn is_success(&self) -> bool {
        self.outcome == PrefetchOutcome::Completed
    }

    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.succeeded) / f64::from(self.total)
    }
}

/// The active run, shared by the coordinator and its workers.
struct ActiveRun {
    control: RunControl,
    counter: ProgressCounter,
    started_at: DateTime<Utc>,
}

/// Clears the active run slot when `run` returns or is dropped.
struct ActiveSlot<'a> {
    slot: &'a Mutex<Option<Arc<ActiveRun>>>,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

/// Worker-side view of a run.
struct Worker {
    id: usize,
    run: Arc<ActiveRun>,
    fetcher: Arc<PageFetcher>,
    cursor: Arc<AtomicU32>,
    reporter: Arc<Reporter>,
    progress_every: u32,
    pause_poll_interval: Duration,
}

impl Worker {
    async fn work(self) {
        let total = self.run.counter.total();
        let mut pause = self.run.control.pause.waiter();

        loop {
            if self.run.control.is_cancelled() {
                break;
            }
            if !pause
                .wait_while_paused(&self.run.control.cancel, self.pause_poll_interval)
                .await
            {
                break;
            }

            let page = self.cursor.fetch_add(1, Ordering::SeqCst);
            if page > total {
                break;
            }

            match self.fetcher.fetch(page).await {
                Ok(origin) => {
                    let succeeded = self.run.counter.record_success();
                    debug!(worker = self.id, page, ?origin, "Page ready");
                    if succeeded % self.progress_every == 0 {
                        self.reporter.progress(&self.run);
                    }
                }
                Err(e) => {
                    self.run.counter.record_failure();
                    warn!(worker = self.id, page, error = %e, "Page prefetch failed");
                }
            }
        }

        debug!(worker = self.id, "Prefetch worker finished");
    }
}

/// Progress fan-out to the host sink and the event bus.
struct Reporter {
    sink: Arc<dyn ProgressSink>,
    clock: Arc<dyn Clock>,
    event_bus: Option<Arc<EventBus>>,
}

impl Reporter {
    fn snapshot(&self, run: &ActiveRun) -> ProgressSnapshot {
        run.counter.snapshot(self.clock.elapsed_since(run.started_at))
    }

    fn progress(&self, run: &ActiveRun) {
        let snap = self.snapshot(run);
        self.sink.on_bulk_progress(snap.succeeded, snap.total, snap.eta_secs);
        self.emit(PrefetchEvent::Progress {
            succeeded: snap.succeeded,
            total: snap.total,
            eta_secs: snap.eta_secs,
        });
    }

    fn emit(&self, event: PrefetchEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Prefetch(event));
        }
    }
}

/// Bulk page image prefetcher.
pub struct BulkPrefetchCoordinator {
    fetcher: Arc<PageFetcher>,
    settings: Arc<dyn SettingsStore>,
    sink: Arc<dyn ProgressSink>,
    clock: Arc<dyn Clock>,
    config: PrefetchConfig,
    active: Mutex<Option<Arc<ActiveRun>>>,
    event_bus: Option<Arc<EventBus>>,
}

impl BulkPrefetchCoordinator {
    /// Creates a coordinator writing into `pages_dir`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `config` fails validation.
    pub fn new(
        components: PrefetchComponents,
        pages_dir: PathBuf,
        layout: StorageLayout,
        config: PrefetchConfig,
    ) -> Result<Self> {
        config.validate().map_err(PrefetchError::InvalidConfig)?;

        let fetcher = PageFetcher::new(
            components.http,
            components.file_system,
            components.clock.clone(),
            pages_dir,
            layout,
            &config,
        );

        Ok(Self {
            fetcher: Arc::new(fetcher),
            settings: components.settings,
            sink: components.sink,
            clock: components.clock,
            config,
            active: Mutex::new(None),
            event_bus: None,
        })
    }

    /// Coordinator over the bridges and page directory of `core`.
    pub fn from_core(
        core: &CoreConfig,
        sink: Arc<dyn ProgressSink>,
        config: PrefetchConfig,
    ) -> Result<Self> {
        Self::new(
            PrefetchComponents::from_core(core, sink),
            core.pages_dir(),
            core.layout.clone(),
            config,
        )
    }

    /// Set event bus for prefetch events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    pub fn page_path(&self, page: u32) -> PathBuf {
        self.fetcher.page_path(page)
    }

    /// Whether a previous run marked the cache complete.
    pub async fn is_cache_complete(&self) -> bool {
        match self.settings.get_bool(PAGES_CACHED_KEY).await {
            Ok(flag) => flag.unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "Failed to read page cache flag");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Progress of the active run.
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        let run = self.active.lock().clone()?;
        Some(self.reporter().snapshot(&run))
    }

    /// Pauses the active run. Returns `false` if there is none or it is
    /// already paused.
    pub fn pause(&self) -> bool {
        let Some(run) = self.active.lock().clone() else {
            return false;
        };
        let changed = run.control.pause.pause();
        if changed {
            info!(succeeded = run.counter.succeeded(), "Page prefetch paused");
        }
        changed
    }

    pub fn resume(&self) -> bool {
        let Some(run) = self.active.lock().clone() else {
            return false;
        };
        let changed = run.control.pause.resume();
        if changed {
            info!(succeeded = run.counter.succeeded(), "Page prefetch resumed");
        }
        changed
    }

    /// Cancels the active run. Pages already downloading finish on their own.
    pub fn cancel(&self) -> bool {
        let Some(run) = self.active.lock().clone() else {
            return false;
        };
        if run.control.is_cancelled() {
            return false;
        }
        run.control.cancel.cancel();
        info!(succeeded = run.counter.succeeded(), "Page prefetch cancelled");
        true
    }

    /// Fetches every page and waits for the workers.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if another run is active, `Storage` if the page
    /// directory cannot be created. Per-page failures are counted, not
    /// returned.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<PrefetchReport> {
        let run = {
            let mut active = self.active.lock();
            if active.is_some() {
                return Err(PrefetchError::AlreadyRunning);
            }
            let run = Arc::new(ActiveRun {
                control: RunControl::new(),
                counter: ProgressCounter::new(self.config.total_pages),
                started_at: self.clock.now(),
            });
            *active = Some(run.clone());
            run
        };
        let _slot = ActiveSlot { slot: &self.active };

        self.execute(run).await
    }

    async fn execute(&self, run: Arc<ActiveRun>) -> Result<PrefetchReport> {
        let total = self.config.total_pages;
        let parallelism = self.config.effective_parallelism();
        let reporter = Arc::new(self.reporter());

        self.fetcher.ensure_pages_dir().await?;

        info!(total, parallelism, "Bulk page prefetch started");
        reporter.emit(PrefetchEvent::Started {
            total,
            parallelism: parallelism as u32,
        });

        let cursor = Arc::new(AtomicU32::new(1));
        let mut workers = JoinSet::new();
        for id in 0..parallelism {
            let worker = Worker {
                id,
                run: run.clone(),
                fetcher: self.fetcher.clone(),
                cursor: cursor.clone(),
                reporter: reporter.clone(),
                progress_every: self.config.progress_every,
                pause_poll_interval: self.config.pause_poll_interval,
            };
            workers.spawn(worker.work());
        }

        let joined = tokio::time::timeout(self.config.join_timeout, async {
            while let Some(result) = workers.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "Prefetch worker aborted");
                }
            }
        })
        .await;

        let timed_out = joined.is_err();
        let cancelled = run.control.is_cancelled();
        if timed_out {
            warn!(
                timeout_secs = self.config.join_timeout.as_secs(),
                "Page prefetch timed out; reporting partial results"
            );
            run.control.cancel.cancel();
            workers.detach_all();
        }

        reporter.progress(&run);

        let succeeded = run.counter.succeeded();
        let failed = run.counter.failed();
        let duration = self.clock.elapsed_since(run.started_at);

        let outcome = if cancelled {
            info!(succeeded, total, "Page prefetch stopped by cancellation");
            reporter.emit(PrefetchEvent::Cancelled { succeeded, total });
            PrefetchOutcome::Cancelled
        } else {
            self.conclude(&reporter, succeeded, total, duration).await
        };

        Ok(PrefetchReport {
            outcome,
            succeeded,
            failed,
            total,
            duration,
            timed_out,
        })
    }

    /// Applies the success threshold and notifies the host.
    async fn conclude(
        &self,
        reporter: &Reporter,
        succeeded: u32,
        total: u32,
        duration: Duration,
    ) -> PrefetchOutcome {
        let ratio = f64::from(succeeded) / f64::from(total);

        if ratio >= self.config.success_threshold {
            if let Err(e) = self.settings.set_bool(PAGES_CACHED_KEY, true).await {
                warn!(error = %e, "Failed to persist page cache flag");
            }
            info!(
                succeeded,
                total,
                duration_secs = duration.as_secs(),
                "Page cache complete"
            );
            self.sink.on_bulk_finished(true, succeeded, total);
            reporter.emit(PrefetchEvent::Completed {
                succeeded,
                total,
                duration_secs: duration.as_secs(),
            });
            PrefetchOutcome::Completed
        } else {
            let missing = total.saturating_sub(succeeded);
            warn!(succeeded, total, missing, "Page prefetch incomplete");
            self.sink.on_bulk_finished(false, succeeded, total);
            reporter.emit(PrefetchEvent::PartiallyFailed {
                succeeded,
                total,
                missing,
            });
            PrefetchOutcome::PartiallyFailed { missing }
        }
    }

    fn reporter(&self) -> Reporter {
        Reporter {
            sink: self.sink.clone(),
            clock: self.clock.clone(),
            event_bus: self.event_bus.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_ratio() {
        let report = PrefetchReport {
            outcome: PrefetchOutcome::PartiallyFailed { missing: 61 },
            succeeded: 543,
            failed: 61,
            total: 604,
            duration: Duration::from_secs(90),
            timed_out: false,
        };
        assert!(!report.is_success());
        assert!(report.success_ratio() < 0.95);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&PrefetchOutcome::PartiallyFailed { missing: 3 }).unwrap();
        assert_eq!(json, r#"{"outcome":"partially_failed","missing":3}"#);
    }
}
