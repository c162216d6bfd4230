//! # Engine Registry & Remote Control
//!
//! Media-session style controls (headset buttons, notification actions) may
//! arrive while no reader is on screen. The host owns one [`EngineRegistry`]
//! for the lifetime of the process; a reader attaches its engine while it is
//! alive and the returned [`RegistrationGuard`] detaches it on drop.
//!
//! [`RemoteControl`] executes [`ControlCommand`]s against whichever engine is
//! attached. With nothing attached it asks the host to launch the reader once
//! and polls briefly for the engine to appear.

use crate::error::Result;
use core_playback::{PlaybackEngine, ReciterId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default number of polls in [`EngineRegistry::wait_for_engine`].
pub const DEFAULT_POLL_ATTEMPTS: u32 = 15;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Commands a media session can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    PlayPause,
    NextPage,
    PreviousPage,
    Stop,
}

/// Host hook that brings the reader up so it can attach an engine.
pub trait ReaderLauncher: Send + Sync {
    fn launch_reader(&self);
}

struct Registration {
    id: u64,
    engine: Arc<PlaybackEngine>,
}

/// Lifecycle-scoped slot for the active playback engine.
pub struct EngineRegistry {
    slot: Mutex<Option<Registration>>,
    next_id: AtomicU64,
    poll_attempts: u32,
    poll_interval: Duration,
}

impl EngineRegistry {
    pub fn new() -> Arc<Self> {
        Self::with_polling(DEFAULT_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_polling(attempts: u32, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
            poll_attempts: attempts,
            poll_interval: interval,
        })
    }

    /// Makes `engine` the active engine until the guard is dropped.
    ///
    /// A later attach replaces the earlier one; dropping the earlier guard
    /// then leaves the newer engine in place.
    pub fn attach(self: &Arc<Self>, engine: Arc<PlaybackEngine>) -> RegistrationGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .slot
            .lock()
            .replace(Registration { id, engine })
            .is_some();

        debug!(registration = id, replaced, "Engine attached");
        RegistrationGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    pub fn current(&self) -> Option<Arc<PlaybackEngine>> {
        self.slot.lock().as_ref().map(|r| Arc::clone(&r.engine))
    }

    pub fn is_attached(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Polls for an attached engine, giving up after the configured attempts.
    pub async fn wait_for_engine(&self) -> Option<Arc<PlaybackEngine>> {
        for attempt in 0..self.poll_attempts {
            if let Some(engine) = self.current() {
                return Some(engine);
            }
            debug!(attempt, "No engine attached yet");
            tokio::time::sleep(self.poll_interval).await;
        }
        self.current()
    }

    fn detach(&self, id: u64) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|r| r.id == id) {
            *slot = None;
            debug!(registration = id, "Engine detached");
        }
    }
}

/// Detaches its engine from the registry when dropped.
#[must_use = "the engine is detached as soon as the guard is dropped"]
pub struct RegistrationGuard {
    registry: Arc<EngineRegistry>,
    id: u64,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.detach(self.id);
    }
}

#[derive(Debug, Default)]
struct ControlTarget {
    page: Option<u32>,
    reciter: Option<ReciterId>,
}

/// Executes media-session commands against the attached engine.
pub struct RemoteControl {
    registry: Arc<EngineRegistry>,
    launcher: Option<Arc<dyn ReaderLauncher>>,
    target: Mutex<ControlTarget>,
}

impl RemoteControl {
    pub fn new(registry: Arc<EngineRegistry>) -> Self {
        Self {
            registry,
            launcher: None,
            target: Mutex::new(ControlTarget::default()),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ReaderLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Records the page on screen and the selected reciter.
    ///
    /// Page commands act on this page rather than the engine's last played
    /// one, so hosts call it on every page turn, including turns requested by
    /// `on_verse_focus` navigation.
    pub fn remember(&self, page: u32, reciter: ReciterId) {
        let mut target = self.target.lock();
        target.page = Some(page);
        target.reciter = Some(reciter);
    }

    pub fn remembered_page(&self) -> Option<u32> {
        self.target.lock().page
    }

    /// Runs `command`. Returns `Ok(false)` when no engine became available.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, command: ControlCommand) -> Result<bool> {
        let Some(engine) = self.resolve_engine().await else {
            warn!(?command, "No playback engine attached; command dropped");
            return Ok(false);
        };

        match command {
            ControlCommand::PlayPause => {
                let (page, reciter) = self.target_for(&engine);
                let running = engine.toggle_play_pause(page, reciter).await?;
                info!(page, running, "Remote play/pause");
            }
            ControlCommand::NextPage => self.turn_page(&engine, 1).await?,
            ControlCommand::PreviousPage => self.turn_page(&engine, -1).await?,
            ControlCommand::Stop => {
                engine.stop_all().await?;
                info!("Remote stop");
            }
        }
        Ok(true)
    }

    async fn resolve_engine(&self) -> Option<Arc<PlaybackEngine>> {
        if let Some(engine) = self.registry.current() {
            return Some(engine);
        }

        if let Some(launcher) = &self.launcher {
            debug!("Launching reader for remote command");
            launcher.launch_reader();
        }
        self.registry.wait_for_engine().await
    }

    fn target_for(&self, engine: &PlaybackEngine) -> (u32, ReciterId) {
        let target = self.target.lock();
        let page = target.page.or_else(|| engine.current_page()).unwrap_or(1);
        let reciter = target.reciter.clone().unwrap_or_else(|| engine.reciter());
        (page, reciter)
    }

    async fn turn_page(&self, engine: &PlaybackEngine, delta: i64) -> Result<()> {
        let (page, reciter) = self.target_for(engine);
        let last = i64::from(engine.total_pages().max(1));
        let next = (i64::from(page) + delta).clamp(1, last) as u32;

        self.target.lock().page = Some(next);
        engine.start_page_playback(next, reciter, true).await?;
        info!(from = page, to = next, "Remote page turn");
        Ok(())
    }
}
