//! # Playback Engine
//!
//! Drives the host's single [`MediaRenderer`] through single-verse, page and
//! range playback.
//!
//! ## State Machine
//!
//! ```text
//! Idle ──start──▶ Preparing ──Ready──▶ Playing ──pause──▶ Paused
//!   ▲                 │                   │  ◀──resume──────┘
//!   │                 └──Error──┐         ├──Completed──▶ next item | Idle
//!   └──────── stop ─────────────┴─────────┴──Error──────▶ skip | Idle
//! ```
//!
//! Every request sent to the renderer carries a [`SessionToken`]. Renderer
//! events come back through [`PlaybackEngine::handle_event`]; an event whose
//! token is no longer current is dropped.
//!
//! The state mutex is only held for synchronous transitions. Renderer calls
//! go through a separate async gate that re-checks the token, so a request
//! computed for an abandoned item never reaches the renderer.

mod state;

pub use state::{EngineSnapshot, PlaybackMode, PlaybackState};

use crate::cacher::AudioCacher;
use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::notice::RemoteNotice;
use crate::preferences::{PreferenceStore, SavedRange};
use crate::queue::{PageQueue, QueueStep};
use crate::repeat::{RangeRepeat, RangeStep, RepeatMode, RepeatSetting, VerseRepeatStep};
use crate::session::{SessionCounter, SessionToken};
use crate::source::{DataSource, SourceResolver};
use crate::traits::{MediaRenderer, RendererEvent, VerseCatalog};
use crate::verse::{ReciterId, VerseRef};
use bridge_traits::sink::ProgressSink;
use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::Mutex;
use state::{ActiveItem, EngineState};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Collaborators the engine is built from.
#[derive(Clone)]
pub struct EngineComponents {
    pub renderer: Arc<dyn MediaRenderer>,
    pub resolver: Arc<SourceResolver>,
    pub catalog: Arc<dyn VerseCatalog>,
    pub cacher: Arc<dyn AudioCacher>,
    pub sink: Arc<dyn ProgressSink>,
    pub settings: Arc<dyn SettingsStore>,
    pub clock: Arc<dyn Clock>,
}

/// Next move computed under the state lock and executed outside it.
#[derive(Debug)]
enum Step {
    Play {
        after: SessionToken,
        verse: VerseRef,
        reciter: ReciterId,
        navigate: bool,
    },
    LoadPage {
        after: SessionToken,
        page: u32,
        reciter: ReciterId,
    },
    Finish {
        token: SessionToken,
        outcome: Outcome,
    },
    /// Nothing to do until the renderer reports back.
    Wait,
}

#[derive(Debug)]
enum Outcome {
    Completed,
    Failed { verse: VerseRef, message: String },
}

#[derive(Debug)]
enum RendererCommand {
    Prepare(DataSource),
    Start,
    Pause,
    Resume,
    Stop,
}

impl RendererCommand {
    /// Phase the engine must still be in when a transport command reaches
    /// the renderer.
    fn required_phase(&self) -> Option<PlaybackState> {
        match self {
            RendererCommand::Start | RendererCommand::Resume => Some(PlaybackState::Playing),
            RendererCommand::Pause => Some(PlaybackState::Paused),
            RendererCommand::Prepare(_) | RendererCommand::Stop => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopScope {
    All,
    Single,
    Sequential,
    Range,
}

/// Verse playback state machine.
pub struct PlaybackEngine {
    renderer: Arc<dyn MediaRenderer>,
    resolver: Arc<SourceResolver>,
    catalog: Arc<dyn VerseCatalog>,
    cacher: Arc<dyn AudioCacher>,
    sink: Arc<dyn ProgressSink>,
    preferences: PreferenceStore,
    notice: RemoteNotice,
    config: PlaybackConfig,
    session: SessionCounter,
    state: Mutex<EngineState>,
    renderer_gate: tokio::sync::Mutex<()>,
    event_bus: Option<Arc<EventBus>>,
}

impl PlaybackEngine {
    /// Builds the engine and restores persisted preferences.
    ///
    /// Reads the reciter, repeat mode and counts, auto-continue flag, last
    /// verse and last range. Missing keys fall back to `config`.
    pub async fn load(components: EngineComponents, config: PlaybackConfig) -> Result<Self> {
        config.validate().map_err(PlaybackError::Config)?;

        let preferences = PreferenceStore::new(components.settings);
        let stored = preferences.load().await?;

        let reciter = stored
            .reciter
            .unwrap_or_else(|| config.default_reciter.clone());
        let auto_continue = stored.auto_continue.unwrap_or(config.default_auto_continue);

        let mut state = EngineState::new(reciter, stored.repeat.into_mode(), auto_continue);
        state.last_verse = stored
            .last_verse
            .filter(|v| config.verse_counts.contains(*v));
        state.last_range = stored.last_range;

        info!(
            reciter = %state.reciter,
            repeat = ?state.repeat,
            auto_continue,
            "Playback engine loaded"
        );

        Ok(Self {
            renderer: components.renderer,
            resolver: components.resolver,
            catalog: components.catalog,
            cacher: components.cacher,
            sink: components.sink,
            preferences,
            notice: RemoteNotice::new(components.clock, config.remote_notice_cooldown),
            config,
            session: SessionCounter::new(),
            state: Mutex::new(state),
            renderer_gate: tokio::sync::Mutex::new(()),
            event_bus: None,
        })
    }

    /// Set event bus for playback events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    // ========================================================================
    // User Actions
    // ========================================================================

    /// Plays one verse and returns to `Idle` when it ends.
    ///
    /// Cancels page and range playback. Failures after this call returns are
    /// reported through `on_playback_failed`.
    #[instrument(skip(self))]
    pub async fn play_single_verse(&self, verse: VerseRef, reciter: ReciterId) -> Result<()> {
        let verse = self.config.verse_counts.validate(verse.surah, verse.verse)?;

        let token = {
            let mut state = self.state.lock();
            state.end_range();
            state.reset_transport();
            state.mode = Some(PlaybackMode::Single);
            state.phase = PlaybackState::Preparing;
            self.session.advance()
        };

        self.drive(Step::Play {
            after: token,
            verse,
            reciter,
            navigate: false,
        })
        .await;
        Ok(())
    }

    /// Verse tap. Stops `verse` when it is already the single verse playing,
    /// otherwise plays it. Returns `true` when playback was started.
    #[instrument(skip(self))]
    pub async fn toggle_single_verse(&self, verse: VerseRef, reciter: ReciterId) -> Result<bool> {
        let verse = self.config.verse_counts.validate(verse.surah, verse.verse)?;

        let same_verse = {
            let state = self.state.lock();
            state.mode == Some(PlaybackMode::Single)
                && state.phase != PlaybackState::Idle
                && state.active.as_ref().is_some_and(|a| a.verse == verse)
        };

        if same_verse {
            self.stop_single_playback().await?;
            return Ok(false);
        }

        self.play_single_verse(verse, reciter).await?;
        Ok(true)
    }

    /// Plays `page` verse by verse.
    ///
    /// Starts at the first verse when `from_start` is set, otherwise at the
    /// last played verse if it is on this page.
    #[instrument(skip(self))]
    pub async fn start_page_playback(
        &self,
        page: u32,
        reciter: ReciterId,
        from_start: bool,
    ) -> Result<()> {
        if page == 0 || page > self.config.total_pages {
            return Err(PlaybackError::InvalidPage(page));
        }

        let (token, resume_at) = {
            let mut state = self.state.lock();
            state.end_range();
            state.reset_transport();
            state.mode = Some(PlaybackMode::Page);
            state.phase = PlaybackState::Preparing;
            let resume_at = if from_start { None } else { state.last_verse };
            (self.session.advance(), resume_at)
        };

        self.send(token, RendererCommand::Stop).await;

        match self.open_page(token, page, &reciter, resume_at).await {
            Ok(Some(first)) => {
                self.drive(Step::Play {
                    after: token,
                    verse: first,
                    reciter,
                    navigate: false,
                })
                .await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                warn!(page, error = %e, "Page playback could not start");
                self.finish(token, Outcome::Completed).await;
                Err(e)
            }
        }
    }

    /// Pauses the active item. While preparing, the item is held paused once
    /// it becomes ready.
    #[instrument(skip(self))]
    pub async fn pause_page_playback(&self) -> Result<()> {
        let target = {
            let mut state = self.state.lock();
            match state.phase {
                PlaybackState::Playing => {
                    state.phase = PlaybackState::Paused;
                    Some((
                        state.active.as_ref().map(|a| a.token),
                        state.active.as_ref().map(|a| a.verse),
                    ))
                }
                PlaybackState::Preparing if !state.pause_pending => {
                    state.pause_pending = true;
                    Some((None, state.active.as_ref().map(|a| a.verse)))
                }
                _ => None,
            }
        };

        let Some((token, verse)) = target else {
            return Ok(());
        };

        if let Some(token) = token {
            if let Some(Err(e)) = self.send(token, RendererCommand::Pause).await {
                warn!(error = %e, "Renderer failed to pause");
            }
        }

        self.sink.on_playback_paused();
        if let Some(verse) = verse {
            self.emit(PlaybackEvent::Paused {
                surah: verse.surah,
                verse: verse.verse,
            });
        }
        Ok(())
    }

    /// Resumes a paused item. Returns `false` when nothing was paused.
    #[instrument(skip(self))]
    pub async fn resume_page_playback(&self) -> Result<bool> {
        let target = {
            let mut state = self.state.lock();
            match state.phase {
                PlaybackState::Paused => {
                    state.phase = PlaybackState::Playing;
                    Some((
                        state.active.as_ref().map(|a| a.token),
                        state.active.as_ref().map(|a| a.verse),
                    ))
                }
                PlaybackState::Preparing if state.pause_pending => {
                    state.pause_pending = false;
                    Some((None, state.active.as_ref().map(|a| a.verse)))
                }
                _ => None,
            }
        };

        let Some((token, verse)) = target else {
            return Ok(false);
        };

        if let Some(token) = token {
            if let Some(Err(e)) = self.send(token, RendererCommand::Resume).await {
                warn!(error = %e, "Renderer failed to resume");
                let step = self.item_failed(token, e.to_string());
                self.drive(step).await;
                return Ok(false);
            }
        }

        self.sink.on_playback_resumed();
        if let Some(verse) = verse {
            self.emit(PlaybackEvent::Resumed {
                surah: verse.surah,
                verse: verse.verse,
            });
        }
        Ok(true)
    }

    /// Play/pause button. Returns `true` when playback is running afterwards.
    #[instrument(skip(self))]
    pub async fn toggle_play_pause(&self, page: u32, reciter: ReciterId) -> Result<bool> {
        let (single_active, running) = {
            let state = self.state.lock();
            let single_active =
                state.mode == Some(PlaybackMode::Single) && state.phase != PlaybackState::Idle;
            let running = match state.phase {
                PlaybackState::Playing => true,
                PlaybackState::Preparing => !state.pause_pending,
                _ => false,
            };
            (single_active, running)
        };

        if single_active {
            self.stop_single_playback().await?;
        } else if running {
            self.pause_page_playback().await?;
            return Ok(false);
        }

        if self.resume_page_playback().await? {
            return Ok(true);
        }

        self.start_page_playback(page, reciter, false).await?;
        Ok(true)
    }

    /// Repeats `from..=to` of `surah` `times` times, then stops.
    ///
    /// Bounds are ordered and clamped into the surah; `times` is clamped to
    /// `1..=99`. Auto-continue is off for the duration of the range.
    #[instrument(skip(self))]
    pub async fn start_range_repeat(
        &self,
        surah: u16,
        from: u16,
        to: u16,
        times: u32,
        reciter: ReciterId,
    ) -> Result<()> {
        let range = RangeRepeat::new(
            surah,
            from,
            to,
            i64::from(times),
            reciter.clone(),
            &self.config.verse_counts,
        )
        .ok_or(PlaybackError::InvalidVerse { surah, verse: from })?;

        if let Err(e) = self.preferences.save_range(&range).await {
            warn!(error = %e, "Failed to persist range");
        }

        let first = range.current();
        let token = {
            let mut state = self.state.lock();
            state.reset_transport();
            if state.saved_auto_continue.is_none() {
                state.saved_auto_continue = Some(state.auto_continue);
            }
            state.auto_continue = false;
            state.last_range = Some(SavedRange {
                surah: range.surah,
                from: range.start_verse,
                to: range.end_verse,
                times: range.loops_left,
            });
            state.repeat = RepeatMode::RangeRepeat(range);
            state.mode = Some(PlaybackMode::Range);
            state.phase = PlaybackState::Preparing;
            self.session.advance()
        };

        info!(%first, "Range repeat started");
        self.drive(Step::Play {
            after: token,
            verse: first,
            reciter,
            navigate: true,
        })
        .await;
        Ok(())
    }

    /// Ends an active range and restores auto-continue. No-op otherwise.
    #[instrument(skip(self))]
    pub async fn cancel_range_repeat(&self) -> Result<()> {
        if self.halt(StopScope::Range).await {
            info!("Range repeat cancelled");
        }
        Ok(())
    }

    /// Stops everything, including an active range.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) -> Result<()> {
        self.halt(StopScope::All).await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop_single_playback(&self) -> Result<()> {
        self.halt(StopScope::Single).await;
        Ok(())
    }

    /// Stops page playback and range playback.
    #[instrument(skip(self))]
    pub async fn stop_sequential_playback(&self) -> Result<()> {
        self.halt(StopScope::Sequential).await;
        Ok(())
    }

    // ========================================================================
    // Preferences
    // ========================================================================

    /// Selects page or verse repeat (or none). Supersedes an active range.
    #[instrument(skip(self))]
    pub async fn set_repeat_mode(&self, setting: RepeatSetting) -> Result<()> {
        let setting = setting.clamped();

        let range_active = self.state.lock().repeat.is_range();
        if range_active {
            self.halt(StopScope::Range).await;
        }

        {
            let mut state = self.state.lock();
            state.repeat = setting.into_mode();
            state.verse_repeat.reset();
        }

        self.preferences.save_repeat(setting).await
    }

    /// While a range is active the value is applied when the range ends.
    #[instrument(skip(self))]
    pub async fn set_auto_continue(&self, enabled: bool) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.saved_auto_continue.is_some() {
                state.saved_auto_continue = Some(enabled);
            } else {
                state.auto_continue = enabled;
            }
        }

        self.preferences.save_auto_continue(enabled).await
    }

    /// Switches reciter; stops all playback and drops the queue.
    #[instrument(skip(self))]
    pub async fn select_reciter(&self, reciter: ReciterId) -> Result<()> {
        self.halt(StopScope::All).await;
        self.state.lock().reciter = reciter.clone();
        self.preferences.save_reciter(&reciter).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.lock().snapshot()
    }

    pub fn is_playing(&self) -> bool {
        let playing = self.state.lock().phase == PlaybackState::Playing;
        playing && self.renderer.is_playing()
    }

    pub fn current_page(&self) -> Option<u32> {
        self.state.lock().current_page
    }

    pub fn reciter(&self) -> ReciterId {
        self.state.lock().reciter.clone()
    }

    pub fn total_pages(&self) -> u32 {
        self.config.total_pages
    }

    // ========================================================================
    // Renderer Events
    // ========================================================================

    /// Single entry point for renderer notifications.
    ///
    /// Events for a token that is no longer current are ignored.
    pub async fn handle_event(&self, token: SessionToken, event: RendererEvent) {
        let step = match event {
            RendererEvent::Ready => self.item_ready(token).await,
            RendererEvent::Completed => self.item_completed(token),
            RendererEvent::Error(message) => self.item_failed(token, message),
        };
        self.drive(step).await;
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn drive(&self, mut step: Step) {
        loop {
            step = match step {
                Step::Play {
                    after,
                    verse,
                    reciter,
                    navigate,
                } => self.begin_item(after, verse, reciter, navigate).await,
                Step::LoadPage {
                    after,
                    page,
                    reciter,
                } => match self.open_page(after, page, &reciter, None).await {
                    Ok(Some(first)) => Step::Play {
                        after,
                        verse: first,
                        reciter,
                        navigate: true,
                    },
                    Ok(None) => Step::Wait,
                    Err(e) => {
                        warn!(page, error = %e, "Auto-continue stopped");
                        Step::Finish {
                            token: after,
                            outcome: Outcome::Completed,
                        }
                    }
                },
                Step::Finish { token, outcome } => {
                    self.finish(token, outcome).await;
                    return;
                }
                Step::Wait => return,
            };
        }
    }

    /// Resolves and prepares one verse under a fresh token.
    async fn begin_item(
        &self,
        after: SessionToken,
        verse: VerseRef,
        reciter: ReciterId,
        navigate: bool,
    ) -> Step {
        let token = {
            let mut state = self.state.lock();
            let Some(token) = self.session.advance_from(after) else {
                debug!(%verse, "Superseded before preparing");
                return Step::Wait;
            };
            state.phase = PlaybackState::Preparing;
            state.active = Some(ActiveItem {
                token,
                verse,
                reciter: reciter.clone(),
                source: None,
                navigate,
            });
            token
        };

        let source = match self.resolver.resolve(&reciter, verse).await {
            Ok(source) => source,
            Err(e) => return self.item_failed(token, e.to_string()),
        };

        {
            let mut state = self.state.lock();
            if !self.session.is_current(token) {
                return Step::Wait;
            }
            if let Some(active) = state.active.as_mut() {
                active.source = Some(source.clone());
            }
        }

        if source.is_remote() {
            self.emit(PlaybackEvent::RemoteFallback {
                surah: verse.surah,
                verse: verse.verse,
            });
            if self.notice.should_notify() {
                self.sink.on_remote_fallback_used();
            }
        }

        debug!(%verse, %token, tier = source.tier_name(), "Preparing verse");
        match self.send(token, RendererCommand::Prepare(source)).await {
            Some(Err(e)) => self.item_failed(token, e.to_string()),
            _ => Step::Wait,
        }
    }

    /// Loads a page into the queue. `Ok(None)` when superseded.
    async fn open_page(
        &self,
        token: SessionToken,
        page: u32,
        reciter: &ReciterId,
        resume_at: Option<VerseRef>,
    ) -> Result<Option<VerseRef>> {
        {
            let mut state = self.state.lock();
            if !self.session.is_current(token) {
                return Ok(None);
            }
            state.phase = PlaybackState::Preparing;
            state.mode = Some(PlaybackMode::Page);
            state.current_page = Some(page);
        }

        let verses = self.catalog.verses_on_page(page).await?;

        let mut state = self.state.lock();
        if !self.session.is_current(token) {
            return Ok(None);
        }

        let mut queue = PageQueue::new(page, reciter.clone(), verses)?;
        let first = queue.seek_to(resume_at);
        debug!(page, verses = queue.len(), start = queue.index(), "Page queue loaded");
        state.queue = Some(queue);
        Ok(Some(first))
    }

    async fn item_ready(&self, token: SessionToken) -> Step {
        let (active, held, mode) = {
            let mut state = self.state.lock();
            if !self.session.is_current(token)
                || !state.owns(token)
                || state.phase != PlaybackState::Preparing
            {
                debug!(%token, "Ignoring stale ready event");
                return Step::Wait;
            }
            let Some(active) = state.active.clone() else {
                return Step::Wait;
            };

            let held = std::mem::take(&mut state.pause_pending);
            state.phase = if held {
                PlaybackState::Paused
            } else {
                PlaybackState::Playing
            };
            state.last_verse = Some(active.verse);
            (active, held, state.mode)
        };

        if !held {
            match self.send(token, RendererCommand::Start).await {
                // Paused before the start went out; the item is still ours.
                None if self.still_owns(token) => {}
                None => return Step::Wait,
                Some(Err(e)) => return self.item_failed(token, e.to_string()),
                Some(Ok(())) => {}
            }
        }

        let verse = active.verse;
        let text = self.catalog.verse_text(verse).await.unwrap_or_default();
        if !self.still_owns(token) {
            debug!(%token, %verse, "Item superseded while loading text");
            return Step::Wait;
        }

        self.sink.on_now_playing(verse.surah, verse.verse, &text);
        self.sink.on_verse_focus(verse.surah, verse.verse, active.navigate);

        let source = active.source.clone();
        self.emit(PlaybackEvent::Started {
            surah: verse.surah,
            verse: verse.verse,
            reciter: active.reciter.to_string(),
            source: source
                .as_ref()
                .map(|s| s.tier_name().to_string())
                .unwrap_or_default(),
        });

        if let Err(e) = self.preferences.save_last_verse(verse).await {
            warn!(error = %e, "Failed to persist last verse");
        }

        if mode == Some(PlaybackMode::Range) {
            match self.catalog.page_for_verse(verse).await {
                Ok(Some(page)) => {
                    let mut state = self.state.lock();
                    if state.owns(token) {
                        state.current_page = Some(page);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, %verse, "No page for verse"),
            }
        }

        if let Some(DataSource::Remote(url)) = source {
            if !self.resolver.has_local_copy(&active.reciter, verse).await {
                let destination = self.resolver.primary_path(&active.reciter, verse).await;
                self.cacher.cache_in_background(url, destination);
            }
        }

        Step::Wait
    }

    fn item_completed(&self, token: SessionToken) -> Step {
        let mut state = self.state.lock();
        if !self.session.is_current(token)
            || !state.owns(token)
            || state.phase != PlaybackState::Playing
        {
            debug!(%token, "Ignoring stale completion");
            return Step::Wait;
        }
        let Some(active) = state.active.clone() else {
            return Step::Wait;
        };

        self.emit(PlaybackEvent::Completed {
            surah: active.verse.surah,
            verse: active.verse.verse,
        });

        match state.mode {
            Some(PlaybackMode::Page) => {
                if let Some(count) = state.repeat.verse_repeat_count() {
                    if state.verse_repeat.record_completion(active.verse, count)
                        == VerseRepeatStep::Replay
                    {
                        return Step::Play {
                            after: token,
                            verse: active.verse,
                            reciter: active.reciter,
                            navigate: false,
                        };
                    }
                }
                self.next_in_queue(&mut state, token)
            }
            Some(PlaybackMode::Range) => self.next_in_range(&mut state, token),
            Some(PlaybackMode::Single) | None => Step::Finish {
                token,
                outcome: Outcome::Completed,
            },
        }
    }

    fn item_failed(&self, token: SessionToken, message: String) -> Step {
        let mut state = self.state.lock();
        if !self.session.is_current(token) || !state.owns(token) {
            debug!(%token, "Ignoring stale error");
            return Step::Wait;
        }
        let Some(active) = state.active.clone() else {
            return Step::Wait;
        };

        warn!(verse = %active.verse, error = %message, "Verse playback failed");

        match state.mode {
            Some(PlaybackMode::Page) | Some(PlaybackMode::Range) => {
                self.emit(PlaybackEvent::Skipped {
                    surah: active.verse.surah,
                    verse: active.verse.verse,
                    reason: message,
                });
                state.verse_repeat.reset();
                if state.mode == Some(PlaybackMode::Page) {
                    self.next_in_queue(&mut state, token)
                } else {
                    self.next_in_range(&mut state, token)
                }
            }
            Some(PlaybackMode::Single) | None => Step::Finish {
                token,
                outcome: Outcome::Failed {
                    verse: active.verse,
                    message,
                },
            },
        }
    }

    fn next_in_queue(&self, state: &mut EngineState, token: SessionToken) -> Step {
        let page_repeat = state.repeat.page_repeat_count();
        let auto_continue = state.auto_continue;
        let Some(queue) = state.queue.as_mut() else {
            return Step::Finish {
                token,
                outcome: Outcome::Completed,
            };
        };

        match queue.advance(page_repeat) {
            QueueStep::Play(verse) | QueueStep::RepeatPage(verse) => {
                Step::Play {
                    after: token,
                    verse,
                    reciter: queue.reciter().clone(),
                    navigate: false,
                }
            }
            QueueStep::Exhausted => {
                let next = queue.page() + 1;
                if auto_continue && next <= self.config.total_pages {
                    debug!(page = next, "Continuing to next page");
                    Step::LoadPage {
                        after: token,
                        page: next,
                        reciter: queue.reciter().clone(),
                    }
                } else {
                    Step::Finish {
                        token,
                        outcome: Outcome::Completed,
                    }
                }
            }
        }
    }

    fn next_in_range(&self, state: &mut EngineState, token: SessionToken) -> Step {
        let RepeatMode::RangeRepeat(range) = &mut state.repeat else {
            return Step::Finish {
                token,
                outcome: Outcome::Completed,
            };
        };

        match range.advance() {
            RangeStep::Next(verse) | RangeStep::Restart(verse) => Step::Play {
                after: token,
                verse,
                reciter: range.reciter.clone(),
                navigate: true,
            },
            RangeStep::Finished => {
                info!("Range repeat finished");
                Step::Finish {
                    token,
                    outcome: Outcome::Completed,
                }
            }
        }
    }

    /// Terminal step of a run that ended on its own.
    async fn finish(&self, token: SessionToken, outcome: Outcome) {
        {
            let mut state = self.state.lock();
            if !self.session.is_current(token) {
                return;
            }
            state.end_range();
            state.reset_transport();
        }

        if let Some(Err(e)) = self.send(token, RendererCommand::Stop).await {
            debug!(error = %e, "Renderer failed to stop");
        }

        if let Outcome::Failed { verse, message } = outcome {
            self.sink.on_playback_failed(&message);
            self.emit(PlaybackEvent::Failed {
                surah: verse.surah,
                verse: verse.verse,
                message,
            });
        }

        self.sink.on_playback_stopped();
        self.emit(PlaybackEvent::Stopped);
    }

    /// User-requested stop. Returns whether anything matched `scope`.
    async fn halt(&self, scope: StopScope) -> bool {
        let token = {
            let mut state = self.state.lock();
            let matches = match scope {
                StopScope::All => true,
                StopScope::Single => state.mode == Some(PlaybackMode::Single),
                StopScope::Sequential => matches!(
                    state.mode,
                    Some(PlaybackMode::Page) | Some(PlaybackMode::Range)
                ),
                StopScope::Range => {
                    state.repeat.is_range() || state.mode == Some(PlaybackMode::Range)
                }
            };
            if !matches {
                return false;
            }

            if scope != StopScope::Single {
                state.end_range();
            }
            state.reset_transport();
            self.session.advance()
        };

        if let Some(Err(e)) = self.send(token, RendererCommand::Stop).await {
            debug!(error = %e, "Renderer failed to stop");
        }

        self.sink.on_playback_stopped();
        self.emit(PlaybackEvent::Stopped);
        true
    }

    fn still_owns(&self, token: SessionToken) -> bool {
        self.session.is_current(token) && self.state.lock().owns(token)
    }

    /// Issues a renderer call if `token` is still current and, for transport
    /// commands, the phase has not moved on while waiting for the gate.
    async fn send(&self, token: SessionToken, command: RendererCommand) -> Option<Result<()>> {
        let _gate = self.renderer_gate.lock().await;
        if !self.session.is_current(token) {
            debug!(%token, ?command, "Dropping renderer command for stale session");
            return None;
        }
        if let Some(required) = command.required_phase() {
            let phase = self.state.lock().phase;
            if phase != required {
                debug!(
                    %token,
                    ?command,
                    ?phase,
                    "Dropping renderer command overtaken by transport change"
                );
                return None;
            }
        }

        Some(match command {
            RendererCommand::Prepare(source) => self.renderer.prepare(token, source).await,
            RendererCommand::Start => self.renderer.start().await,
            RendererCommand::Pause => self.renderer.pause().await,
            RendererCommand::Resume => self.renderer.resume().await,
            RendererCommand::Stop => self.renderer.stop().await,
        })
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Playback(event));
        }
    }
}
