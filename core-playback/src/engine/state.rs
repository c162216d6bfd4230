//! Engine state guarded by the engine mutex.

use crate::preferences::SavedRange;
use crate::queue::PageQueue;
use crate::repeat::{RepeatMode, VerseRepeatTracker};
use crate::session::SessionToken;
use crate::source::DataSource;
use crate::verse::{ReciterId, VerseRef};
use serde::{Deserialize, Serialize};

/// Transport state of the renderer as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Preparing,
    Playing,
    Paused,
}

/// Which kind of playback owns the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    Single,
    Page,
    Range,
}

/// Read-only view for hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub state: PlaybackState,
    pub mode: Option<PlaybackMode>,
    pub current_verse: Option<VerseRef>,
    pub source: Option<DataSource>,
    pub current_page: Option<u32>,
    /// `(index, len)` of the page queue.
    pub queue_position: Option<(usize, usize)>,
    pub reciter: ReciterId,
    pub repeat: RepeatMode,
    pub auto_continue: bool,
    pub last_verse: Option<VerseRef>,
    pub last_range: Option<SavedRange>,
}

/// The item handed to the renderer.
#[derive(Debug, Clone)]
pub(crate) struct ActiveItem {
    pub token: SessionToken,
    pub verse: VerseRef,
    pub reciter: ReciterId,
    pub source: Option<DataSource>,
    /// Ask the host to turn to the verse's page when it starts.
    pub navigate: bool,
}

#[derive(Debug)]
pub(crate) struct EngineState {
    pub phase: PlaybackState,
    pub mode: Option<PlaybackMode>,
    pub active: Option<ActiveItem>,
    pub pause_pending: bool,
    pub queue: Option<PageQueue>,
    pub repeat: RepeatMode,
    pub verse_repeat: VerseRepeatTracker,
    pub auto_continue: bool,
    /// Auto-continue value to restore when a range ends.
    pub saved_auto_continue: Option<bool>,
    pub reciter: ReciterId,
    pub last_verse: Option<VerseRef>,
    pub last_range: Option<SavedRange>,
    pub current_page: Option<u32>,
}

impl EngineState {
    pub fn new(reciter: ReciterId, repeat: RepeatMode, auto_continue: bool) -> Self {
        Self {
            phase: PlaybackState::Idle,
            mode: None,
            active: None,
            pause_pending: false,
            queue: None,
            repeat,
            verse_repeat: VerseRepeatTracker::default(),
            auto_continue,
            saved_auto_continue: None,
            reciter,
            last_verse: None,
            last_range: None,
            current_page: None,
        }
    }

    /// True if `token` belongs to the item currently handed to the renderer.
    pub fn owns(&self, token: SessionToken) -> bool {
        self.active.as_ref().is_some_and(|a| a.token == token)
    }

    /// Drops the range (if any), restores auto-continue and turns repeat off.
    ///
    /// Returns whether a range was active.
    pub fn end_range(&mut self) -> bool {
        if !self.repeat.is_range() && self.saved_auto_continue.is_none() {
            return false;
        }

        let was_range = self.repeat.is_range();
        if was_range {
            self.repeat = RepeatMode::Off;
        }
        if let Some(saved) = self.saved_auto_continue.take() {
            self.auto_continue = saved;
        }
        was_range
    }

    /// Back to `Idle` with no mode, item or queue.
    pub fn reset_transport(&mut self) {
        self.phase = PlaybackState::Idle;
        self.mode = None;
        self.active = None;
        self.pause_pending = false;
        self.queue = None;
        self.verse_repeat.reset();
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            state: self.phase,
            mode: self.mode,
            current_verse: self.active.as_ref().map(|a| a.verse),
            source: self.active.as_ref().and_then(|a| a.source.clone()),
            current_page: self.current_page,
            queue_position: self.queue.as_ref().map(|q| (q.index(), q.len())),
            reciter: self.reciter.clone(),
            repeat: self.repeat.clone(),
            auto_continue: self.auto_continue,
            last_verse: self.last_verse,
            last_range: self.last_range,
        }
    }
}
