//! Repeat modes and their counters.

use crate::verse::{ReciterId, VerseCountTable, VerseRef};
use serde::{Deserialize, Serialize};

pub const MIN_REPEAT_COUNT: u8 = 1;
pub const MAX_REPEAT_COUNT: u8 = 99;

/// Clamps a user-supplied count into `1..=99`.
pub fn clamp_repeat_count(count: i64) -> u8 {
    count.clamp(i64::from(MIN_REPEAT_COUNT), i64::from(MAX_REPEAT_COUNT)) as u8
}

/// The active repeat mode. Exactly one is in effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    Off,
    /// Play the whole page `count` times before moving on.
    PageRepeat { count: u8 },
    /// Play each verse `count` times before advancing.
    VerseRepeat { count: u8 },
    RangeRepeat(RangeRepeat),
}

impl RepeatMode {
    pub fn is_range(&self) -> bool {
        matches!(self, RepeatMode::RangeRepeat(_))
    }

    pub fn range(&self) -> Option<&RangeRepeat> {
        match self {
            RepeatMode::RangeRepeat(range) => Some(range),
            _ => None,
        }
    }

    pub fn page_repeat_count(&self) -> Option<u8> {
        match self {
            RepeatMode::PageRepeat { count } => Some(*count),
            _ => None,
        }
    }

    pub fn verse_repeat_count(&self) -> Option<u8> {
        match self {
            RepeatMode::VerseRepeat { count } => Some(*count),
            _ => None,
        }
    }
}

/// User-selectable repeat setting, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatSetting {
    Off,
    Page(u8),
    Verse(u8),
}

impl RepeatSetting {
    /// Stored value of `pref_repeat_mode`.
    pub fn code(&self) -> i64 {
        match self {
            RepeatSetting::Off => 0,
            RepeatSetting::Page(_) => 1,
            RepeatSetting::Verse(_) => 2,
        }
    }

    /// Rebuilds a setting from its stored code and counts. Unknown codes are `Off`.
    pub fn from_code(code: i64, page_count: u8, verse_count: u8) -> Self {
        match code {
            1 => RepeatSetting::Page(page_count),
            2 => RepeatSetting::Verse(verse_count),
            _ => RepeatSetting::Off,
        }
    }

    /// Same setting with its count clamped into range.
    pub fn clamped(self) -> Self {
        match self {
            RepeatSetting::Off => RepeatSetting::Off,
            RepeatSetting::Page(n) => RepeatSetting::Page(clamp_repeat_count(i64::from(n))),
            RepeatSetting::Verse(n) => RepeatSetting::Verse(clamp_repeat_count(i64::from(n))),
        }
    }

    pub fn into_mode(self) -> RepeatMode {
        match self.clamped() {
            RepeatSetting::Off => RepeatMode::Off,
            RepeatSetting::Page(count) => RepeatMode::PageRepeat { count },
            RepeatSetting::Verse(count) => RepeatMode::VerseRepeat { count },
        }
    }
}

/// Outcome of finishing one verse of a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStep {
    /// Play the next verse of the current loop.
    Next(VerseRef),
    /// A loop finished; start the next one from the first verse.
    Restart(VerseRef),
    /// All loops are done.
    Finished,
}

/// Repeat of an inclusive verse range within one surah.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRepeat {
    pub surah: u16,
    pub start_verse: u16,
    pub end_verse: u16,
    pub loops_left: u8,
    pub current_verse: u16,
    pub reciter: ReciterId,
}

impl RangeRepeat {
    /// Orders the bounds, clamps them into the surah and clamps `times`.
    ///
    /// Returns `None` for a surah outside the table.
    pub fn new(
        surah: u16,
        from: u16,
        to: u16,
        times: i64,
        reciter: ReciterId,
        table: &VerseCountTable,
    ) -> Option<Self> {
        let (low, high) = if from <= to { (from, to) } else { (to, from) };
        let start_verse = table.clamp_verse(surah, low)?;
        let end_verse = table.clamp_verse(surah, high)?;

        Some(Self {
            surah,
            start_verse,
            end_verse,
            loops_left: clamp_repeat_count(times),
            current_verse: start_verse,
            reciter,
        })
    }

    pub fn current(&self) -> VerseRef {
        VerseRef::new(self.surah, self.current_verse)
    }

    /// Moves past the current verse.
    pub fn advance(&mut self) -> RangeStep {
        if self.current_verse < self.end_verse {
            self.current_verse += 1;
            return RangeStep::Next(self.current());
        }

        self.loops_left = self.loops_left.saturating_sub(1);
        if self.loops_left > 0 {
            self.current_verse = self.start_verse;
            RangeStep::Restart(self.current())
        } else {
            RangeStep::Finished
        }
    }
}

/// Whether a completed verse is replayed under verse repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerseRepeatStep {
    Replay,
    Advance,
}

/// Counts consecutive plays of the same verse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerseRepeatTracker {
    last: Option<VerseRef>,
    played: u8,
}

impl VerseRepeatTracker {
    pub fn record_completion(&mut self, verse: VerseRef, count: u8) -> VerseRepeatStep {
        if self.last == Some(verse) {
            self.played = self.played.saturating_add(1);
        } else {
            self.last = Some(verse);
            self.played = 1;
        }

        if self.played >= count.max(1) {
            self.reset();
            VerseRepeatStep::Advance
        } else {
            VerseRepeatStep::Replay
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.played = 0;
    }
}
