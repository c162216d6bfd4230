//! Persisted playback preferences.
//!
//! Flat keys in the host [`SettingsStore`]; read once when the engine loads
//! and written on each user action that changes them.

use crate::error::Result;
use crate::repeat::{clamp_repeat_count, RangeRepeat, RepeatSetting};
use crate::verse::{ReciterId, VerseRef};
use bridge_traits::storage::SettingsStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod keys {
    pub const LAST_SURAH: &str = "last_surah";
    pub const LAST_AYAH: &str = "last_ayah";
    pub const RANGE_SURAH: &str = "range_surah";
    pub const RANGE_FROM: &str = "range_from";
    pub const RANGE_TO: &str = "range_to";
    pub const RANGE_TIMES: &str = "range_times";
    pub const QARI_ID: &str = "pref_qari_id";
    pub const REPEAT_MODE: &str = "pref_repeat_mode";
    pub const REPEAT_AYAH_COUNT: &str = "pref_repeat_ayah_count";
    pub const REPEAT_PAGE_COUNT: &str = "pref_repeat_page_count";
    pub const AUTO_CONTINUE: &str = "pref_auto_continue";
}

/// Last range the user repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRange {
    pub surah: u16,
    pub from: u16,
    pub to: u16,
    pub times: u8,
}

/// Everything read back at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPreferences {
    pub reciter: Option<ReciterId>,
    pub repeat: RepeatSetting,
    pub page_repeat_count: u8,
    pub verse_repeat_count: u8,
    pub auto_continue: Option<bool>,
    pub last_verse: Option<VerseRef>,
    pub last_range: Option<SavedRange>,
}

impl Default for StoredPreferences {
    fn default() -> Self {
        Self {
            reciter: None,
            repeat: RepeatSetting::Off,
            page_repeat_count: 1,
            verse_repeat_count: 1,
            auto_continue: None,
            last_verse: None,
            last_range: None,
        }
    }
}

/// Typed access to the playback keys.
#[derive(Clone)]
pub struct PreferenceStore {
    settings: Arc<dyn SettingsStore>,
}

impl PreferenceStore {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub async fn load(&self) -> Result<StoredPreferences> {
        let reciter = self
            .settings
            .get_string(keys::QARI_ID)
            .await?
            .filter(|id| !id.trim().is_empty())
            .map(ReciterId::new);

        let page_repeat_count = self.count(keys::REPEAT_PAGE_COUNT).await?;
        let verse_repeat_count = self.count(keys::REPEAT_AYAH_COUNT).await?;
        let repeat_code = self.settings.get_i64(keys::REPEAT_MODE).await?.unwrap_or(0);

        let last_verse = match (
            self.u16_value(keys::LAST_SURAH).await?,
            self.u16_value(keys::LAST_AYAH).await?,
        ) {
            (Some(surah), Some(verse)) => Some(VerseRef::new(surah, verse)),
            _ => None,
        };

        let last_range = match (
            self.u16_value(keys::RANGE_SURAH).await?,
            self.u16_value(keys::RANGE_FROM).await?,
            self.u16_value(keys::RANGE_TO).await?,
        ) {
            (Some(surah), Some(from), Some(to)) => Some(SavedRange {
                surah,
                from,
                to,
                times: self.count(keys::RANGE_TIMES).await?,
            }),
            _ => None,
        };

        Ok(StoredPreferences {
            reciter,
            repeat: RepeatSetting::from_code(repeat_code, page_repeat_count, verse_repeat_count),
            page_repeat_count,
            verse_repeat_count,
            auto_continue: self.settings.get_bool(keys::AUTO_CONTINUE).await?,
            last_verse,
            last_range,
        })
    }

    pub async fn save_last_verse(&self, verse: VerseRef) -> Result<()> {
        self.settings
            .set_i64(keys::LAST_SURAH, i64::from(verse.surah))
            .await?;
        self.settings
            .set_i64(keys::LAST_AYAH, i64::from(verse.verse))
            .await?;
        Ok(())
    }

    pub async fn save_range(&self, range: &RangeRepeat) -> Result<()> {
        self.settings
            .set_i64(keys::RANGE_SURAH, i64::from(range.surah))
            .await?;
        self.settings
            .set_i64(keys::RANGE_FROM, i64::from(range.start_verse))
            .await?;
        self.settings
            .set_i64(keys::RANGE_TO, i64::from(range.end_verse))
            .await?;
        self.settings
            .set_i64(keys::RANGE_TIMES, i64::from(range.loops_left))
            .await?;
        Ok(())
    }

    pub async fn save_reciter(&self, reciter: &ReciterId) -> Result<()> {
        self.settings
            .set_string(keys::QARI_ID, reciter.as_str())
            .await?;
        Ok(())
    }

    /// Writes the mode code and, for page/verse repeat, that mode's count.
    pub async fn save_repeat(&self, setting: RepeatSetting) -> Result<()> {
        self.settings
            .set_i64(keys::REPEAT_MODE, setting.code())
            .await?;

        match setting.clamped() {
            RepeatSetting::Off => {}
            RepeatSetting::Page(count) => {
                self.settings
                    .set_i64(keys::REPEAT_PAGE_COUNT, i64::from(count))
                    .await?;
            }
            RepeatSetting::Verse(count) => {
                self.settings
                    .set_i64(keys::REPEAT_AYAH_COUNT, i64::from(count))
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn save_auto_continue(&self, enabled: bool) -> Result<()> {
        self.settings
            .set_bool(keys::AUTO_CONTINUE, enabled)
            .await?;
        Ok(())
    }

    async fn count(&self, key: &str) -> Result<u8> {
        Ok(clamp_repeat_count(
            self.settings.get_i64(key).await?.unwrap_or(1),
        ))
    }

    async fn u16_value(&self, key: &str) -> Result<Option<u16>> {
        Ok(self
            .settings
            .get_i64(key)
            .await?
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| *v > 0))
    }
}
