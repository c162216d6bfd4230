//! # Playback Configuration
//!
//! Policy knobs of the playback engine.

use crate::verse::{ReciterId, VerseCountTable};
use core_runtime::config::{CoreConfig, DEFAULT_TOTAL_PAGES};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Minimum gap between two "playing from the network" notices.
    ///
    /// Default: 6 seconds.
    #[serde(default = "default_remote_notice_cooldown")]
    pub remote_notice_cooldown: Duration,

    /// Auto-continue to the next page when nothing is persisted.
    ///
    /// Default: true.
    #[serde(default = "default_auto_continue")]
    pub default_auto_continue: bool,

    /// Reciter used when none is persisted.
    #[serde(default = "default_reciter")]
    pub default_reciter: ReciterId,

    /// Last page of the corpus; auto-continue stops after it.
    ///
    /// Default: 604.
    #[serde(default = "default_total_pages")]
    pub total_pages: u32,

    #[serde(default)]
    pub verse_counts: VerseCountTable,
}

fn default_remote_notice_cooldown() -> Duration {
    Duration::from_secs(6)
}

fn default_auto_continue() -> bool {
    true
}

fn default_reciter() -> ReciterId {
    ReciterId::new("alafasy")
}

fn default_total_pages() -> u32 {
    DEFAULT_TOTAL_PAGES
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            remote_notice_cooldown: default_remote_notice_cooldown(),
            default_auto_continue: default_auto_continue(),
            default_reciter: default_reciter(),
            total_pages: default_total_pages(),
            verse_counts: VerseCountTable::default(),
        }
    }
}

impl PlaybackConfig {
    /// Defaults with the corpus size taken from `core`.
    pub fn from_core(core: &CoreConfig) -> Self {
        Self {
            total_pages: core.total_pages,
            ..Default::default()
        }
    }

    pub fn with_remote_notice_cooldown(mut self, cooldown: Duration) -> Self {
        self.remote_notice_cooldown = cooldown;
        self
    }

    pub fn with_default_auto_continue(mut self, enabled: bool) -> Self {
        self.default_auto_continue = enabled;
        self
    }

    pub fn with_default_reciter(mut self, reciter: ReciterId) -> Self {
        self.default_reciter = reciter;
        self
    }

    pub fn with_total_pages(mut self, pages: u32) -> Self {
        self.total_pages = pages;
        self
    }

    pub fn with_verse_counts(mut self, table: VerseCountTable) -> Self {
        self.verse_counts = table;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.total_pages == 0 {
            return Err("total_pages must be > 0".to_string());
        }

        if self.default_reciter.as_str().trim().is_empty() {
            return Err("default_reciter cannot be empty".to_string());
        }

        if self.default_reciter.safe_dir_token().is_empty() {
            return Err(format!(
                "default_reciter '{}' has no usable directory name",
                self.default_reciter
            ));
        }

        Ok(())
    }
}
