//! Corpus identifiers: verses, reciters and the verse-count table.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Number of surahs in the corpus.
pub const SURAH_COUNT: u16 = 114;

/// Verse counts per surah (Hafs numbering).
const HAFS_VERSE_COUNTS: [u16; SURAH_COUNT as usize] = [
    7, 286, 200, 176, 120, 165, 206, 75, 129, 109, 123, 111, 43, 52, 99, 128, 111, 110, 98, 135,
    112, 78, 118, 64, 77, 227, 93, 88, 69, 60, 34, 30, 73, 54, 45, 83, 182, 88, 75, 85, 54, 53,
    89, 59, 37, 35, 38, 29, 18, 45, 60, 49, 62, 55, 78, 96, 29, 22, 24, 13, 14, 11, 11, 18, 12,
    12, 30, 52, 52, 44, 28, 28, 20, 56, 40, 31, 50, 40, 46, 42, 29, 19, 36, 25, 22, 17, 19, 26,
    30, 20, 15, 21, 11, 8, 8, 19, 5, 8, 8, 11, 11, 8, 3, 9, 5, 4, 7, 3, 6, 3, 5, 4, 5, 6,
];

/// A single verse, addressed as `surah:verse`.
///
/// Construction does not validate; use [`VerseCountTable::validate`] for
/// values that come from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerseRef {
    pub surah: u16,
    pub verse: u16,
}

impl VerseRef {
    pub const fn new(surah: u16, verse: u16) -> Self {
        Self { surah, verse }
    }

    /// `SSSAAA`, e.g. `002255` for 2:255.
    pub fn file_stem(&self) -> String {
        format!("{:03}{:03}", self.surah, self.verse)
    }

    /// `SSSAAA.<ext>`
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.file_stem(), extension)
    }
}

impl fmt::Display for VerseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.surah, self.verse)
    }
}

/// Opaque reciter identifier as chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReciterId(String);

impl ReciterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory token used in every cache layout.
    ///
    /// Lowercased, whitespace mapped to `_`, anything outside `[a-z0-9_-]`
    /// dropped.
    pub fn safe_dir_token(&self) -> String {
        self.0
            .to_lowercase()
            .chars()
            .filter_map(|c| {
                if c.is_whitespace() {
                    Some('_')
                } else if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                    Some(c)
                } else {
                    None
                }
            })
            .collect()
    }
}

impl fmt::Display for ReciterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReciterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Verse count of every surah.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u16>", into = "Vec<u16>")]
pub struct VerseCountTable {
    counts: Arc<[u16]>,
}

impl VerseCountTable {
    /// The standard Hafs table (6236 verses).
    pub fn hafs() -> Self {
        Self {
            counts: Arc::from(&HAFS_VERSE_COUNTS[..]),
        }
    }

    /// Builds a table from explicit counts; exactly 114 non-zero entries.
    pub fn from_counts(counts: Vec<u16>) -> std::result::Result<Self, String> {
        if counts.len() != SURAH_COUNT as usize {
            return Err(format!(
                "Verse count table needs {} entries, got {}",
                SURAH_COUNT,
                counts.len()
            ));
        }

        if let Some(index) = counts.iter().position(|&c| c == 0) {
            return Err(format!("Surah {} has a verse count of 0", index + 1));
        }

        Ok(Self {
            counts: Arc::from(counts),
        })
    }

    pub fn verse_count(&self, surah: u16) -> Option<u16> {
        if surah == 0 {
            return None;
        }
        self.counts.get(usize::from(surah) - 1).copied()
    }

    pub fn total_verses(&self) -> u32 {
        self.counts.iter().map(|&c| u32::from(c)).sum()
    }

    pub fn contains(&self, verse: VerseRef) -> bool {
        self.verse_count(verse.surah)
            .is_some_and(|count| verse.verse >= 1 && verse.verse <= count)
    }

    /// Returns the verse if it exists, `InvalidVerse` otherwise.
    pub fn validate(&self, surah: u16, verse: u16) -> Result<VerseRef> {
        let candidate = VerseRef::new(surah, verse);
        if self.contains(candidate) {
            Ok(candidate)
        } else {
            Err(PlaybackError::InvalidVerse { surah, verse })
        }
    }

    /// Clamps `verse` into `1..=N(surah)`; `None` for an unknown surah.
    pub fn clamp_verse(&self, surah: u16, verse: u16) -> Option<u16> {
        self.verse_count(surah).map(|count| verse.clamp(1, count))
    }
}

impl Default for VerseCountTable {
    fn default() -> Self {
        Self::hafs()
    }
}

impl TryFrom<Vec<u16>> for VerseCountTable {
    type Error = String;

    fn try_from(value: Vec<u16>) -> std::result::Result<Self, Self::Error> {
        Self::from_counts(value)
    }
}

impl From<VerseCountTable> for Vec<u16> {
    fn from(table: VerseCountTable) -> Self {
        table.counts.to_vec()
    }
}
