//! # Source Resolution
//!
//! Offline-first lookup of a verse's audio. Tiers are tried in a fixed order
//! and the first non-empty file wins:
//!
//! 1. `<storage>/recitations/<reciter>/SSSAAA.<ext>`
//! 2. `<storage>/<legacy_dir>/<reciter>/SSSAAA.<ext>`
//! 3. `<assets>/quran_audio/<reciter>/SSSAAA.<ext>` (returned relative to the assets root)
//! 4. the reciter's remote URL

use crate::error::Result;
use crate::traits::VerseUrlProvider;
use crate::verse::{ReciterId, VerseCountTable, VerseRef};
use bridge_traits::storage::FileSystemAccess;
use core_runtime::config::{CoreConfig, StorageLayout};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a verse's audio will be read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", content = "location")]
pub enum DataSource {
    LocalPrimary(PathBuf),
    LocalLegacy(PathBuf),
    /// Path relative to the bundled assets root.
    BundledAsset(PathBuf),
    Remote(String),
}

impl DataSource {
    pub fn is_remote(&self) -> bool {
        matches!(self, DataSource::Remote(_))
    }

    pub fn is_local(&self) -> bool {
        matches!(
            self,
            DataSource::LocalPrimary(_) | DataSource::LocalLegacy(_)
        )
    }

    pub fn tier_name(&self) -> &'static str {
        match self {
            DataSource::LocalPrimary(_) => "local_primary",
            DataSource::LocalLegacy(_) => "local_legacy",
            DataSource::BundledAsset(_) => "bundled_asset",
            DataSource::Remote(_) => "remote",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tier_name())
    }
}

/// Ranked source lookup for `(reciter, verse)`.
pub struct SourceResolver {
    fs: Arc<dyn FileSystemAccess>,
    url_provider: Arc<dyn VerseUrlProvider>,
    verse_counts: VerseCountTable,
    recitations_dir: PathBuf,
    legacy_dir: PathBuf,
    assets_root: PathBuf,
    asset_audio_dir: String,
    audio_extension: String,
    prepared_dirs: Mutex<HashSet<PathBuf>>,
}

impl SourceResolver {
    pub fn new(
        storage_root: impl AsRef<Path>,
        assets_root: impl Into<PathBuf>,
        layout: &StorageLayout,
        fs: Arc<dyn FileSystemAccess>,
        url_provider: Arc<dyn VerseUrlProvider>,
    ) -> Self {
        let storage_root = storage_root.as_ref();
        Self {
            fs,
            url_provider,
            verse_counts: VerseCountTable::default(),
            recitations_dir: storage_root.join(&layout.recitations_dir),
            legacy_dir: storage_root.join(&layout.legacy_audio_dir),
            assets_root: assets_root.into(),
            asset_audio_dir: layout.asset_audio_dir.clone(),
            audio_extension: layout.audio_extension.clone(),
            prepared_dirs: Mutex::new(HashSet::new()),
        }
    }

    /// Resolver over the roots and filesystem bridge of `config`.
    pub fn from_config(config: &CoreConfig, url_provider: Arc<dyn VerseUrlProvider>) -> Self {
        Self::new(
            &config.storage_root,
            config.assets_root.clone(),
            &config.layout,
            config.file_system.clone(),
            url_provider,
        )
    }

    pub fn with_verse_counts(mut self, verse_counts: VerseCountTable) -> Self {
        self.verse_counts = verse_counts;
        self
    }

    /// Resolves the best available source. Fails only for verses outside
    /// the corpus.
    pub async fn resolve(&self, reciter: &ReciterId, verse: VerseRef) -> Result<DataSource> {
        self.verse_counts.validate(verse.surah, verse.verse)?;

        let primary = self.primary_path(reciter, verse).await;
        if self.fs.is_non_empty_file(&primary).await {
            debug!(%verse, tier = "local_primary", "Resolved verse audio");
            return Ok(DataSource::LocalPrimary(primary));
        }

        let legacy = self.legacy_path(reciter, verse);
        if self.fs.is_non_empty_file(&legacy).await {
            debug!(%verse, tier = "local_legacy", "Resolved verse audio");
            return Ok(DataSource::LocalLegacy(legacy));
        }

        let relative = self.asset_relative_path(reciter, verse);
        if self.fs.is_non_empty_file(&self.assets_root.join(&relative)).await {
            debug!(%verse, tier = "bundled_asset", "Resolved verse audio");
            return Ok(DataSource::BundledAsset(relative));
        }

        let url = self.url_provider.verse_url(reciter, verse);
        debug!(%verse, tier = "remote", "Resolved verse audio");
        Ok(DataSource::Remote(url))
    }

    /// Destination of the primary tier. Creates the reciter directory the
    /// first time it is built.
    pub async fn primary_path(&self, reciter: &ReciterId, verse: VerseRef) -> PathBuf {
        let dir = self.recitations_dir.join(reciter.safe_dir_token());

        let first_use = self.prepared_dirs.lock().insert(dir.clone());
        if first_use {
            if let Err(e) = self.fs.create_dir_all(&dir).await {
                warn!(error = %e, reciter = %reciter, "Failed to create recitation directory");
                self.prepared_dirs.lock().remove(&dir);
            }
        }

        dir.join(verse.file_name(&self.audio_extension))
    }

    /// True when tier 1 or tier 2 holds a non-empty file.
    pub async fn has_local_copy(&self, reciter: &ReciterId, verse: VerseRef) -> bool {
        let primary = self.primary_path(reciter, verse).await;
        if self.fs.is_non_empty_file(&primary).await {
            return true;
        }
        self.fs
            .is_non_empty_file(&self.legacy_path(reciter, verse))
            .await
    }

    /// URL of the remote tier, regardless of local copies.
    pub fn remote_url(&self, reciter: &ReciterId, verse: VerseRef) -> String {
        self.url_provider.verse_url(reciter, verse)
    }

    pub fn verse_counts(&self) -> &VerseCountTable {
        &self.verse_counts
    }

    fn legacy_path(&self, reciter: &ReciterId, verse: VerseRef) -> PathBuf {
        self.legacy_dir
            .join(reciter.safe_dir_token())
            .join(verse.file_name(&self.audio_extension))
    }

    fn asset_relative_path(&self, reciter: &ReciterId, verse: VerseRef) -> PathBuf {
        Path::new(&self.asset_audio_dir)
            .join(reciter.safe_dir_token())
            .join(verse.file_name(&self.audio_extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_tiers() {
        let remote = DataSource::Remote("https://cdn/verse.mp3".into());
        assert!(remote.is_remote());
        assert!(!remote.is_local());
        assert_eq!(remote.tier_name(), "remote");

        let legacy = DataSource::LocalLegacy(PathBuf::from("/data/quran_audio/a/001001.mp3"));
        assert!(legacy.is_local());
        assert_eq!(legacy.to_string(), "local_legacy");

        let asset = DataSource::BundledAsset(PathBuf::from("quran_audio/a/001001.mp3"));
        assert!(!asset.is_local());
        assert!(!asset.is_remote());
    }
}
