//! # Core Configuration Module
//!
//! Provides configuration management for the recitation core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! that holds the on-disk layout, the corpus size and every host bridge the
//! playback and prefetch crates need. It fails fast with actionable errors
//! when a required capability is missing.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - remote verse audio and page mirrors
//! - `FileSystemAccess` - cache reads, writes and renames
//! - `SettingsStore` - persisted playback preferences and the cache-complete flag
//!
//! `Clock` defaults to [`SystemClock`] on every platform.
//!
//! When the `desktop-shims` feature is enabled, `ReqwestHttpClient`,
//! `TokioFileSystem` and a `SqliteSettingsStore` at `<storage_root>/settings.db`
//! are injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .storage_root("/data/user/0/reader/files")
//!     .assets_root("/app/assets")
//!     .total_pages(604)
//!     .build()
//!     .expect("Failed to build config");
//!
//! let page = config.page_path(12);
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Missing assets root
//! let config = CoreConfig::builder()
//!     .storage_root("/tmp/reader")
//!     .build()
//!     .expect("Should fail - assets root is required");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, FileSystemAccess, HttpClient, SettingsStore, SystemClock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of pages in the standard Madani mushaf.
pub const DEFAULT_TOTAL_PAGES: u32 = 604;

/// Directory names and file extensions of the shared cache.
///
/// ```text
/// <storage>/recitations/<reciter>/002255.mp3   primary verse audio
/// <storage>/quran_audio/<reciter>/002255.mp3   legacy verse audio (read only)
/// <storage>/pages/page_12.webp                 prefetched page images
/// <assets>/quran_audio/<reciter>/002255.mp3    bundled verse audio
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLayout {
    #[serde(default = "default_recitations_dir")]
    pub recitations_dir: String,

    /// Older on-disk layout still searched before the network.
    #[serde(default = "default_legacy_audio_dir")]
    pub legacy_audio_dir: String,

    #[serde(default = "default_asset_audio_dir")]
    pub asset_audio_dir: String,

    #[serde(default = "default_pages_dir")]
    pub pages_dir: String,

    /// Without the leading dot.
    #[serde(default = "default_audio_extension")]
    pub audio_extension: String,

    #[serde(default = "default_image_extension")]
    pub image_extension: String,
}

fn default_recitations_dir() -> String {
    "recitations".to_string()
}

fn default_legacy_audio_dir() -> String {
    "quran_audio".to_string()
}

fn default_asset_audio_dir() -> String {
    "quran_audio".to_string()
}

fn default_pages_dir() -> String {
    "pages".to_string()
}

fn default_audio_extension() -> String {
    "mp3".to_string()
}

fn default_image_extension() -> String {
    "webp".to_string()
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            recitations_dir: default_recitations_dir(),
            legacy_audio_dir: default_legacy_audio_dir(),
            asset_audio_dir: default_asset_audio_dir(),
            pages_dir: default_pages_dir(),
            audio_extension: default_audio_extension(),
            image_extension: default_image_extension(),
        }
    }
}

impl StorageLayout {
    pub fn with_legacy_audio_dir(mut self, dir: impl Into<String>) -> Self {
        self.legacy_audio_dir = dir.into();
        self
    }

    pub fn with_audio_extension(mut self, ext: impl Into<String>) -> Self {
        self.audio_extension = ext.into();
        self
    }

    pub fn with_image_extension(mut self, ext: impl Into<String>) -> Self {
        self.image_extension = ext.into();
        self
    }

    /// File name of page `page` (`page_12.webp`).
    pub fn page_file_name(&self, page: u32) -> String {
        format!("page_{}.{}", page, self.image_extension)
    }

    /// Directory names must be single path components; extensions carry no dot.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let dirs = [
            ("recitations_dir", &self.recitations_dir),
            ("legacy_audio_dir", &self.legacy_audio_dir),
            ("asset_audio_dir", &self.asset_audio_dir),
            ("pages_dir", &self.pages_dir),
        ];
        for (name, value) in dirs {
            if value.is_empty() {
                return Err(format!("{} cannot be empty", name));
            }
            if value.contains('/') || value.contains('\\') || value == ".." {
                return Err(format!("{} must be a single directory name", name));
            }
        }

        for (name, value) in [
            ("audio_extension", &self.audio_extension),
            ("image_extension", &self.image_extension),
        ] {
            if value.is_empty() || value.starts_with('.') {
                return Err(format!("{} must be non-empty and without a leading dot", name));
            }
        }

        if self.recitations_dir == self.pages_dir {
            return Err("recitations_dir and pages_dir must differ".to_string());
        }

        Ok(())
    }
}

/// Core configuration for the recitation core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Writable application storage (cache root).
    pub storage_root: PathBuf,

    /// Read-only bundled assets root.
    pub assets_root: PathBuf,

    /// Corpus size for prefetch and page auto-continue.
    pub total_pages: u32,

    pub layout: StorageLayout,

    pub http_client: Arc<dyn HttpClient>,

    pub file_system: Arc<dyn FileSystemAccess>,

    pub settings_store: Arc<dyn SettingsStore>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("storage_root", &self.storage_root)
            .field("assets_root", &self.assets_root)
            .field("total_pages", &self.total_pages)
            .field("layout", &self.layout)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Storage and assets roots are not empty and differ
    /// - Page count is within `1..=10_000`
    /// - The storage layout is well formed
    pub fn validate(&self) -> Result<()> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(Error::Config("Storage root cannot be empty".to_string()));
        }

        if self.assets_root.as_os_str().is_empty() {
            return Err(Error::Config("Assets root cannot be empty".to_string()));
        }

        if self.storage_root == self.assets_root {
            return Err(Error::Config(
                "Storage root and assets root must be different directories".to_string(),
            ));
        }

        if self.total_pages == 0 {
            return Err(Error::Config(
                "Total pages must be greater than 0".to_string(),
            ));
        }

        if self.total_pages > 10_000 {
            return Err(Error::Config(
                "Total pages exceeds maximum of 10,000".to_string(),
            ));
        }

        self.layout
            .validate()
            .map_err(|e| Error::Config(format!("Invalid storage layout: {}", e)))
    }

    /// `<storage>/recitations`
    pub fn recitations_dir(&self) -> PathBuf {
        self.storage_root.join(&self.layout.recitations_dir)
    }

    /// `<storage>/<legacy_audio_dir>`
    pub fn legacy_audio_dir(&self) -> PathBuf {
        self.storage_root.join(&self.layout.legacy_audio_dir)
    }

    /// `<assets>/quran_audio`
    pub fn asset_audio_dir(&self) -> PathBuf {
        self.assets_root.join(&self.layout.asset_audio_dir)
    }

    /// `<storage>/pages`
    pub fn pages_dir(&self) -> PathBuf {
        self.storage_root.join(&self.layout.pages_dir)
    }

    /// `<storage>/pages/page_<N>.<ext>`
    pub fn page_path(&self, page: u32) -> PathBuf {
        self.pages_dir().join(self.layout.page_file_name(page))
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for remote verse audio and page downloads. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject the platform HTTP stack (URLSession/OkHttp)."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required for the audio and page caches. \
                 Desktop: enable the 'desktop-shims' feature to use the default TokioFileSystem. \
                 Mobile: inject a sandbox-aware file system bridge."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn settings_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for playback preferences and the \
                 cache-complete flag. \
                 Desktop: enable the 'desktop-shims' feature to use the default SqliteSettingsStore. \
                 Mobile: inject platform-native settings (UserDefaults/SharedPreferences)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(storage_root: &Path) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let db_path = storage_root.join("settings.db");

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default settings store: {}",
                    e
                ))
            })?;

        runtime
            .block_on(SqliteSettingsStore::new(path))
            .map_err(Error::Bridge)
    };

    // block_on panics inside a runtime, so build the store on a plain thread.
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(db_path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default SettingsStore".to_string(),
                )
            })??,
        Err(_) => init_store(db_path)?,
    };

    let store: Arc<dyn SettingsStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store(_storage_root: &Path) -> Result<Arc<dyn SettingsStore>> {
    Err(settings_store_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    storage_root: Option<PathBuf>,
    assets_root: Option<PathBuf>,
    total_pages: Option<u32>,
    layout: Option<StorageLayout>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the writable storage root (required).
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().storage_root("/data/reader");
    /// ```
    pub fn storage_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_root = Some(path.into());
        self
    }

    /// Sets the bundled assets root (required).
    pub fn assets_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.assets_root = Some(path.into());
        self
    }

    /// Sets the corpus page count.
    ///
    /// Default: 604
    pub fn total_pages(mut self, pages: u32) -> Self {
        self.total_pages = Some(pages);
        self
    }

    pub fn layout(mut self, layout: StorageLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, `ReqwestHttpClient` is used when the `desktop-shims`
    /// feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system access implementation.
    ///
    /// If not provided, `TokioFileSystem` is used when the `desktop-shims`
    /// feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the settings store implementation.
    ///
    /// If not provided, a `SqliteSettingsStore` under the storage root is used
    /// when the `desktop-shims` feature is enabled.
    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Overrides the time source (tests use a fixed or manual clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if a root is missing or a value is invalid
    /// - [`Error::CapabilityMissing`] if a bridge is missing and no platform
    ///   default is available
    pub fn build(self) -> Result<CoreConfig> {
        let storage_root = self.storage_root.ok_or_else(|| {
            Error::Config("Storage root is required. Use .storage_root() to set it.".to_string())
        })?;

        let assets_root = self.assets_root.ok_or_else(|| {
            Error::Config("Assets root is required. Use .assets_root() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            None => provide_default_settings_store(&storage_root)?,
        };

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        let config = CoreConfig {
            storage_root,
            assets_root,
            total_pages: self.total_pages.unwrap_or(DEFAULT_TOTAL_PAGES),
            layout: self.layout.unwrap_or_default(),
            http_client,
            file_system,
            settings_store,
            clock,
        };

        config.validate()?;

        Ok(config)
    }
}
