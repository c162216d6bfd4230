//! Fetching a single page image into the cache.

use crate::config::PrefetchConfig;
use crate::error::{PrefetchError, Result};
use crate::integrity::IntegrityValidator;
use crate::mirrors::MirrorSet;
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_runtime::config::StorageLayout;
use core_runtime::logging::strip_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Where a successful page came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOrigin {
    /// Within the bundled prefix; nothing was fetched.
    Bundled,
    /// A valid file was already cached.
    Cached,
    /// Downloaded from the mirror at `url`.
    Downloaded { url: String },
}

impl PageOrigin {
    pub fn used_network(&self) -> bool {
        matches!(self, PageOrigin::Downloaded { .. })
    }
}

/// Downloads, validates and stores page images.
pub struct PageFetcher {
    http: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    validator: IntegrityValidator,
    mirrors: MirrorSet,
    pages_dir: PathBuf,
    layout: StorageLayout,
    local_prefix: u32,
    request_timeout: Duration,
}

impl PageFetcher {
    pub fn new(
        http: Arc<dyn HttpClient>,
        fs: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
        pages_dir: PathBuf,
        layout: StorageLayout,
        config: &PrefetchConfig,
    ) -> Self {
        Self {
            http,
            fs,
            clock,
            validator: IntegrityValidator::new(config.integrity),
            mirrors: config.mirrors.clone(),
            pages_dir,
            layout,
            local_prefix: config.local_prefix,
            request_timeout: config.request_timeout,
        }
    }

    pub fn pages_dir(&self) -> &Path {
        &self.pages_dir
    }

    pub fn page_path(&self, page: u32) -> PathBuf {
        self.pages_dir.join(self.layout.page_file_name(page))
    }

    pub async fn ensure_pages_dir(&self) -> Result<()> {
        self.fs.create_dir_all(&self.pages_dir).await?;
        Ok(())
    }

    /// Makes page `page` available locally.
    ///
    /// Mirrors are tried in order until one yields a valid image. The error
    /// of the last attempt is returned when all of them fail.
    pub async fn fetch(&self, page: u32) -> Result<PageOrigin> {
        if page <= self.local_prefix {
            return Ok(PageOrigin::Bundled);
        }

        let path = self.page_path(page);
        if self.has_valid_copy(&path).await {
            return Ok(PageOrigin::Cached);
        }

        let unix_minutes = self.clock.unix_timestamp() / 60;
        let mut last_error = None;

        for url in self.mirrors.urls_for(page, unix_minutes) {
            match self.download(&url, &path).await {
                Ok(()) => return Ok(PageOrigin::Downloaded { url }),
                Err(e) if e.is_retryable() => {
                    debug!(page, url = %url, error = %e, "Mirror attempt failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| PrefetchError::NetworkFailure("no mirrors configured".to_string())))
    }

    /// True when `path` holds a file that passes validation.
    pub async fn has_valid_copy(&self, path: &Path) -> bool {
        if !self.fs.is_non_empty_file(path).await {
            return false;
        }

        match self.fs.read_file(path).await {
            Ok(bytes) => match self.validator.validate(&bytes) {
                Ok(_) => true,
                Err(e) => {
                    debug!(file = %strip_path(&path.to_string_lossy()), error = %e, "Cached page is invalid");
                    false
                }
            },
            Err(e) => {
                debug!(file = %strip_path(&path.to_string_lossy()), error = %e, "Cached page unreadable");
                false
            }
        }
    }

    /// One mirror attempt: temp file, validate, rename.
    async fn download(&self, url: &str, destination: &Path) -> Result<()> {
        let request = HttpRequest::get(url).timeout(self.request_timeout);
        let body = self
            .http
            .execute_with_retry(request, RetryPolicy::single_attempt())
            .await
            .and_then(|response| response.into_success_body())
            .map_err(|e| PrefetchError::NetworkFailure(e.to_string()))?;

        let temp = temp_sibling(destination);
        self.fs.write_file(&temp, body.clone()).await?;

        if let Err(e) = self.validator.validate(&body) {
            self.discard(&temp).await;
            return Err(e.into());
        }

        if let Err(e) = self.fs.rename(&temp, destination).await {
            self.discard(&temp).await;
            return Err(e.into());
        }

        debug!(file = %strip_path(&destination.to_string_lossy()), bytes = body.len(), "Page stored");
        Ok(())
    }

    async fn discard(&self, temp: &Path) {
        if let Err(e) = self.fs.delete_file(temp).await {
            warn!(file = %strip_path(&temp.to_string_lossy()), error = %e, "Failed to remove temporary page file");
        }
    }
}

fn temp_sibling(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "page".to_string());
    destination.with_file_name(format!("{name}.part-{}", Uuid::new_v4()))
}
