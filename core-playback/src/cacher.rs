//! Silent persistence of remotely played verse audio.

use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::storage::FileSystemAccess;
use core_runtime::logging::strip_path;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Fire-and-forget cache writer used after a verse was played from the network.
pub trait AudioCacher: Send + Sync {
    fn cache_in_background(&self, url: String, destination: PathBuf);
}

/// [`AudioCacher`] that downloads on a spawned tokio task.
///
/// The body goes to `<destination>.part-<uuid>` and is renamed into place,
/// so a crash never leaves a truncated file at the destination. Failures are
/// logged at debug level and dropped.
#[derive(Clone)]
pub struct BackgroundCacher {
    http: Arc<dyn HttpClient>,
    fs: Arc<dyn FileSystemAccess>,
    request_timeout: Duration,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl BackgroundCacher {
    pub fn new(http: Arc<dyn HttpClient>, fs: Arc<dyn FileSystemAccess>) -> Self {
        Self {
            http,
            fs,
            request_timeout: Duration::from_secs(60),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Downloads `url` into `destination` on the current task.
    pub async fn cache_now(&self, url: &str, destination: &Path) -> BridgeResult<()> {
        let request = HttpRequest::get(url).timeout(self.request_timeout);
        let body = self.http.execute(request).await?.into_success_body()?;

        if body.is_empty() {
            return Err(BridgeError::OperationFailed(format!(
                "Empty response for {}",
                strip_path(url)
            )));
        }

        let temp = temp_sibling(destination);
        self.fs.write_file(&temp, body).await?;

        if let Err(e) = self.fs.rename(&temp, destination).await {
            let _ = self.fs.delete_file(&temp).await;
            return Err(e);
        }

        debug!(file = strip_path(&destination.to_string_lossy()), "Cached verse audio");
        Ok(())
    }

    fn claim(&self, destination: &Path) -> bool {
        self.in_flight.lock().insert(destination.to_path_buf())
    }

    fn release(&self, destination: &Path) {
        self.in_flight.lock().remove(destination);
    }
}

impl AudioCacher for BackgroundCacher {
    fn cache_in_background(&self, url: String, destination: PathBuf) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No tokio runtime; skipping background cache");
            return;
        };

        if !self.claim(&destination) {
            debug!(file = strip_path(&destination.to_string_lossy()), "Cache write already in flight");
            return;
        }

        let cacher = self.clone();
        handle.spawn(async move {
            if let Err(e) = cacher.cache_now(&url, &destination).await {
                debug!(
                    error = %e,
                    file = strip_path(&destination.to_string_lossy()),
                    "Background cache failed"
                );
            }
            cacher.release(&destination);
        });
    }
}

fn temp_sibling(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".part-{}", Uuid::new_v4()));
    destination.with_file_name(name)
}
