//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! settings, clock) and the host's reader collaborators (renderer, verse
//! catalog, URL provider, progress sink) into the playback engine and the
//! page prefetch coordinator. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`) and call
//! [`bootstrap_desktop`].

pub mod error;
pub mod registry;

pub use error::{Result, ServiceError};
pub use registry::{
    ControlCommand, EngineRegistry, ReaderLauncher, RegistrationGuard, RemoteControl,
};

use bridge_traits::sink::ProgressSink;
use core_playback::{
    BackgroundCacher, EngineComponents, MediaRenderer, PlaybackConfig, PlaybackEngine,
    SourceResolver, VerseCatalog, VerseUrlProvider,
};
use core_prefetch::{BulkPrefetchCoordinator, PrefetchConfig, PrefetchReport};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use std::sync::Arc;
use tracing::{info, instrument};

/// Event bus capacity used by [`ReaderService`].
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Reader pieces supplied by the host application.
#[derive(Clone)]
pub struct HostCollaborators {
    pub renderer: Arc<dyn MediaRenderer>,
    pub catalog: Arc<dyn VerseCatalog>,
    pub url_provider: Arc<dyn VerseUrlProvider>,
    pub sink: Arc<dyn ProgressSink>,
}

/// Primary façade exposed to host applications.
pub struct ReaderService {
    core: CoreConfig,
    engine: Arc<PlaybackEngine>,
    prefetch: Arc<BulkPrefetchCoordinator>,
    event_bus: Arc<EventBus>,
}

impl ReaderService {
    /// Builds the service with configs derived from `core`.
    pub async fn new(core: CoreConfig, host: HostCollaborators) -> Result<Self> {
        let playback = PlaybackConfig::from_core(&core);
        let prefetch = PrefetchConfig::from_core(&core);
        Self::with_configs(core, host, playback, prefetch).await
    }

    pub async fn with_configs(
        core: CoreConfig,
        host: HostCollaborators,
        playback: PlaybackConfig,
        prefetch: PrefetchConfig,
    ) -> Result<Self> {
        core.validate()?;

        let event_bus = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));

        let resolver = SourceResolver::from_config(&core, host.url_provider)
            .with_verse_counts(playback.verse_counts.clone());
        let cacher = BackgroundCacher::new(core.http_client.clone(), core.file_system.clone());

        let components = EngineComponents {
            renderer: host.renderer,
            resolver: Arc::new(resolver),
            catalog: host.catalog,
            cacher: Arc::new(cacher),
            sink: host.sink.clone(),
            settings: core.settings_store.clone(),
            clock: core.clock.clone(),
        };
        let engine = PlaybackEngine::load(components, playback)
            .await?
            .with_event_bus(event_bus.clone());

        let coordinator = BulkPrefetchCoordinator::from_core(&core, host.sink, prefetch)?
            .with_event_bus(event_bus.clone());

        info!(
            storage_root = %core.storage_root.display(),
            total_pages = core.total_pages,
            "Reader service ready"
        );

        Ok(Self {
            core,
            engine: Arc::new(engine),
            prefetch: Arc::new(coordinator),
            event_bus,
        })
    }

    pub fn engine(&self) -> Arc<PlaybackEngine> {
        Arc::clone(&self.engine)
    }

    pub fn prefetch(&self) -> Arc<BulkPrefetchCoordinator> {
        Arc::clone(&self.prefetch)
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.core
    }

    /// Attaches this service's engine to `registry` until the guard drops.
    pub fn attach_to(&self, registry: &Arc<EngineRegistry>) -> RegistrationGuard {
        registry.attach(self.engine())
    }

    /// True until a prefetch run has marked the page cache complete.
    pub async fn needs_prefetch(&self) -> bool {
        !self.prefetch.is_cache_complete().await
    }

    /// Runs a bulk prefetch to completion.
    #[instrument(skip(self))]
    pub async fn prefetch_pages(&self) -> Result<PrefetchReport> {
        Ok(self.prefetch.run().await?)
    }
}

/// Settings database created under the storage root by [`bootstrap_desktop`].
#[cfg(feature = "desktop-shims")]
pub const SETTINGS_DB_FILE: &str = "settings.db";

/// Builds a [`ReaderService`] on the desktop bridges.
///
/// The settings store is opened on the caller's runtime; HTTP and filesystem
/// bridges come from the [`CoreConfig`] builder defaults.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example(host: core_service::HostCollaborators) -> core_service::Result<()> {
/// let service = core_service::bootstrap_desktop("/tmp/tilawa", "/opt/tilawa/assets", host).await?;
/// if service.needs_prefetch().await {
///     service.prefetch_pages().await?;
/// }
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    storage_root: impl Into<std::path::PathBuf>,
    assets_root: impl Into<std::path::PathBuf>,
    host: HostCollaborators,
) -> Result<ReaderService> {
    use bridge_desktop::SqliteSettingsStore;

    let storage_root = storage_root.into();
    let settings = SqliteSettingsStore::new(storage_root.join(SETTINGS_DB_FILE))
        .await
        .map_err(|e| ServiceError::InitializationFailed(format!("settings store: {e}")))?;

    let core = CoreConfig::builder()
        .storage_root(storage_root)
        .assets_root(assets_root.into())
        .settings_store(Arc::new(settings))
        .build()?;
    ReaderService::new(core, host).await
}
