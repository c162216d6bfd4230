//! # Verse Playback
//!
//! Offline-first verse audio playback for the reader.
//!
//! ## Overview
//!
//! This crate handles:
//! - Ranked source resolution (local cache, legacy cache, bundled assets, network)
//! - A token-guarded playback state machine over one host renderer
//! - Single verse, page queue, verse repeat, page repeat and range repeat
//! - Silent caching of verses that were played from the network
//! - Persisted playback preferences

pub mod cacher;
pub mod config;
pub mod engine;
pub mod error;
pub mod notice;
pub mod preferences;
pub mod queue;
pub mod repeat;
pub mod session;
pub mod source;
pub mod traits;
pub mod verse;

pub use cacher::{AudioCacher, BackgroundCacher};
pub use config::PlaybackConfig;
pub use engine::{EngineComponents, EngineSnapshot, PlaybackEngine, PlaybackMode, PlaybackState};
pub use error::{PlaybackError, Result};
pub use preferences::{PreferenceStore, SavedRange, StoredPreferences};
pub use queue::{PageQueue, QueueStep};
pub use repeat::{RangeRepeat, RepeatMode, RepeatSetting};
pub use session::SessionToken;
pub use source::{DataSource, SourceResolver};
pub use traits::{MediaRenderer, RendererEvent, TemplateUrlProvider, VerseCatalog, VerseUrlProvider};
pub use verse::{ReciterId, VerseCountTable, VerseRef};
