//! # Playback Collaborator Traits
//!
//! The engine drives three host-provided collaborators:
//!
//! - [`MediaRenderer`]: the one audio output the host owns. Requests are
//!   tagged with a [`SessionToken`]; readiness, completion and errors come
//!   back later through `PlaybackEngine::handle_event`.
//! - [`VerseCatalog`]: page layout and verse text.
//! - [`VerseUrlProvider`]: remote URL of a reciter's verse audio.
//!
//! ## Event Flow
//!
//! ```text
//! engine ── prepare(token, source) ──▶ renderer
//! engine ◀── handle_event(token, Ready) ── host
//! engine ── start() ──▶ renderer
//! engine ◀── handle_event(token, Completed | Error) ── host
//! ```

use crate::error::Result;
use crate::session::SessionToken;
use crate::source::DataSource;
use crate::verse::{ReciterId, VerseRef};
use async_trait::async_trait;

/// Asynchronous notification from the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    /// The prepared source can start.
    Ready,
    /// The source played to its end.
    Completed,
    /// Preparation or playback failed.
    Error(String),
}

/// Host audio output.
///
/// `prepare` releases whatever was loaded before and loads `source`. An
/// `Err` from `prepare` is treated the same as a later `Error` event.
/// `resume` starts a source that is prepared or paused.
///
/// Implementations must deliver events from their own task; calling
/// `handle_event` from inside one of these methods deadlocks.
#[async_trait]
pub trait MediaRenderer: Send + Sync {
    async fn prepare(&self, token: SessionToken, source: DataSource) -> Result<()>;

    async fn start(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Stops output and releases the loaded source.
    async fn stop(&self) -> Result<()>;

    fn is_playing(&self) -> bool;
}

/// Page layout and verse text lookup.
#[async_trait]
pub trait VerseCatalog: Send + Sync {
    /// Verses printed on `page`, in reading order.
    async fn verses_on_page(&self, page: u32) -> Result<Vec<VerseRef>>;

    async fn page_for_verse(&self, verse: VerseRef) -> Result<Option<u32>>;

    async fn verse_text(&self, verse: VerseRef) -> Option<String>;
}

/// Remote location of a reciter's verse audio.
pub trait VerseUrlProvider: Send + Sync {
    fn verse_url(&self, reciter: &ReciterId, verse: VerseRef) -> String;
}

/// URL provider for CDNs laid out as `<base>/<reciter>/<SSSAAA>.<ext>`.
#[derive(Debug, Clone)]
pub struct TemplateUrlProvider {
    base_url: String,
    extension: String,
}

impl TemplateUrlProvider {
    pub fn new(base_url: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            extension: extension.into(),
        }
    }
}

impl VerseUrlProvider for TemplateUrlProvider {
    fn verse_url(&self, reciter: &ReciterId, verse: VerseRef) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            reciter.as_str(),
            verse.file_name(&self.extension)
        )
    }
}
