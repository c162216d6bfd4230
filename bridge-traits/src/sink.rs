//! Progress & Notification Sink
//!
//! The host UI layer (banner, highlighted verse, notification, download
//! overlay) is outside the core. Playback and prefetch report every
//! user-visible side effect through [`ProgressSink`].
//!
//! Callbacks are synchronous and may arrive from any task; implementations
//! should hand the work to their UI thread and return quickly. The core never
//! holds an internal lock while invoking a sink method, so implementations may
//! call back into the engine.

/// Host-implemented sink for user-visible side effects.
///
/// Only the playback/prefetch essentials are required; the remaining hooks
/// default to no-ops so minimal hosts stay small.
pub trait ProgressSink: Send + Sync {
    /// A verse started playing. `text` is the verse text if the catalog has it.
    fn on_now_playing(&self, surah: u16, verse: u16, text: &str);

    /// Playback ended or was stopped; clear banners and highlights.
    fn on_playback_stopped(&self);

    /// Bulk prefetch progress. `eta_secs` is `None` while the rate is unknown.
    fn on_bulk_progress(&self, succeeded: u32, total: u32, eta_secs: Option<u64>);

    /// Bulk prefetch finished (not called for cancelled runs).
    fn on_bulk_finished(&self, success: bool, succeeded: u32, total: u32);

    /// A verse is being served from the network. Debounced by the engine.
    fn on_remote_fallback_used(&self);

    /// Highlight a verse; when `navigate` is set, also turn to its page.
    fn on_verse_focus(&self, _surah: u16, _verse: u16, _navigate: bool) {}

    fn on_playback_paused(&self) {}

    fn on_playback_resumed(&self) {}

    /// One-shot failure message for single-verse playback.
    fn on_playback_failed(&self, _message: &str) {}
}

/// Sink that drops every callback.
#[derive(Debug, Clone, Default)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_now_playing(&self, _surah: u16, _verse: u16, _text: &str) {}

    fn on_playback_stopped(&self) {}

    fn on_bulk_progress(&self, _succeeded: u32, _total: u32, _eta_secs: Option<u64>) {}

    fn on_bulk_finished(&self, _success: bool, _succeeded: u32, _total: u32) {}

    fn on_remote_fallback_used(&self) {}
}
