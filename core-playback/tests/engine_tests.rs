//! Playback engine scenarios driven through a fake renderer.

use async_trait::async_trait;
use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
use bridge_traits::sink::ProgressSink;
use bridge_traits::storage::{FileSystemAccess, SettingsStore};
use bridge_traits::time::Clock;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_playback::engine::{EngineComponents, PlaybackEngine, PlaybackMode, PlaybackState};
use core_playback::{
    AudioCacher, DataSource, MediaRenderer, PlaybackConfig, PlaybackError, RendererEvent,
    RepeatMode, RepeatSetting, ReciterId, Result, SessionToken, SourceResolver,
    TemplateUrlProvider, VerseCatalog, VerseRef,
};
use core_runtime::config::StorageLayout;
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum RendererCall {
    Prepare(DataSource),
    Start,
    Pause,
    Resume,
    Stop,
}

#[derive(Default)]
struct FakeRenderer {
    calls: Mutex<Vec<RendererCall>>,
    tokens: Mutex<Vec<SessionToken>>,
    playing: AtomicBool,
    failing_stems: Mutex<HashSet<String>>,
    resume_delay: Mutex<Duration>,
}

impl FakeRenderer {
    fn fail_prepare_for(&self, verse: VerseRef) {
        self.failing_stems.lock().insert(verse.file_stem());
    }

    fn slow_resume(&self, delay: Duration) {
        *self.resume_delay.lock() = delay;
    }

    fn last_token(&self) -> SessionToken {
        *self.tokens.lock().last().expect("nothing prepared")
    }

    fn calls(&self) -> Vec<RendererCall> {
        self.calls.lock().clone()
    }

    fn count(&self, call: &RendererCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn prepared(&self) -> Vec<DataSource> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RendererCall::Prepare(source) => Some(source.clone()),
                _ => None,
            })
            .collect()
    }
}

fn source_location(source: &DataSource) -> String {
    match source {
        DataSource::LocalPrimary(p) | DataSource::LocalLegacy(p) | DataSource::BundledAsset(p) => {
            p.to_string_lossy().to_string()
        }
        DataSource::Remote(url) => url.clone(),
    }
}

#[async_trait]
impl MediaRenderer for FakeRenderer {
    async fn prepare(&self, token: SessionToken, source: DataSource) -> Result<()> {
        let location = source_location(&source);
        self.calls.lock().push(RendererCall::Prepare(source));
        self.tokens.lock().push(token);
        self.playing.store(false, Ordering::SeqCst);

        let failing = self
            .failing_stems
            .lock()
            .iter()
            .any(|stem| location.contains(stem.as_str()));
        if failing {
            return Err(PlaybackError::PrepareFailure("unsupported stream".into()));
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.calls.lock().push(RendererCall::Start);
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.calls.lock().push(RendererCall::Pause);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        let delay = *self.resume_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(RendererCall::Resume);
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.calls.lock().push(RendererCall::Stop);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

struct FakeCatalog {
    pages: HashMap<u32, Vec<VerseRef>>,
    text_delay: Mutex<Duration>,
}

#[async_trait]
impl VerseCatalog for FakeCatalog {
    async fn verses_on_page(&self, page: u32) -> Result<Vec<VerseRef>> {
        Ok(self.pages.get(&page).cloned().unwrap_or_default())
    }

    async fn page_for_verse(&self, verse: VerseRef) -> Result<Option<u32>> {
        Ok(self
            .pages
            .iter()
            .find(|(_, verses)| verses.contains(&verse))
            .map(|(page, _)| *page))
    }

    async fn verse_text(&self, verse: VerseRef) -> Option<String> {
        let delay = *self.text_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Some(format!("text of {}", verse))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SinkCall {
    NowPlaying(VerseRef),
    Focus(VerseRef, bool),
    Stopped,
    Paused,
    Resumed,
    Failed(String),
    RemoteNotice,
}

#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    fn played(&self) -> Vec<VerseRef> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                SinkCall::NowPlaying(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    fn count(&self, call: &SinkCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }
}

impl ProgressSink for RecordingSink {
    fn on_now_playing(&self, surah: u16, verse: u16, _text: &str) {
        self.calls
            .lock()
            .push(SinkCall::NowPlaying(VerseRef::new(surah, verse)));
    }

    fn on_playback_stopped(&self) {
        self.calls.lock().push(SinkCall::Stopped);
    }

    fn on_bulk_progress(&self, _succeeded: u32, _total: u32, _eta_secs: Option<u64>) {}

    fn on_bulk_finished(&self, _success: bool, _succeeded: u32, _total: u32) {}

    fn on_remote_fallback_used(&self) {
        self.calls.lock().push(SinkCall::RemoteNotice);
    }

    fn on_verse_focus(&self, surah: u16, verse: u16, navigate: bool) {
        self.calls
            .lock()
            .push(SinkCall::Focus(VerseRef::new(surah, verse), navigate));
    }

    fn on_playback_paused(&self) {
        self.calls.lock().push(SinkCall::Paused);
    }

    fn on_playback_resumed(&self) {
        self.calls.lock().push(SinkCall::Resumed);
    }

    fn on_playback_failed(&self, message: &str) {
        self.calls.lock().push(SinkCall::Failed(message.to_string()));
    }
}

#[derive(Default)]
struct RecordingCacher {
    requests: Mutex<Vec<(String, PathBuf)>>,
}

impl AudioCacher for RecordingCacher {
    fn cache_in_background(&self, url: String, destination: PathBuf) {
        self.requests.lock().push((url, destination));
    }
}

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn advance_secs(&self, secs: i64) {
        *self.0.lock() += chrono::Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    engine: PlaybackEngine,
    renderer: Arc<FakeRenderer>,
    catalog: Arc<FakeCatalog>,
    sink: Arc<RecordingSink>,
    cacher: Arc<RecordingCacher>,
    clock: Arc<ManualClock>,
    settings: Arc<SqliteSettingsStore>,
    storage: PathBuf,
}

fn default_pages() -> HashMap<u32, Vec<VerseRef>> {
    HashMap::from([
        (1, vec![VerseRef::new(1, 1), VerseRef::new(1, 2), VerseRef::new(1, 3)]),
        (2, vec![VerseRef::new(1, 4), VerseRef::new(1, 5)]),
        (3, vec![VerseRef::new(1, 6), VerseRef::new(1, 7)]),
    ])
}

async fn harness() -> Harness {
    let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
    harness_with(default_pages(), settings).await
}

async fn harness_with(
    pages: HashMap<u32, Vec<VerseRef>>,
    settings: Arc<SqliteSettingsStore>,
) -> Harness {
    let root = std::env::temp_dir().join(format!("core-playback-engine-{}", Uuid::new_v4()));
    let storage = root.join("storage");
    let assets = root.join("assets");

    let resolver = Arc::new(SourceResolver::new(
        &storage,
        assets,
        &StorageLayout::default(),
        Arc::new(TokioFileSystem::new()),
        Arc::new(TemplateUrlProvider::new("https://cdn.test/audio", "mp3")),
    ));

    let renderer = Arc::new(FakeRenderer::default());
    let catalog = Arc::new(FakeCatalog {
        pages,
        text_delay: Mutex::new(Duration::ZERO),
    });
    let sink = Arc::new(RecordingSink::default());
    let cacher = Arc::new(RecordingCacher::default());
    let clock = Arc::new(ManualClock(Mutex::new(Utc::now())));

    let components = EngineComponents {
        renderer: renderer.clone(),
        resolver,
        catalog: catalog.clone(),
        cacher: cacher.clone(),
        sink: sink.clone(),
        settings: settings.clone(),
        clock: clock.clone(),
    };

    let engine = PlaybackEngine::load(components, PlaybackConfig::default().with_total_pages(3))
        .await
        .unwrap();

    Harness {
        engine,
        renderer,
        catalog,
        sink,
        cacher,
        clock,
        settings,
        storage,
    }
}

fn husary() -> ReciterId {
    ReciterId::new("husary")
}

/// Reports ready and completion for the item most recently prepared.
async fn complete_current(h: &Harness) {
    let token = h.renderer.last_token();
    h.engine.handle_event(token, RendererEvent::Ready).await;
    h.engine.handle_event(token, RendererEvent::Completed).await;
}

async fn run_until_idle(h: &Harness) {
    for _ in 0..500 {
        if h.engine.snapshot().state == PlaybackState::Idle {
            return;
        }
        complete_current(h).await;
    }
    panic!("playback did not finish");
}

fn verses(surah: u16, list: &[u16]) -> Vec<VerseRef> {
    list.iter().map(|v| VerseRef::new(surah, *v)).collect()
}

// ============================================================================
// Page Playback
// ============================================================================

#[tokio::test]
async fn test_page_queue_plays_each_verse_once_in_order() {
    let h = harness().await;
    h.engine.set_auto_continue(false).await.unwrap();

    h.engine.start_page_playback(1, husary(), true).await.unwrap();
    run_until_idle(&h).await;

    assert_eq!(h.sink.played(), verses(1, &[1, 2, 3]));
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Stopped));

    let snap = h.engine.snapshot();
    assert_eq!(snap.state, PlaybackState::Idle);
    assert_eq!(snap.mode, None);
    assert_eq!(snap.last_verse, Some(VerseRef::new(1, 3)));
}

#[tokio::test]
async fn test_verse_repeat_plays_each_verse_k_times() {
    let h = harness().await;
    h.engine.set_auto_continue(false).await.unwrap();
    h.engine.set_repeat_mode(RepeatSetting::Verse(2)).await.unwrap();

    h.engine.start_page_playback(1, husary(), true).await.unwrap();
    run_until_idle(&h).await;

    assert_eq!(h.sink.played(), verses(1, &[1, 1, 2, 2, 3, 3]));
}

#[tokio::test]
async fn test_page_repeat_restarts_page() {
    let h = harness().await;
    h.engine.set_auto_continue(false).await.unwrap();
    h.engine.set_repeat_mode(RepeatSetting::Page(2)).await.unwrap();

    h.engine.start_page_playback(2, husary(), true).await.unwrap();
    run_until_idle(&h).await;

    assert_eq!(h.sink.played(), verses(1, &[4, 5, 4, 5]));
}

#[tokio::test]
async fn test_auto_continue_walks_to_last_page() {
    let h = harness().await;

    h.engine.start_page_playback(1, husary(), true).await.unwrap();
    run_until_idle(&h).await;

    assert_eq!(h.sink.played(), verses(1, &[1, 2, 3, 4, 5, 6, 7]));

    let calls = h.sink.calls();
    assert!(calls.contains(&SinkCall::Focus(VerseRef::new(1, 4), true)));
    assert!(calls.contains(&SinkCall::Focus(VerseRef::new(1, 6), true)));
    assert!(calls.contains(&SinkCall::Focus(VerseRef::new(1, 5), false)));
    assert_eq!(h.engine.current_page(), Some(3));
}

#[tokio::test]
async fn test_page_playback_skips_failed_verse() {
    let h = harness().await;
    h.engine.set_auto_continue(false).await.unwrap();
    h.renderer.fail_prepare_for(VerseRef::new(1, 2));

    h.engine.start_page_playback(1, husary(), true).await.unwrap();
    run_until_idle(&h).await;

    assert_eq!(h.sink.played(), verses(1, &[1, 3]));
    assert_eq!(h.sink.count(&SinkCall::Failed("unsupported stream".into())), 0);
}

#[tokio::test]
async fn test_resume_by_identity_starts_at_last_verse() {
    let h = harness().await;
    h.engine.set_auto_continue(false).await.unwrap();

    h.engine.play_single_verse(VerseRef::new(1, 2), husary()).await.unwrap();
    complete_current(&h).await;

    h.engine.start_page_playback(1, husary(), false).await.unwrap();
    run_until_idle(&h).await;

    assert_eq!(h.sink.played(), verses(1, &[2, 2, 3]));
}

#[tokio::test]
async fn test_invalid_and_empty_pages() {
    let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
    let mut pages = default_pages();
    pages.remove(&2);
    let h = harness_with(pages, settings).await;

    assert!(matches!(
        h.engine.start_page_playback(0, husary(), true).await,
        Err(PlaybackError::InvalidPage(0))
    ));
    assert!(matches!(
        h.engine.start_page_playback(4, husary(), true).await,
        Err(PlaybackError::InvalidPage(4))
    ));
    assert!(matches!(
        h.engine.start_page_playback(2, husary(), true).await,
        Err(PlaybackError::EmptyPage(2))
    ));
    assert_eq!(h.engine.snapshot().state, PlaybackState::Idle);
}

// ============================================================================
// Range Repeat
// ============================================================================

#[tokio::test]
async fn test_range_repeat_orders_bounds_and_restores_auto_continue() {
    let h = harness().await;

    h.engine.start_range_repeat(2, 5, 2, 3, husary()).await.unwrap();
    assert!(!h.engine.snapshot().auto_continue);
    run_until_idle(&h).await;

    let expected: Vec<VerseRef> = [2, 3, 4, 5, 2, 3, 4, 5, 2, 3, 4, 5]
        .iter()
        .map(|v| VerseRef::new(2, *v))
        .collect();
    assert_eq!(h.sink.played(), expected);

    let snap = h.engine.snapshot();
    assert_eq!(snap.repeat, RepeatMode::Off);
    assert!(snap.auto_continue);
    assert_eq!(snap.mode, None);
    assert_eq!(h.settings.get_i64("range_from").await.unwrap(), Some(2));
    assert_eq!(h.settings.get_i64("range_to").await.unwrap(), Some(5));
    assert_eq!(h.settings.get_i64("range_times").await.unwrap(), Some(3));

    let focus_without_navigation = h
        .sink
        .calls()
        .iter()
        .filter(|c| matches!(c, SinkCall::Focus(_, false)))
        .count();
    assert_eq!(focus_without_navigation, 0);
}

#[tokio::test]
async fn test_range_error_skips_ahead() {
    let h = harness().await;
    h.engine.start_range_repeat(1, 1, 3, 1, husary()).await.unwrap();

    let first = h.renderer.last_token();
    h.engine
        .handle_event(first, RendererEvent::Error("decoder".into()))
        .await;

    let prepared = h.renderer.prepared();
    assert_eq!(prepared.len(), 2);
    assert!(source_location(&prepared[1]).ends_with("001002.mp3"));

    run_until_idle(&h).await;
    assert_eq!(h.sink.played(), verses(1, &[2, 3]));
}

#[tokio::test]
async fn test_cancel_range_without_range_is_noop() {
    let h = harness().await;

    h.engine.cancel_range_repeat().await.unwrap();

    assert!(h.sink.calls().is_empty());
    assert!(h.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_range_stops_and_restores_auto_continue() {
    let h = harness().await;
    h.engine.start_range_repeat(1, 1, 7, 5, husary()).await.unwrap();
    complete_current(&h).await;

    h.engine.cancel_range_repeat().await.unwrap();

    let snap = h.engine.snapshot();
    assert_eq!(snap.state, PlaybackState::Idle);
    assert_eq!(snap.repeat, RepeatMode::Off);
    assert!(snap.auto_continue);
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Stopped));
    assert_eq!(h.renderer.calls().last(), Some(&RendererCall::Stop));

    h.engine.cancel_range_repeat().await.unwrap();
    assert_eq!(h.sink.count(&SinkCall::Stopped), 1);
}

#[tokio::test]
async fn test_auto_continue_change_during_range_applies_afterwards() {
    let h = harness().await;
    h.engine.start_range_repeat(1, 1, 1, 1, husary()).await.unwrap();

    h.engine.set_auto_continue(false).await.unwrap();
    assert!(!h.engine.snapshot().auto_continue);

    run_until_idle(&h).await;
    assert!(!h.engine.snapshot().auto_continue);
    assert_eq!(h.settings.get_bool("pref_auto_continue").await.unwrap(), Some(false));
}

#[tokio::test]
async fn test_single_verse_cancels_range() {
    let h = harness().await;
    h.engine.start_range_repeat(1, 1, 7, 3, husary()).await.unwrap();

    h.engine.play_single_verse(VerseRef::new(2, 255), husary()).await.unwrap();

    let snap = h.engine.snapshot();
    assert_eq!(snap.mode, Some(PlaybackMode::Single));
    assert_eq!(snap.repeat, RepeatMode::Off);
    assert!(snap.auto_continue);
}

// ============================================================================
// Single Verse & Tokens
// ============================================================================

#[tokio::test]
async fn test_single_verse_completes_to_idle() {
    let h = harness().await;

    h.engine.play_single_verse(VerseRef::new(1, 1), husary()).await.unwrap();
    assert_eq!(h.engine.snapshot().state, PlaybackState::Preparing);

    let token = h.renderer.last_token();
    h.engine.handle_event(token, RendererEvent::Ready).await;
    assert!(h.engine.is_playing());
    assert_eq!(
        h.sink.calls()[..2],
        [
            SinkCall::RemoteNotice,
            SinkCall::NowPlaying(VerseRef::new(1, 1))
        ]
    );

    h.engine.handle_event(token, RendererEvent::Completed).await;
    assert_eq!(h.engine.snapshot().state, PlaybackState::Idle);
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Stopped));
    assert_eq!(h.renderer.prepared().len(), 1);
    assert_eq!(h.settings.get_i64("last_ayah").await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_single_verse_failure_is_surfaced() {
    let h = harness().await;
    h.engine.play_single_verse(VerseRef::new(1, 1), husary()).await.unwrap();

    let token = h.renderer.last_token();
    h.engine
        .handle_event(token, RendererEvent::Error("decoder".into()))
        .await;

    assert_eq!(h.sink.count(&SinkCall::Failed("decoder".into())), 1);
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Stopped));
    assert_eq!(h.engine.snapshot().state, PlaybackState::Idle);
    assert_eq!(h.renderer.prepared().len(), 1);
}

#[tokio::test]
async fn test_invalid_verse_is_rejected() {
    let h = harness().await;
    let result = h.engine.play_single_verse(VerseRef::new(1, 8), husary()).await;
    assert!(matches!(
        result,
        Err(PlaybackError::InvalidVerse { surah: 1, verse: 8 })
    ));
    assert!(h.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_stale_ready_changes_nothing() {
    let h = harness().await;

    h.engine.play_single_verse(VerseRef::new(1, 1), husary()).await.unwrap();
    let stale = h.renderer.last_token();
    h.engine.play_single_verse(VerseRef::new(1, 2), husary()).await.unwrap();

    let sink_before = h.sink.calls();
    let renderer_before = h.renderer.calls();

    h.engine.handle_event(stale, RendererEvent::Ready).await;
    h.engine.handle_event(stale, RendererEvent::Completed).await;
    h.engine
        .handle_event(stale, RendererEvent::Error("late".into()))
        .await;

    assert_eq!(h.sink.calls(), sink_before);
    assert_eq!(h.renderer.calls(), renderer_before);
    let snap = h.engine.snapshot();
    assert_eq!(snap.state, PlaybackState::Preparing);
    assert_eq!(snap.current_verse, Some(VerseRef::new(1, 2)));
}

#[tokio::test]
async fn test_stop_while_loading_text_suppresses_now_playing() {
    let h = harness().await;
    *h.catalog.text_delay.lock() = Duration::from_millis(200);

    h.engine.play_single_verse(VerseRef::new(1, 1), husary()).await.unwrap();
    let token = h.renderer.last_token();

    tokio::join!(h.engine.handle_event(token, RendererEvent::Ready), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.engine.stop_all().await.unwrap();
    });

    assert!(h.sink.played().is_empty());
    assert!(!h
        .sink
        .calls()
        .iter()
        .any(|c| matches!(c, SinkCall::Focus(..))));
    assert_eq!(h.sink.calls().last(), Some(&SinkCall::Stopped));
    assert_eq!(h.engine.snapshot().state, PlaybackState::Idle);
    assert_eq!(h.settings.get_i64("last_ayah").await.unwrap(), None);
}

// ============================================================================
// Sources, Caching & Notices
// ============================================================================

#[tokio::test]
async fn test_local_copy_is_preferred_and_remote_is_cached() {
    let h = harness().await;
    let local = h.storage.join("recitations").join("husary").join("001001.mp3");
    TokioFileSystem::new()
        .write_file(&local, Bytes::from_static(b"ID3 local"))
        .await
        .unwrap();

    h.engine.play_single_verse(VerseRef::new(1, 1), husary()).await.unwrap();
    complete_current(&h).await;
    assert_eq!(h.renderer.prepared()[0], DataSource::LocalPrimary(local));
    assert!(h.cacher.requests.lock().is_empty());

    h.engine.play_single_verse(VerseRef::new(1, 2), husary()).await.unwrap();
    complete_current(&h).await;
    assert_eq!(
        h.renderer.prepared()[1],
        DataSource::Remote("https://cdn.test/audio/husary/001002.mp3".into())
    );

    let requests = h.cacher.requests.lock().clone();
    assert_eq!(
        requests,
        vec![(
            "https://cdn.test/audio/husary/001002.mp3".to_string(),
            h.storage.join("recitations").join("husary").join("001002.mp3"),
        )]
    );

    let _ = tokio::fs::remove_dir_all(h.storage.parent().unwrap()).await;
}

#[tokio::test]
async fn test_remote_notice_is_debounced() {
    let h = harness().await;

    h.engine.play_single_verse(VerseRef::new(1, 1), husary()).await.unwrap();
    h.engine.play_single_verse(VerseRef::new(1, 2), husary()).await.unwrap();
    assert_eq!(h.sink.count(&SinkCall::RemoteNotice), 1);

    h.clock.advance_secs(6);
    h.engine.play_single_verse(VerseRef::new(1, 3), husary()).await.unwrap();
    assert_eq!(h.sink.count(&SinkCall::RemoteNotice), 2);
}

// ============================================================================
// Pause, Resume & Toggle
// ============================================================================

#[tokio::test]
async fn test_pause_while_preparing_holds_item() {
    let h = harness().await;
    h.engine.start_page_playback(1, husary(), true).await.unwrap();

    h.engine.pause_page_playback().await.unwrap();
    h.engine
        .handle_event(h.renderer.last_token(), RendererEvent::Ready)
        .await;

    assert_eq!(h.engine.snapshot().state, PlaybackState::Paused);
    assert_eq!(h.renderer.count(&RendererCall::Start), 0);

    assert!(h.engine.resume_page_playback().await.unwrap());
    assert_eq!(h.engine.snapshot().state, PlaybackState::Playing);
    assert_eq!(h.renderer.count(&RendererCall::Resume), 1);
}

#[tokio::test]
async fn test_resume_without_pause_is_noop() {
    let h = harness().await;
    assert!(!h.engine.resume_page_playback().await.unwrap());
    assert!(h.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_toggle_play_pause() {
    let h = harness().await;

    assert!(h.engine.toggle_play_pause(1, husary()).await.unwrap());
    h.engine
        .handle_event(h.renderer.last_token(), RendererEvent::Ready)
        .await;
    assert!(h.engine.is_playing());

    assert!(!h.engine.toggle_play_pause(1, husary()).await.unwrap());
    assert_eq!(h.engine.snapshot().state, PlaybackState::Paused);
    assert!(!h.engine.is_playing());

    assert!(h.engine.toggle_play_pause(1, husary()).await.unwrap());
    assert!(h.engine.is_playing());
    assert_eq!(h.renderer.count(&RendererCall::Pause), 1);
    assert_eq!(h.renderer.count(&RendererCall::Resume), 1);
    assert_eq!(h.sink.played(), verses(1, &[1]));
}

#[tokio::test]
async fn test_toggle_stops_single_verse_and_starts_page() {
    let h = harness().await;
    h.engine.play_single_verse(VerseRef::new(1, 3), husary()).await.unwrap();
    h.engine
        .handle_event(h.renderer.last_token(), RendererEvent::Ready)
        .await;

    assert!(h.engine.toggle_play_pause(1, husary()).await.unwrap());

    let snap = h.engine.snapshot();
    assert_eq!(snap.mode, Some(PlaybackMode::Page));
    assert_eq!(snap.current_verse, Some(VerseRef::new(1, 3)));
}

#[tokio::test]
async fn test_pause_queued_behind_resume_is_not_replayed() {
    let h = harness().await;
    h.engine.start_page_playback(1, husary(), true).await.unwrap();
    h.engine
        .handle_event(h.renderer.last_token(), RendererEvent::Ready)
        .await;
    h.engine.pause_page_playback().await.unwrap();
    assert_eq!(h.renderer.count(&RendererCall::Pause), 1);

    h.renderer.slow_resume(Duration::from_millis(200));
    let (first, _, second) = tokio::join!(
        h.engine.resume_page_playback(),
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            h.engine.pause_page_playback().await.unwrap();
        },
        async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            h.engine.resume_page_playback().await
        }
    );

    assert!(first.unwrap());
    assert!(second.unwrap());
    assert_eq!(h.renderer.count(&RendererCall::Pause), 1);
    assert_eq!(h.renderer.count(&RendererCall::Resume), 2);
    assert_eq!(h.engine.snapshot().state, PlaybackState::Playing);
    assert!(h.engine.is_playing());
}

#[tokio::test]
async fn test_toggle_single_verse_stops_on_second_tap() {
    let h = harness().await;

    assert!(h
        .engine
        .toggle_single_verse(VerseRef::new(1, 2), husary())
        .await
        .unwrap());
    h.engine
        .handle_event(h.renderer.last_token(), RendererEvent::Ready)
        .await;
    assert_eq!(h.engine.snapshot().mode, Some(PlaybackMode::Single));

    assert!(!h
        .engine
        .toggle_single_verse(VerseRef::new(1, 2), husary())
        .await
        .unwrap());

    let snap = h.engine.snapshot();
    assert_eq!(snap.state, PlaybackState::Idle);
    assert_eq!(snap.mode, None);
    assert_eq!(h.sink.count(&SinkCall::Stopped), 1);
    assert_eq!(h.renderer.prepared().len(), 1);
}

#[tokio::test]
async fn test_toggle_single_verse_switches_to_other_verse() {
    let h = harness().await;
    h.engine
        .toggle_single_verse(VerseRef::new(1, 2), husary())
        .await
        .unwrap();

    assert!(h
        .engine
        .toggle_single_verse(VerseRef::new(1, 3), husary())
        .await
        .unwrap());

    let snap = h.engine.snapshot();
    assert_eq!(snap.mode, Some(PlaybackMode::Single));
    assert_eq!(snap.current_verse, Some(VerseRef::new(1, 3)));
    assert_eq!(h.renderer.prepared().len(), 2);
}

#[tokio::test]
async fn test_toggle_single_verse_replaces_page_playback() {
    let h = harness().await;
    h.engine.start_page_playback(1, husary(), true).await.unwrap();

    assert!(h
        .engine
        .toggle_single_verse(VerseRef::new(1, 1), husary())
        .await
        .unwrap());
    assert_eq!(h.engine.snapshot().mode, Some(PlaybackMode::Single));

    let result = h
        .engine
        .toggle_single_verse(VerseRef::new(1, 9), husary())
        .await;
    assert!(matches!(
        result,
        Err(PlaybackError::InvalidVerse { surah: 1, verse: 9 })
    ));
}

// ============================================================================
// Stops, Preferences & Events
// ============================================================================

#[tokio::test]
async fn test_stop_scopes() {
    let h = harness().await;
    h.engine.start_page_playback(1, husary(), true).await.unwrap();

    h.engine.stop_single_playback().await.unwrap();
    assert_eq!(h.engine.snapshot().mode, Some(PlaybackMode::Page));
    assert_eq!(h.sink.count(&SinkCall::Stopped), 0);

    h.engine.stop_sequential_playback().await.unwrap();
    assert_eq!(h.engine.snapshot().state, PlaybackState::Idle);
    assert_eq!(h.sink.count(&SinkCall::Stopped), 1);

    h.engine.stop_all().await.unwrap();
    assert_eq!(h.sink.count(&SinkCall::Stopped), 2);
}

#[tokio::test]
async fn test_select_reciter_stops_and_persists() {
    let h = harness().await;
    h.engine.start_page_playback(1, husary(), true).await.unwrap();

    h.engine.select_reciter(ReciterId::new("minshawi")).await.unwrap();

    let snap = h.engine.snapshot();
    assert_eq!(snap.state, PlaybackState::Idle);
    assert_eq!(snap.queue_position, None);
    assert_eq!(snap.reciter, ReciterId::new("minshawi"));
    assert_eq!(
        h.settings.get_string("pref_qari_id").await.unwrap(),
        Some("minshawi".to_string())
    );
}

#[tokio::test]
async fn test_load_restores_preferences() {
    let settings = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
    settings.set_string("pref_qari_id", "husary").await.unwrap();
    settings.set_i64("pref_repeat_mode", 2).await.unwrap();
    settings.set_i64("pref_repeat_ayah_count", 3).await.unwrap();
    settings.set_bool("pref_auto_continue", false).await.unwrap();
    settings.set_i64("last_surah", 1).await.unwrap();
    settings.set_i64("last_ayah", 2).await.unwrap();

    let h = harness_with(default_pages(), settings).await;

    let snap = h.engine.snapshot();
    assert_eq!(snap.reciter, husary());
    assert_eq!(snap.repeat, RepeatMode::VerseRepeat { count: 3 });
    assert!(!snap.auto_continue);
    assert_eq!(snap.last_verse, Some(VerseRef::new(1, 2)));

    h.engine.start_page_playback(1, husary(), false).await.unwrap();
    assert!(source_location(&h.renderer.prepared()[0]).ends_with("001002.mp3"));
}

#[tokio::test]
async fn test_playback_events_are_published() {
    let mut h = harness().await;
    let bus = Arc::new(EventBus::new(32));
    let mut rx = bus.subscribe();
    h.engine = h.engine.with_event_bus(bus);

    h.engine.play_single_verse(VerseRef::new(1, 1), husary()).await.unwrap();
    complete_current(&h).await;

    let mut kinds = Vec::new();
    while let Ok(CoreEvent::Playback(event)) = rx.try_recv() {
        kinds.push(event);
    }

    assert!(matches!(kinds[0], PlaybackEvent::RemoteFallback { surah: 1, verse: 1 }));
    assert!(matches!(kinds[1], PlaybackEvent::Started { surah: 1, verse: 1, .. }));
    assert!(matches!(kinds[2], PlaybackEvent::Completed { surah: 1, verse: 1 }));
    assert!(matches!(kinds[3], PlaybackEvent::Stopped));
}
