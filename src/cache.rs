//! Tone cache and prerender orchestration.
//!
//! The cache maps note names to rendered tones. A name is either absent
//! (render pending or failed) or bound to exactly one tone for the rest of
//! the session: inserts never replace an existing entry.
//!
//! Prerendering fans out one task per note and inserts each tone the moment
//! its render finishes, so a note becomes playable before the whole batch
//! is done.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dsp::renderer::{OfflineRenderer, RenderedTone};
use crate::engine::EngineStatus;
use crate::notes::NoteDefinition;

/// Per-note readiness notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CacheEvent {
    NoteCached { note: String },
    NoteFailed { note: String, error: String },
}

/// Shared, insert-once map from note name to rendered tone.
#[derive(Debug, Clone, Default)]
pub struct ToneCache {
    tones: Arc<RwLock<HashMap<String, Arc<RenderedTone>>>>,
}

impl ToneCache {
    pub fn new() -> Self {
        ToneCache::default()
    }

    /// Look up a tone. Never blocks on a pending render.
    pub fn get(&self, note: &str) -> Option<Arc<RenderedTone>> {
        self.tones.read().get(note).cloned()
    }

    pub fn contains(&self, note: &str) -> bool {
        self.tones.read().contains_key(note)
    }

    /// Bind `note` to `tone` unless it is already bound. Returns whether the
    /// tone was stored.
    pub fn insert(&self, note: &str, tone: Arc<RenderedTone>) -> bool {
        let mut tones = self.tones.write();
        if tones.contains_key(note) {
            return false;
        }
        tones.insert(note.to_string(), tone);
        true
    }

    pub fn len(&self) -> usize {
        self.tones.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tones.read().is_empty()
    }

    /// Cached note names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tones.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Outcome of a prerender batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerenderReport {
    /// Notes cached by this batch, in completion order.
    pub cached: Vec<String>,
    /// Notes whose render failed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl PrerenderReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Cache a finished render, or report its failure.
fn store(
    cache: &ToneCache,
    events: &broadcast::Sender<CacheEvent>,
    note: &str,
    result: Result<RenderedTone, crate::error::EngineError>,
) -> Result<(), String> {
    match result {
        Ok(tone) => {
            cache.insert(note, Arc::new(tone));
            debug!(note, "tone cached");
            let _ = events.send(CacheEvent::NoteCached {
                note: note.to_string(),
            });
            Ok(())
        }
        Err(e) => {
            warn!(note, error = %e, "tone render failed, note will use live fallback");
            let _ = events.send(CacheEvent::NoteFailed {
                note: note.to_string(),
                error: e.to_string(),
            });
            Err(e.to_string())
        }
    }
}

/// Render every note concurrently into `cache` and wait for all of them.
///
/// Notes already cached are skipped. Each tone is inserted as soon as its own
/// render completes; a failed render leaves its note absent.
pub async fn prerender_all(
    notes: &[NoteDefinition],
    renderer: OfflineRenderer,
    cache: &ToneCache,
    events: &broadcast::Sender<CacheEvent>,
) -> PrerenderReport {
    let mut tasks = JoinSet::new();
    for note in notes.iter().filter(|n| !cache.contains(&n.name)) {
        let name = note.name.clone();
        let hz = note.fundamental_hz;
        let cache = cache.clone();
        let events = events.clone();
        tasks.spawn(async move {
            let result = renderer.render_tone_async(hz).await;
            let outcome = store(&cache, &events, &name, result);
            (name, outcome)
        });
    }

    let mut report = PrerenderReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Ok(()))) => report.cached.push(name),
            Ok((name, Err(e))) => report.failed.push((name, e)),
            Err(e) => warn!(error = %e, "render task did not complete"),
        }
    }
    report
}

/// The one-per-session prerender job created by unlocking the engine.
///
/// Drive it either with [`run`](Self::run) on an async runtime, or note by
/// note with [`render_next`](Self::render_next) from a single-threaded host.
/// Status becomes `Ready` when the batch finishes.
#[derive(Debug)]
pub struct PrerenderBatch {
    pending: VecDeque<NoteDefinition>,
    renderer: OfflineRenderer,
    cache: ToneCache,
    events: broadcast::Sender<CacheEvent>,
    status: Arc<watch::Sender<EngineStatus>>,
    report: PrerenderReport,
}

impl PrerenderBatch {
    pub(crate) fn new(
        notes: Vec<NoteDefinition>,
        renderer: OfflineRenderer,
        cache: ToneCache,
        events: broadcast::Sender<CacheEvent>,
        status: Arc<watch::Sender<EngineStatus>>,
    ) -> Self {
        PrerenderBatch {
            pending: notes.into(),
            renderer,
            cache,
            events,
            status,
            report: PrerenderReport::default(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn report(&self) -> &PrerenderReport {
        &self.report
    }

    /// Render the next pending note on the calling thread. Returns true while
    /// notes remain.
    pub fn render_next(&mut self) -> bool {
        let Some(note) = self.pending.pop_front() else {
            return false;
        };
        if !self.cache.contains(&note.name) {
            let result = self.renderer.render_tone(note.fundamental_hz);
            match store(&self.cache, &self.events, &note.name, result) {
                Ok(()) => self.report.cached.push(note.name),
                Err(e) => self.report.failed.push((note.name, e)),
            }
        }
        if self.pending.is_empty() {
            self.finish();
            false
        } else {
            true
        }
    }

    /// Render all pending notes concurrently and report.
    pub async fn run(mut self) -> PrerenderReport {
        let notes: Vec<NoteDefinition> = self.pending.drain(..).collect();
        let report = prerender_all(&notes, self.renderer, &self.cache, &self.events).await;
        self.report.cached.extend(report.cached);
        self.report.failed.extend(report.failed);
        self.finish();
        self.report
    }

    fn finish(&self) {
        info!(
            cached = self.report.cached.len(),
            failed = self.report.failed.len(),
            "prerender complete"
        );
        self.status.send_if_modified(|status| {
            if *status == EngineStatus::Prerendering {
                *status = EngineStatus::Ready;
                true
            } else {
                false
            }
        });
    }
}
