//! Audio Engine — session lifecycle, master bus, and zero-latency playback.
//!
//! The engine is created locked. The first user gesture unlocks it: the host
//! hands over the output context, the master bus (gain → limiter) is built,
//! and a one-time [`PrerenderBatch`] is returned for the caller to drive.
//!
//! Triggers are synchronous and never wait on rendering. A trigger for a note
//! whose tone is cached starts a [`PlaybackVoice`] at the current output
//! frame; a trigger for a note still rendering (or whose render failed)
//! starts a short [`FallbackVoice`] instead. Every trigger is its own voice:
//! there is no voice stealing and no cap.
//!
//! [`process`](AudioEngine::process) is the device callback. It mixes every
//! live voice into the bus, advances the output clock, and drops voices that
//! have passed their stop frame.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::cache::{CacheEvent, PrerenderBatch, ToneCache};
use crate::config::EngineConfig;
use crate::dsp::bus::MasterBus;
use crate::dsp::renderer::OfflineRenderer;
use crate::dsp::voice::{FallbackVoice, PlaybackVoice, Voice};
use crate::error::EngineError;
use crate::host::{AudioHost, OutputContext};
use crate::notes::NoteSet;

/// Status reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineStatus {
    Idle,
    Unlocking,
    Prerendering,
    Ready,
    /// No audio output is available; audio features are disabled.
    Unsupported,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Locked,
    Unlocking,
    Unlocked,
    Unsupported,
    Disposed,
}

/// The gestures that may unlock audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    PointerDown,
    KeyDown,
    TouchStart,
    /// An explicit "enable audio" control.
    UnlockControl,
}

/// What a trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Locked, muted, disposed, or unknown note.
    Ignored,
    /// Started a voice from the cached tone.
    Cached,
    /// Started a live fallback voice.
    Fallback,
}

/// Snapshot of the UI-controlled session values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub unlocked: bool,
    pub muted: bool,
    pub master_gain: f64,
    pub release_seconds: f64,
    pub damping_cutoff_hz: f64,
}

pub struct AudioEngine<H: AudioHost> {
    host: H,
    config: EngineConfig,
    notes: NoteSet,
    lifecycle: Lifecycle,
    output: Option<OutputContext>,
    bus: Option<MasterBus>,
    cache: ToneCache,
    voices: Vec<Voice>,
    muted: bool,
    master_gain: f64,
    release_seconds: f64,
    damping_cutoff_hz: f64,
    status: Arc<watch::Sender<EngineStatus>>,
    events: broadcast::Sender<CacheEvent>,
}

impl<H: AudioHost> AudioEngine<H> {
    /// Create a locked engine for the chromatic octave.
    pub fn new(host: H, config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_notes(host, config, NoteSet::chromatic_octave())
    }

    /// Create a locked engine for a custom note layout.
    pub fn with_notes(host: H, config: EngineConfig, notes: NoteSet) -> Result<Self, EngineError> {
        config.validate()?;
        let (status, _) = watch::channel(EngineStatus::Idle);
        let (events, _) = broadcast::channel(notes.len().max(1) * 2);
        Ok(AudioEngine {
            host,
            notes,
            lifecycle: Lifecycle::Locked,
            output: None,
            bus: None,
            cache: ToneCache::new(),
            voices: Vec::new(),
            muted: false,
            master_gain: config.master_gain,
            release_seconds: config.release_seconds,
            damping_cutoff_hz: config.damping_cutoff_hz,
            status: Arc::new(status),
            events,
            config,
        })
    }

    /// Handle a user gesture. Only the first one does anything.
    pub fn on_gesture(
        &mut self,
        gesture: GestureKind,
    ) -> Result<Option<PrerenderBatch>, EngineError> {
        if self.lifecycle != Lifecycle::Locked {
            return Ok(None);
        }
        debug!(?gesture, "unlocking on gesture");
        self.unlock()
    }

    /// Unlock audio: acquire the output context, build the master bus, and
    /// return the session's prerender batch.
    ///
    /// Idempotent: once past `Locked`, further calls return `Ok(None)` and
    /// build nothing. A host that failed to provide output is not retried.
    pub fn unlock(&mut self) -> Result<Option<PrerenderBatch>, EngineError> {
        match self.lifecycle {
            Lifecycle::Locked => {}
            Lifecycle::Unlocking | Lifecycle::Unlocked => return Ok(None),
            Lifecycle::Unsupported => {
                return Err(EngineError::AudioUnavailable(
                    "audio output was unavailable at unlock".to_string(),
                ));
            }
            Lifecycle::Disposed => return Err(EngineError::Disposed),
        }

        self.lifecycle = Lifecycle::Unlocking;
        self.set_status(EngineStatus::Unlocking);

        let output = match self.host.open_output() {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "audio unsupported, disabling playback");
                self.lifecycle = Lifecycle::Unsupported;
                self.set_status(EngineStatus::Unsupported);
                return Err(e);
            }
        };

        let sample_rate = output.sample_rate();
        self.bus = Some(MasterBus::new(sample_rate, self.master_gain, &self.config.limiter));
        self.output = Some(output);
        self.lifecycle = Lifecycle::Unlocked;
        self.set_status(EngineStatus::Prerendering);
        info!(sample_rate, notes = self.notes.len(), "audio unlocked, prerendering tones");

        let renderer = OfflineRenderer::new(sample_rate)
            .with_duration(self.config.tone_duration_seconds)
            .with_damping(self.damping_cutoff_hz);
        Ok(Some(PrerenderBatch::new(
            self.notes.as_slice().to_vec(),
            renderer,
            self.cache.clone(),
            self.events.clone(),
            self.status.clone(),
        )))
    }

    /// Strike a note. Returns immediately; never waits on a render.
    pub fn trigger_note(&mut self, name: &str) -> TriggerOutcome {
        if self.lifecycle != Lifecycle::Unlocked || self.muted {
            return TriggerOutcome::Ignored;
        }
        let Some(note) = self.notes.get(name) else {
            debug!(note = name, "trigger for unknown note ignored");
            return TriggerOutcome::Ignored;
        };
        let Some(output) = self.output.as_ref() else {
            return TriggerOutcome::Ignored;
        };
        let now = output.current_frame();

        match self.cache.get(name) {
            Some(tone) => {
                self.voices.push(Voice::Cached(PlaybackVoice::new(
                    tone,
                    now,
                    self.release_seconds,
                    self.config.stop_margin_seconds,
                )));
                TriggerOutcome::Cached
            }
            None => {
                debug!(note = name, "tone not cached yet, playing live fallback");
                self.voices.push(Voice::Fallback(FallbackVoice::new(
                    note.fundamental_hz,
                    output.sample_rate(),
                    now,
                    self.config.fallback_decay_seconds,
                    self.config.stop_margin_seconds,
                )));
                TriggerOutcome::Fallback
            }
        }
    }

    /// Render the next block of output. Writes silence while locked.
    pub fn process(&mut self, out: &mut [f32]) {
        let (Some(output), Some(bus)) = (self.output.as_mut(), self.bus.as_mut()) else {
            out.fill(0.0);
            return;
        };

        let block_start = output.current_frame();
        bus.clear(out.len());
        let input = bus.input_mut();
        for voice in self.voices.iter_mut() {
            voice.render_into(block_start, input);
        }
        bus.output(out);

        output.advance(out.len());
        let now = output.current_frame();
        self.voices.retain(|v| !v.is_finished_at(now));
    }

    /// Tear the session down. The engine stays disposed.
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.lifecycle = Lifecycle::Disposed;
        self.voices.clear();
        self.bus = None;
        self.output = None;
        self.cache = ToneCache::new();
        self.set_status(EngineStatus::Disposed);
        info!("audio engine disposed");
    }

    pub fn set_master_gain(&mut self, gain: f64) {
        if !gain.is_finite() {
            return;
        }
        self.master_gain = gain.clamp(0.0, 1.0);
        if let Some(bus) = self.bus.as_mut() {
            bus.set_gain(self.master_gain);
        }
    }

    /// Master bus gain parameter.
    pub fn master_gain(&self) -> f64 {
        self.bus.as_ref().map_or(self.master_gain, |bus| bus.gain())
    }

    /// Set the release time for subsequent strikes. Non-positive values are ignored.
    pub fn set_release_seconds(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds > 0.0 {
            self.release_seconds = seconds;
        }
    }

    /// Set the damping cutoff used by renders that have not started yet.
    pub fn set_damping_cutoff_hz(&mut self, hz: f64) {
        if hz.is_finite() && hz > 0.0 {
            self.damping_cutoff_hz = hz;
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_unlocked(&self) -> bool {
        self.lifecycle == Lifecycle::Unlocked
    }

    pub fn session(&self) -> SessionState {
        SessionState {
            unlocked: self.is_unlocked(),
            muted: self.muted,
            master_gain: self.master_gain(),
            release_seconds: self.release_seconds,
            damping_cutoff_hz: self.damping_cutoff_hz,
        }
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_cache_events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &ToneCache {
        &self.cache
    }

    pub fn notes(&self) -> &NoteSet {
        &self.notes
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Voices currently alive.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn sample_rate(&self) -> Option<f64> {
        self.output.as_ref().map(|o| o.sample_rate())
    }

    /// Current output frame, or 0 before unlock.
    pub fn current_frame(&self) -> u64 {
        self.output.as_ref().map_or(0, |o| o.current_frame())
    }

    fn set_status(&self, status: EngineStatus) {
        self.status.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::modal::compute_partials;
    use crate::dsp::voice::SILENCE_FLOOR;
    use crate::host::{FixedRateHost, UnavailableHost};

    const SR: f64 = 8000.0;

    fn engine() -> AudioEngine<FixedRateHost> {
        AudioEngine::new(FixedRateHost::new(SR), EngineConfig::default()).unwrap()
    }

    fn ready_engine() -> AudioEngine<FixedRateHost> {
        let mut e = engine();
        let mut batch = e.unlock().unwrap().unwrap();
        while batch.render_next() {}
        e
    }

    fn secs(s: f64) -> u64 {
        (s * SR).round() as u64
    }

    /// Host that counts how often output was requested.
    struct CountingHost {
        opens: usize,
    }

    impl AudioHost for CountingHost {
        fn open_output(&mut self) -> Result<OutputContext, EngineError> {
            self.opens += 1;
            OutputContext::new(SR)
        }
    }

    #[test]
    fn trigger_before_unlock_is_silent() {
        let mut e = engine();
        for note in NoteSet::chromatic_octave().iter() {
            assert_eq!(e.trigger_note(&note.name), TriggerOutcome::Ignored);
        }
        assert!(e.voices().is_empty());
        let mut out = vec![1.0_f32; 256];
        e.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(e.status(), EngineStatus::Idle);
    }

    #[test]
    fn unlock_is_idempotent() {
        let mut e =
            AudioEngine::new(CountingHost { opens: 0 }, EngineConfig::default()).unwrap();
        let batch = e.unlock().unwrap();
        assert!(batch.is_some());
        assert!(e.unlock().unwrap().is_none(), "no second prerender batch");
        assert!(e.on_gesture(GestureKind::KeyDown).unwrap().is_none());
        assert_eq!(e.host().opens, 1, "no second output context or bus");
        assert_eq!(e.status(), EngineStatus::Prerendering);
        assert!(e.is_unlocked());
    }

    #[test]
    fn first_gesture_unlocks() {
        let mut e = engine();
        assert!(e.on_gesture(GestureKind::TouchStart).unwrap().is_some());
        assert!(e.on_gesture(GestureKind::PointerDown).unwrap().is_none());
        assert!(e.is_unlocked());
    }

    #[test]
    fn status_sequence_reaches_ready() {
        let mut e = engine();
        let rx = e.subscribe_status();
        assert_eq!(*rx.borrow(), EngineStatus::Idle);
        let mut batch = e.unlock().unwrap().unwrap();
        assert_eq!(*rx.borrow(), EngineStatus::Prerendering);
        while batch.render_next() {}
        assert_eq!(*rx.borrow(), EngineStatus::Ready);
        assert_eq!(e.cache().len(), 13);
    }

    #[tokio::test]
    async fn prerender_batch_completes_cache() {
        let mut e = engine();
        let mut events = e.subscribe_cache_events();
        let report = e.unlock().unwrap().unwrap().run().await;
        assert!(report.is_complete());
        assert_eq!(e.status(), EngineStatus::Ready);
        for note in e.notes().iter() {
            assert!(e.cache().contains(&note.name), "{} missing", note.name);
        }
        let mut announced = 0;
        while events.try_recv().is_ok() {
            announced += 1;
        }
        assert_eq!(announced, 13);
    }

    #[test]
    fn fallback_before_render_completes() {
        let mut e = engine();
        let _batch = e.unlock().unwrap().unwrap();
        assert_eq!(e.trigger_note("C4"), TriggerOutcome::Fallback);

        let voice = &e.voices()[0];
        assert!(voice.is_fallback());
        let start = voice.start_frame();
        assert!(voice.gain_at(start) > 0.5);
        assert!(voice.gain_at(start + secs(0.65)) <= SILENCE_FLOOR + 1e-12);

        let mut out = vec![0.0_f32; 400];
        e.process(&mut out);
        assert!(out.iter().any(|s| s.abs() > 0.01), "fallback should be audible");
    }

    #[test]
    fn fallback_voice_is_torn_down() {
        let mut e = engine();
        let _batch = e.unlock().unwrap().unwrap();
        e.trigger_note("A4");
        let mut out = vec![0.0_f32; 128];
        for _ in 0..(secs(0.7) / 128) {
            e.process(&mut out);
        }
        assert!(e.voices().is_empty());
        e.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn cached_strike_end_to_end() {
        let mut e = ready_engine();
        assert_eq!(e.trigger_note("C4"), TriggerOutcome::Cached);

        let Voice::Cached(voice) = &e.voices()[0] else {
            panic!("expected a cached voice");
        };
        assert_eq!(voice.tone().fundamental_hz, 261.63);
        let ratios: Vec<f64> = compute_partials(voice.tone().fundamental_hz)
            .iter()
            .map(|p| p.frequency_hz / 261.63)
            .collect();
        for (got, want) in ratios.iter().zip([1.00, 2.02, 3.95, 5.40, 6.80]) {
            assert!((got - want).abs() < 1e-9);
        }

        let start = e.current_frame();
        assert_eq!(voice.gain_at(start), 1.0);
        let release = e.session().release_seconds;
        assert!(voice.gain_at(start + secs(release)) <= SILENCE_FLOOR + 1e-12);
        let mut prev = 1.0;
        for f in (start..start + secs(release)).step_by(100) {
            let g = voice.gain_at(f);
            assert!(g <= prev, "release must decay monotonically");
            prev = g;
        }
    }

    #[test]
    fn cached_strike_produces_output() {
        let mut e = ready_engine();
        e.trigger_note("E4");
        let mut out = vec![0.0_f32; 800];
        e.process(&mut out);
        assert!(out.iter().any(|s| s.abs() > 0.01));
        assert!(out.iter().all(|s| s.abs() < 1.0));
    }

    #[test]
    fn polyphonic_voices_are_independent() {
        let mut e = ready_engine();
        e.trigger_note("C4");
        let mut out = vec![0.0_f32; 4]; // half a millisecond at 8 kHz
        e.process(&mut out);
        e.trigger_note("G4");

        let voices = e.voices();
        assert_eq!(voices.len(), 2);
        let (a, b) = (&voices[0], &voices[1]);
        assert_eq!(b.start_frame() - a.start_frame(), 4);
        assert_eq!(b.stop_frame() - a.stop_frame(), 4);
        assert_eq!(a.gain_at(a.start_frame()), 1.0);
        assert_eq!(b.gain_at(b.start_frame()), 1.0);

        // Run past the first voice's stop; the second is untouched.
        let first_stop = a.stop_frame();
        let b_gain_late = b.gain_at(first_stop);
        let mut block = vec![0.0_f32; 1];
        while e.current_frame() < first_stop {
            e.process(&mut block);
        }
        assert_eq!(e.voices().len(), 1);
        assert_eq!(e.voices()[0].gain_at(first_stop), b_gain_late);
    }

    #[test]
    fn repeated_strikes_overlap() {
        let mut e = ready_engine();
        for _ in 0..3 {
            assert_eq!(e.trigger_note("D4"), TriggerOutcome::Cached);
            let mut out = vec![0.0_f32; 16];
            e.process(&mut out);
        }
        assert_eq!(e.voices().len(), 3);
        for v in e.voices() {
            assert_eq!(v.gain_at(v.start_frame()), 1.0);
        }
    }

    #[test]
    fn mute_blocks_dispatch_not_cache() {
        let mut e = ready_engine();
        e.set_muted(true);
        assert_eq!(e.trigger_note("A4"), TriggerOutcome::Ignored);
        assert!(e.voices().is_empty());
        assert!(e.cache().get("A4").is_some());
        e.set_muted(false);
        assert_eq!(e.trigger_note("A4"), TriggerOutcome::Cached);
    }

    #[test]
    fn gain_reaches_bus() {
        let mut e = ready_engine();
        e.set_master_gain(0.5);
        e.trigger_note("B4");
        assert_eq!(e.master_gain(), 0.5);
        assert_eq!(e.session().master_gain, 0.5);
        e.set_master_gain(7.0);
        assert_eq!(e.master_gain(), 1.0);
    }

    #[test]
    fn gain_set_before_unlock_is_kept() {
        let mut e = engine();
        e.set_master_gain(0.25);
        let _batch = e.unlock().unwrap();
        assert_eq!(e.master_gain(), 0.25);
    }

    #[test]
    fn zero_gain_is_silent() {
        let mut e = ready_engine();
        e.set_master_gain(0.0);
        e.trigger_note("C5");
        let mut out = vec![0.0_f32; 512];
        e.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn release_setting_applies_to_next_strike() {
        let mut e = ready_engine();
        e.set_release_seconds(0.3);
        e.set_release_seconds(-1.0);
        e.set_release_seconds(f64::NAN);
        e.trigger_note("F4");
        let v = &e.voices()[0];
        let expected = v.start_frame() + ((0.3 + 0.05) * SR).ceil() as u64;
        assert_eq!(v.stop_frame(), expected);
    }

    #[test]
    fn huge_release_still_starts_a_voice() {
        let mut e = ready_engine();
        let mut out = vec![0.0_f32; 128];
        e.process(&mut out);
        e.set_release_seconds(1e20);
        assert_eq!(e.trigger_note("C4"), TriggerOutcome::Cached);
        assert_eq!(e.voices()[0].stop_frame(), u64::MAX);

        e.process(&mut out);
        assert_eq!(e.voices().len(), 1);
        assert!(out.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn damping_setting_feeds_prerender() {
        let mut a = engine();
        a.set_damping_cutoff_hz(400.0);
        a.set_damping_cutoff_hz(0.0);
        assert_eq!(a.session().damping_cutoff_hz, 400.0);
        let mut batch = a.unlock().unwrap().unwrap();
        while batch.render_next() {}

        let b = ready_engine();
        let dark = a.cache().get("C5").unwrap();
        let bright = b.cache().get("C5").unwrap();
        assert_ne!(dark.samples(), bright.samples());
    }

    #[test]
    fn unknown_note_is_ignored() {
        let mut e = ready_engine();
        assert_eq!(e.trigger_note("H9"), TriggerOutcome::Ignored);
        assert_eq!(e.trigger_note(""), TriggerOutcome::Ignored);
        assert!(e.voices().is_empty());
    }

    #[test]
    fn unsupported_audio_is_fatal_without_retry() {
        let mut e = AudioEngine::new(
            UnavailableHost {
                reason: "no AudioContext".to_string(),
            },
            EngineConfig::default(),
        )
        .unwrap();
        assert!(matches!(e.unlock(), Err(EngineError::AudioUnavailable(_))));
        assert_eq!(e.status(), EngineStatus::Unsupported);
        assert!(e.unlock().is_err());
        assert!(e.on_gesture(GestureKind::KeyDown).unwrap().is_none());
        assert_eq!(e.trigger_note("C4"), TriggerOutcome::Ignored);
    }

    #[test]
    fn dispose_ends_session() {
        let mut e = ready_engine();
        e.trigger_note("C4");
        e.dispose();
        assert_eq!(e.status(), EngineStatus::Disposed);
        assert!(e.voices().is_empty());
        assert!(e.cache().is_empty());
        assert_eq!(e.trigger_note("C4"), TriggerOutcome::Ignored);
        assert!(matches!(e.unlock(), Err(EngineError::Disposed)));
        let mut out = vec![1.0_f32; 64];
        e.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            release_seconds: 0.0,
            ..EngineConfig::default()
        };
        assert!(AudioEngine::new(FixedRateHost::new(SR), config).is_err());
    }
}
