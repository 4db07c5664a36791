//! Voices — one independent, self-terminating instance per strike.
//!
//! A voice is scheduled on the output clock: it starts at `start_frame`,
//! applies its own gain ramp, and is torn down at `stop_frame`. Voices never
//! share envelope state, so rapid repeats of one note overlap cleanly.

use std::sync::Arc;

use super::envelope::ExponentialRamp;
use super::oscillator::SineOscillator;
use super::renderer::RenderedTone;

/// Gain a release ramps down to; treated as silence.
pub const SILENCE_FLOOR: f64 = 0.001;

/// Frames covering `seconds` at `sample_rate`, rounded up.
fn frames(seconds: f64, sample_rate: f64) -> u64 {
    (seconds * sample_rate).ceil() as u64
}

/// Plays a prerendered tone under an exponential release.
#[derive(Debug, Clone)]
pub struct PlaybackVoice {
    tone: Arc<RenderedTone>,
    release: ExponentialRamp,
    start_frame: u64,
    stop_frame: u64,
    /// Frames consumed from the tone buffer.
    position: usize,
}

impl PlaybackVoice {
    pub fn new(
        tone: Arc<RenderedTone>,
        start_frame: u64,
        release_seconds: f64,
        stop_margin_seconds: f64,
    ) -> Self {
        let sample_rate = tone.sample_rate;
        let release = ExponentialRamp::new(1.0, SILENCE_FLOOR, release_seconds, sample_rate);
        let lifetime = frames(release_seconds + stop_margin_seconds, sample_rate);
        PlaybackVoice {
            tone,
            release,
            start_frame,
            stop_frame: start_frame.saturating_add(lifetime),
            position: 0,
        }
    }

    pub fn tone(&self) -> &Arc<RenderedTone> {
        &self.tone
    }

    /// Release gain at an absolute output frame; zero outside the voice's lifetime.
    pub fn gain_at(&self, frame: u64) -> f64 {
        if frame < self.start_frame || frame >= self.stop_frame {
            return 0.0;
        }
        let elapsed = (frame - self.start_frame) as f64 / self.tone.sample_rate;
        self.release.value_at(elapsed)
    }

    /// Add this voice's output for the block beginning at `block_start`.
    pub fn render_into(&mut self, block_start: u64, out: &mut [f64]) {
        let block_end = block_start.saturating_add(out.len() as u64);
        let from = self.start_frame.max(block_start);
        let to = self.stop_frame.min(block_end);
        if from >= to {
            return;
        }

        let offset = (from - self.start_frame) as usize;
        if offset > self.position {
            self.release.skip(offset - self.position);
            self.position = offset;
        }

        for frame in from..to {
            let gain = self.release.next_sample();
            out[(frame - block_start) as usize] += self.tone.sample(self.position) as f64 * gain;
            self.position += 1;
        }
    }
}

/// A live single-sine tone used while a note's prerender is still pending.
#[derive(Debug, Clone)]
pub struct FallbackVoice {
    oscillator: SineOscillator,
    decay: ExponentialRamp,
    sample_rate: f64,
    start_frame: u64,
    stop_frame: u64,
    position: usize,
}

impl FallbackVoice {
    pub fn new(
        frequency: f64,
        sample_rate: f64,
        start_frame: u64,
        decay_seconds: f64,
        stop_margin_seconds: f64,
    ) -> Self {
        let lifetime = frames(decay_seconds + stop_margin_seconds, sample_rate);
        FallbackVoice {
            oscillator: SineOscillator::new(frequency, sample_rate),
            decay: ExponentialRamp::new(1.0, SILENCE_FLOOR, decay_seconds, sample_rate),
            sample_rate,
            start_frame,
            stop_frame: start_frame.saturating_add(lifetime),
            position: 0,
        }
    }

    pub fn gain_at(&self, frame: u64) -> f64 {
        if frame < self.start_frame || frame >= self.stop_frame {
            return 0.0;
        }
        let elapsed = (frame - self.start_frame) as f64 / self.sample_rate;
        self.decay.value_at(elapsed)
    }

    pub fn render_into(&mut self, block_start: u64, out: &mut [f64]) {
        let block_end = block_start.saturating_add(out.len() as u64);
        let from = self.start_frame.max(block_start);
        let to = self.stop_frame.min(block_end);
        if from >= to {
            return;
        }

        let offset = (from - self.start_frame) as usize;
        while self.position < offset {
            self.oscillator.next_sample();
            self.decay.next_sample();
            self.position += 1;
        }

        for frame in from..to {
            let gain = self.decay.next_sample();
            out[(frame - block_start) as usize] += self.oscillator.next_sample() * gain;
            self.position += 1;
        }
    }
}

/// Any playing voice.
#[derive(Debug, Clone)]
pub enum Voice {
    Cached(PlaybackVoice),
    Fallback(FallbackVoice),
}

impl Voice {
    pub fn start_frame(&self) -> u64 {
        match self {
            Voice::Cached(v) => v.start_frame,
            Voice::Fallback(v) => v.start_frame,
        }
    }

    /// Frame at which the voice tears itself down.
    pub fn stop_frame(&self) -> u64 {
        match self {
            Voice::Cached(v) => v.stop_frame,
            Voice::Fallback(v) => v.stop_frame,
        }
    }

    pub fn gain_at(&self, frame: u64) -> f64 {
        match self {
            Voice::Cached(v) => v.gain_at(frame),
            Voice::Fallback(v) => v.gain_at(frame),
        }
    }

    pub fn render_into(&mut self, block_start: u64, out: &mut [f64]) {
        match self {
            Voice::Cached(v) => v.render_into(block_start, out),
            Voice::Fallback(v) => v.render_into(block_start, out),
        }
    }

    /// Has the voice reached its stop time at `frame`?
    pub fn is_finished_at(&self, frame: u64) -> bool {
        frame >= self.stop_frame()
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Voice::Fallback(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::renderer::OfflineRenderer;

    const SR: f64 = 44100.0;

    fn tone() -> Arc<RenderedTone> {
        Arc::new(OfflineRenderer::new(SR).render_tone(440.0).unwrap())
    }

    #[test]
    fn release_starts_full_and_ends_silent() {
        let v = PlaybackVoice::new(tone(), 1000, 1.2, 0.05);
        assert_eq!(v.gain_at(999), 0.0);
        assert_eq!(v.gain_at(1000), 1.0);
        let at_release = v.gain_at(1000 + (1.2 * SR).round() as u64);
        assert!(at_release <= SILENCE_FLOOR + 1e-12, "got {at_release}");
    }

    #[test]
    fn stop_is_release_plus_margin() {
        let v = Voice::Cached(PlaybackVoice::new(tone(), 0, 1.2, 0.05));
        assert_eq!(v.stop_frame(), frames(1.2 + 0.05, SR));
        assert!(v.stop_frame().abs_diff((1.25 * SR) as u64) <= 1);
        assert!(!v.is_finished_at(v.stop_frame() - 1));
        assert!(v.is_finished_at(v.stop_frame()));
        assert_eq!(v.gain_at(v.stop_frame()), 0.0);
    }

    #[test]
    fn render_reads_tone_under_release() {
        let t = tone();
        let mut v = PlaybackVoice::new(t.clone(), 0, 1.2, 0.05);
        let mut out = vec![0.0; 256];
        v.render_into(0, &mut out);
        for (i, &s) in out.iter().enumerate() {
            let expected = t.sample(i) as f64 * v.gain_at(i as u64);
            assert!((s - expected).abs() < 1e-9, "frame {i}: {s} vs {expected}");
        }
    }

    #[test]
    fn voice_starting_mid_block_leaves_earlier_frames() {
        let mut v = PlaybackVoice::new(tone(), 100, 1.2, 0.05);
        let mut out = vec![0.5; 128];
        v.render_into(64, &mut out);
        assert!(out[..36].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn blockwise_render_matches_single_pass() {
        let t = tone();
        let mut a = PlaybackVoice::new(t.clone(), 10, 0.1, 0.05);
        let mut b = a.clone();
        let mut whole = vec![0.0; 8192];
        a.render_into(0, &mut whole);
        let mut pieces = vec![0.0; 8192];
        for (i, chunk) in pieces.chunks_mut(128).enumerate() {
            b.render_into(i as u64 * 128, chunk);
        }
        for (x, y) in whole.iter().zip(pieces.iter()) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn nothing_rendered_after_stop() {
        let mut v = PlaybackVoice::new(tone(), 0, 0.01, 0.0);
        let mut out = vec![0.0; 1024];
        v.render_into(1000, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn fallback_is_audible_then_silent_by_650ms() {
        let v = FallbackVoice::new(261.63, SR, 0, 0.6, 0.05);
        assert_eq!(v.gain_at(0), 1.0);
        assert!(v.gain_at((0.6 * SR).round() as u64) <= SILENCE_FLOOR + 1e-12);
        assert!(v.gain_at((0.65 * SR).round() as u64) <= SILENCE_FLOOR + 1e-12);
        assert_eq!(v.gain_at((0.7 * SR) as u64), 0.0);
    }

    #[test]
    fn fallback_produces_sound() {
        let mut v = FallbackVoice::new(440.0, SR, 0, 0.6, 0.05);
        let mut out = vec![0.0; 4410];
        v.render_into(0, &mut out);
        assert!(out.iter().any(|s| s.abs() > 0.5));
        assert!(out.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn overlapping_voices_are_independent() {
        let t = tone();
        let first = PlaybackVoice::new(t.clone(), 0, 1.2, 0.05);
        let second = PlaybackVoice::new(t, 4410, 1.2, 0.05);
        // The second strike restarts at full scale instead of inheriting the first's decay.
        assert_eq!(second.gain_at(4410), 1.0);
        assert!(first.gain_at(4410) < 1.0);
        assert_eq!(second.stop_frame - first.stop_frame, 4410);
    }

    #[test]
    fn huge_release_saturates_stop_frame() {
        let late = 1_000_000;
        let mut v = PlaybackVoice::new(tone(), late, 1e20, 0.05);
        assert_eq!(v.stop_frame, u64::MAX);
        assert_eq!(v.gain_at(late), 1.0);
        let mut out = vec![0.0; 256];
        v.render_into(late, &mut out);
        assert!(out.iter().any(|s| s.abs() > 0.01));

        let f = FallbackVoice::new(440.0, SR, late, 1e20, 0.05);
        assert_eq!(f.stop_frame, u64::MAX);
        assert!(!Voice::Fallback(f).is_finished_at(late + 1));
    }
}
