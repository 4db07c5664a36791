//! Offline renderer — synthesizes one fixed-length buffer per note.
//!
//! Each render allocates its own [`OfflineContext`], so renders share no
//! state and may run concurrently in any order. The context evaluates the
//! modal model (five oscillator + envelope chains into one damping low-pass)
//! faster than real time and yields the finished [`RenderedTone`].

use std::sync::Arc;

use tracing::debug;

use crate::error::EngineError;

use super::filter::LowpassFilter;
use super::modal::{self, PartialDescriptor};
use super::oscillator::SineOscillator;

/// Lowest sample rate an offline context accepts.
pub const MIN_SAMPLE_RATE: f64 = 3000.0;
/// Highest sample rate an offline context accepts.
pub const MAX_SAMPLE_RATE: f64 = 768_000.0;
/// Default rendered tone length in seconds.
pub const DEFAULT_DURATION: f64 = 2.0;
/// Frames rendered between cooperative yields.
pub const RENDER_QUANTUM: usize = 4096;
/// Frames between damping cutoff updates.
const CONTROL_INTERVAL: usize = 32;

/// Number of frames in a buffer of `duration` seconds.
pub fn frame_count(duration: f64, sample_rate: f64) -> usize {
    (duration * sample_rate).ceil() as usize
}

/// An immutable mono buffer holding one rendered note.
#[derive(Debug, Clone)]
pub struct RenderedTone {
    pub fundamental_hz: f64,
    pub sample_rate: f64,
    samples: Arc<[f32]>,
}

impl RenderedTone {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample at `index`, or silence past the end.
    #[inline]
    pub fn sample(&self, index: usize) -> f32 {
        self.samples.get(index).copied().unwrap_or(0.0)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |m, &s| m.max(s.abs()))
    }
}

/// One partial's oscillator plus its frequency/gain automation.
#[derive(Debug, Clone)]
struct PartialChain {
    partial: PartialDescriptor,
    oscillator: SineOscillator,
}

/// An isolated offline processing context for a single tone.
#[derive(Debug)]
pub struct OfflineContext {
    sample_rate: f64,
    fundamental_hz: f64,
    damping_cutoff_hz: f64,
    chains: Vec<PartialChain>,
    filter: LowpassFilter,
    mix_scale: f64,
    output: Vec<f32>,
    length: usize,
}

impl OfflineContext {
    /// Allocate a context for `length` frames at `sample_rate`.
    ///
    /// Fails when the sample rate is outside the supported range or the
    /// requested length is zero.
    pub fn new(sample_rate: f64, length: usize) -> Result<Self, EngineError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) || length == 0 {
            return Err(EngineError::OfflineContext {
                sample_rate,
                frames: length,
            });
        }
        Ok(OfflineContext {
            sample_rate,
            fundamental_hz: 0.0,
            damping_cutoff_hz: modal::DAMPING_START_HZ,
            chains: Vec::new(),
            filter: LowpassFilter::new(modal::DAMPING_START_HZ, sample_rate),
            mix_scale: 1.0 / modal::total_peak_gain(),
            output: Vec::with_capacity(length),
            length,
        })
    }

    /// Build the five partial chains for a struck tone at `fundamental_hz`.
    pub fn connect_tone(
        &mut self,
        fundamental_hz: f64,
        damping_cutoff_hz: f64,
    ) -> Result<(), EngineError> {
        if !(fundamental_hz.is_finite() && fundamental_hz > 0.0) {
            return Err(EngineError::InvalidFrequency(fundamental_hz));
        }
        self.fundamental_hz = fundamental_hz;
        self.damping_cutoff_hz = damping_cutoff_hz;
        self.chains = modal::compute_partials(fundamental_hz)
            .into_iter()
            .map(|partial| PartialChain {
                oscillator: SineOscillator::new(partial.frequency_at(0.0), self.sample_rate),
                partial,
            })
            .collect();
        self.filter.reset();
        self.filter.set_frequency(modal::DAMPING_START_HZ);
        Ok(())
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Frames rendered so far.
    pub fn position(&self) -> usize {
        self.output.len()
    }

    pub fn is_complete(&self) -> bool {
        self.output.len() >= self.length
    }

    /// Render up to `frames` more frames. Returns true once the buffer is full.
    pub fn render_quantum(&mut self, frames: usize) -> bool {
        let end = (self.output.len() + frames).min(self.length);
        for n in self.output.len()..end {
            let t = n as f64 / self.sample_rate;

            if n % CONTROL_INTERVAL == 0 {
                self.filter
                    .set_frequency(modal::damping_cutoff_at(t, self.damping_cutoff_hz));
            }

            let mut sum = 0.0;
            for chain in self.chains.iter_mut() {
                chain.oscillator.frequency = chain.partial.frequency_at(t);
                sum += chain.oscillator.next_sample() * chain.partial.gain_at(t);
            }

            let sample = self.filter.process(sum * self.mix_scale);
            self.output.push(sample as f32);
        }
        self.is_complete()
    }

    /// Take the finished buffer.
    pub fn finish(self) -> RenderedTone {
        RenderedTone {
            fundamental_hz: self.fundamental_hz,
            sample_rate: self.sample_rate,
            samples: self.output.into(),
        }
    }
}

/// Render parameters shared by every note of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OfflineRenderer {
    pub sample_rate: f64,
    pub duration: f64,
    pub damping_cutoff_hz: f64,
}

impl OfflineRenderer {
    pub fn new(sample_rate: f64) -> Self {
        OfflineRenderer {
            sample_rate,
            duration: DEFAULT_DURATION,
            damping_cutoff_hz: 3000.0,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_damping(mut self, damping_cutoff_hz: f64) -> Self {
        self.damping_cutoff_hz = damping_cutoff_hz;
        self
    }

    /// Allocate and wire a fresh context for one tone.
    pub fn start(&self, fundamental_hz: f64) -> Result<OfflineContext, EngineError> {
        let length = if self.duration.is_finite() && self.duration > 0.0 {
            frame_count(self.duration, self.sample_rate)
        } else {
            0
        };
        let mut ctx = OfflineContext::new(self.sample_rate, length)?;
        ctx.connect_tone(fundamental_hz, self.damping_cutoff_hz)?;
        Ok(ctx)
    }

    /// Render a tone to completion on the calling thread.
    pub fn render_tone(&self, fundamental_hz: f64) -> Result<RenderedTone, EngineError> {
        let mut ctx = self.start(fundamental_hz)?;
        ctx.render_quantum(ctx.length());
        debug!(fundamental_hz, frames = ctx.length(), "rendered tone");
        Ok(ctx.finish())
    }

    /// Render a tone, yielding to the runtime between quanta so other tasks
    /// (including other renders) make progress.
    pub async fn render_tone_async(
        &self,
        fundamental_hz: f64,
    ) -> Result<RenderedTone, EngineError> {
        let mut ctx = self.start(fundamental_hz)?;
        while !ctx.render_quantum(RENDER_QUANTUM) {
            tokio::task::yield_now().await;
        }
        debug!(fundamental_hz, frames = ctx.length(), "rendered tone");
        Ok(ctx.finish())
    }
}

/// Render a tone with the default damping cutoff.
pub fn render_tone(
    fundamental_hz: f64,
    sample_rate: f64,
    duration: f64,
) -> Result<RenderedTone, EngineError> {
    OfflineRenderer::new(sample_rate)
        .with_duration(duration)
        .render_tone(fundamental_hz)
}
