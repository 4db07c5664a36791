//! Sine oscillator with a phase accumulator.

use std::f64::consts::PI;

/// A sine oscillator whose frequency may change every sample.
///
/// Phase is accumulated rather than computed from `f * t`, so frequency
/// glides stay continuous.
#[derive(Debug, Clone)]
pub struct SineOscillator {
    pub frequency: f64,
    phase: f64,
    sample_rate: f64,
}

impl SineOscillator {
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        SineOscillator {
            frequency,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Phase increment per sample, in cycles.
    fn phase_inc(&self) -> f64 {
        self.frequency / self.sample_rate
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self) -> f64 {
        let sample = (2.0 * PI * self.phase).sin();
        self.phase += self.phase_inc();
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        sample
    }
}
