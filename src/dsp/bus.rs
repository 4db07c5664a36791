//! Master bus — sums voice output, applies master gain, then the limiter.

use crate::config::LimiterConfig;

use super::limiter::Limiter;

/// The shared output bus all voices are routed through.
#[derive(Debug, Clone)]
pub struct MasterBus {
    gain: f64,
    limiter: Limiter,
    buffer: Vec<f64>,
}

impl MasterBus {
    pub fn new(sample_rate: f64, gain: f64, limiter: &LimiterConfig) -> Self {
        MasterBus {
            gain: gain.clamp(0.0, 1.0),
            limiter: Limiter::new(sample_rate, limiter),
            buffer: Vec::new(),
        }
    }

    /// Current master gain parameter.
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Set master gain, clamped to [0, 1].
    pub fn set_gain(&mut self, gain: f64) {
        if gain.is_finite() {
            self.gain = gain.clamp(0.0, 1.0);
        }
    }

    /// Prepare a buffer of `num_samples` filled with zeros.
    pub fn clear(&mut self, num_samples: usize) {
        self.buffer.clear();
        self.buffer.resize(num_samples, 0.0);
    }

    /// Mutable view of the summing buffer for voices to add into.
    pub fn input_mut(&mut self) -> &mut [f64] {
        &mut self.buffer
    }

    /// Write the summed block through gain and limiter into `out`.
    pub fn output(&mut self, out: &mut [f32]) {
        for (o, &s) in out.iter_mut().zip(self.buffer.iter()) {
            *o = self.limiter.process((s * self.gain) as f32);
        }
        if out.len() > self.buffer.len() {
            out[self.buffer.len()..].fill(0.0);
        }
    }
}
