//! Peak limiter for the master bus.
//!
//! A feed-forward compressor with a high ratio, using the same
//! threshold/knee/ratio/attack/release parameters as the WebAudio
//! DynamicsCompressorNode.

use crate::config::LimiterConfig;

#[derive(Debug, Clone)]
pub struct Limiter {
    sample_rate: f64,

    /// Threshold in dB.
    pub threshold: f64,
    pub ratio: f64,
    /// Knee width in dB (0 = hard knee).
    pub knee: f64,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,

    attack_coef: f64,
    release_coef: f64,
    envelope: f64,
}

impl Limiter {
    pub fn new(sample_rate: f64, config: &LimiterConfig) -> Self {
        let mut limiter = Limiter {
            sample_rate,
            threshold: config.threshold_db.clamp(-60.0, 0.0),
            ratio: config.ratio.clamp(1.0, 20.0),
            knee: config.knee_db.clamp(0.0, 40.0),
            attack: config.attack.clamp(0.0001, 1.0),
            release: config.release.clamp(0.001, 5.0),
            attack_coef: 0.0,
            release_coef: 0.0,
            envelope: 0.0,
        };
        limiter.update_coefficients();
        limiter
    }

    fn update_coefficients(&mut self) {
        self.attack_coef = (-1.0 / (self.attack * self.sample_rate)).exp();
        self.release_coef = (-1.0 / (self.release * self.sample_rate)).exp();
    }

    #[inline]
    fn linear_to_db(linear: f64) -> f64 {
        if linear <= 0.0 {
            -120.0
        } else {
            20.0 * linear.log10()
        }
    }

    #[inline]
    fn db_to_linear(db: f64) -> f64 {
        10.0_f64.powf(db / 20.0)
    }

    /// Gain change in dB (zero or negative) for an input level in dB.
    #[inline]
    fn compute_gain(&self, input_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;
        if self.knee <= 0.0 {
            if input_db <= self.threshold {
                0.0
            } else {
                (self.threshold - input_db) * slope
            }
        } else {
            let half_knee = self.knee / 2.0;
            let knee_start = self.threshold - half_knee;
            let knee_end = self.threshold + half_knee;
            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (self.threshold - input_db) * slope
            } else {
                let x = (input_db - knee_start) / self.knee;
                -x * x * slope * half_knee
            }
        }
    }

    /// Process one mono sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let level = input.abs() as f64;
        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;

        let gain_db = self.compute_gain(Self::linear_to_db(self.envelope));
        input * Self::db_to_linear(gain_db) as f32
    }

    /// Process a block of mono audio in-place.
    pub fn process_block(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}
