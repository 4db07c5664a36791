//! Exponential gain ramp.

/// An exponential ramp from `start` to `target` over `duration` seconds,
/// holding `target` once the ramp completes.
///
/// Both endpoints must be positive: an exponential curve never reaches zero,
/// so "silent" is expressed as a small floor such as 0.001.
#[derive(Debug, Clone)]
pub struct ExponentialRamp {
    pub start: f64,
    pub target: f64,
    pub duration: f64,
    sample_rate: f64,
    /// Per-sample multiplier while ramping.
    step: f64,
    level: f64,
    ramp_samples: usize,
    counter: usize,
}

impl ExponentialRamp {
    pub fn new(start: f64, target: f64, duration: f64, sample_rate: f64) -> Self {
        let ramp_samples = (duration * sample_rate).round() as usize;
        let step = if ramp_samples == 0 {
            1.0
        } else {
            (target / start).powf(1.0 / ramp_samples as f64)
        };
        ExponentialRamp {
            start,
            target,
            duration,
            sample_rate,
            step,
            level: start,
            ramp_samples,
            counter: 0,
        }
    }

    /// Ramp value `elapsed` seconds after the ramp began.
    pub fn value_at(&self, elapsed: f64) -> f64 {
        if elapsed <= 0.0 {
            self.start
        } else if elapsed >= self.duration {
            self.target
        } else {
            self.start * (self.target / self.start).powf(elapsed / self.duration)
        }
    }

    /// Generate the next gain sample.
    pub fn next_sample(&mut self) -> f64 {
        if self.counter >= self.ramp_samples {
            self.level = self.target;
            return self.level;
        }
        let out = self.level;
        self.level *= self.step;
        self.counter += 1;
        out
    }

    /// Advance the ramp by `samples` without producing output.
    pub fn skip(&mut self, samples: usize) {
        let remaining = self.ramp_samples.saturating_sub(self.counter);
        if samples >= remaining {
            self.counter = self.ramp_samples;
            self.level = self.target;
        } else {
            self.counter += samples;
            self.level = self.value_at(self.counter as f64 / self.sample_rate);
        }
    }

    /// Has the ramp reached its target?
    pub fn is_finished(&self) -> bool {
        self.counter >= self.ramp_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_start_value() {
        let mut ramp = ExponentialRamp::new(1.0, 0.001, 1.2, 44100.0);
        assert_eq!(ramp.next_sample(), 1.0);
    }

    #[test]
    fn reaches_target_at_duration() {
        let mut ramp = ExponentialRamp::new(1.0, 0.001, 0.1, 44100.0);
        let mut last = 1.0;
        for _ in 0..4410 {
            last = ramp.next_sample();
        }
        assert!((last - 0.001).abs() < 1e-4, "got {last}");
        assert!(ramp.is_finished());
        assert_eq!(ramp.next_sample(), 0.001);
    }

    #[test]
    fn monotonic_decay() {
        let mut ramp = ExponentialRamp::new(1.0, 0.001, 0.05, 48000.0);
        let mut prev = f64::MAX;
        for _ in 0..3000 {
            let s = ramp.next_sample();
            assert!(s <= prev && s > 0.0, "ramp must decay monotonically, got {s}");
            prev = s;
        }
    }

    #[test]
    fn value_at_matches_closed_form() {
        let ramp = ExponentialRamp::new(1.0, 0.001, 1.0, 44100.0);
        assert_eq!(ramp.value_at(0.0), 1.0);
        assert!((ramp.value_at(0.5) - 0.001_f64.sqrt()).abs() < 1e-12);
        assert_eq!(ramp.value_at(1.0), 0.001);
        assert_eq!(ramp.value_at(3.0), 0.001);
    }

    #[test]
    fn sample_stream_tracks_closed_form() {
        let sr = 44100.0;
        let mut ramp = ExponentialRamp::new(1.0, 0.001, 0.6, sr);
        let reference = ramp.clone();
        for n in 0..26460 {
            let s = ramp.next_sample();
            let expected = reference.value_at(n as f64 / sr);
            assert!((s - expected).abs() < 1e-6, "sample {n}: {s} vs {expected}");
        }
    }

    #[test]
    fn skip_lands_on_same_value() {
        let mut a = ExponentialRamp::new(1.0, 0.001, 0.2, 44100.0);
        let mut b = a.clone();
        for _ in 0..1000 {
            a.next_sample();
        }
        b.skip(1000);
        assert!((a.next_sample() - b.next_sample()).abs() < 1e-9);
        b.skip(1_000_000);
        assert!(b.is_finished());
    }
}
