//! Modal tone model for a struck metal bar.
//!
//! A strike is modeled as five inharmonic partials, each a decaying sine at a
//! fixed ratio of the fundamental. Only the fundamental changes from note to
//! note; the partial table is shared by every note.
//!
//! Per partial:
//! - frequency starts 2% sharp and glides linearly down to its steady ratio
//!   over the first 20 ms (the strike transient), then holds;
//! - amplitude rises linearly to the partial's peak gain over 2 ms, then
//!   decays exponentially with the partial's own time constant.
//!
//! The mixed partials pass through one low-pass whose cutoff sweeps
//! exponentially from 10 kHz down to the damping cutoff over 350 ms.

/// One resonant mode of the bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModalPartial {
    /// Frequency ratio relative to the fundamental (>= 1).
    pub ratio: f64,
    /// Peak amplitude in (0, 1].
    pub peak_gain: f64,
    /// Exponential decay time constant in seconds.
    pub decay_tau: f64,
}

/// The five partials shared by every note.
pub const PARTIALS: [ModalPartial; 5] = [
    ModalPartial {
        ratio: 1.00,
        peak_gain: 1.00,
        decay_tau: 1.20,
    },
    ModalPartial {
        ratio: 2.02,
        peak_gain: 0.42,
        decay_tau: 0.90,
    },
    ModalPartial {
        ratio: 3.95,
        peak_gain: 0.30,
        decay_tau: 0.70,
    },
    ModalPartial {
        ratio: 5.40,
        peak_gain: 0.20,
        decay_tau: 0.55,
    },
    ModalPartial {
        ratio: 6.80,
        peak_gain: 0.16,
        decay_tau: 0.45,
    },
];

/// Initial pitch offset of the strike transient.
pub const GLIDE_START: f64 = 1.02;
/// Seconds the strike glide lasts.
pub const GLIDE_TIME: f64 = 0.020;
/// Seconds of linear attack before the decay starts.
pub const ATTACK_TIME: f64 = 0.002;
/// Damping sweep start frequency in Hz.
pub const DAMPING_START_HZ: f64 = 10_000.0;
/// Seconds the damping sweep lasts.
pub const DAMPING_SWEEP_TIME: f64 = 0.350;

/// One partial evaluated for a specific fundamental.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialDescriptor {
    /// Steady-state frequency in Hz.
    pub frequency_hz: f64,
    pub peak_gain: f64,
    pub decay_tau: f64,
}

impl PartialDescriptor {
    /// Instantaneous frequency `t` seconds after the strike.
    pub fn frequency_at(&self, t: f64) -> f64 {
        let glide = if t < GLIDE_TIME {
            GLIDE_START - (t / GLIDE_TIME) * (GLIDE_START - 1.0)
        } else {
            1.0
        };
        self.frequency_hz * glide
    }

    /// Amplitude `t` seconds after the strike.
    pub fn gain_at(&self, t: f64) -> f64 {
        if t <= 0.0 {
            0.0
        } else if t < ATTACK_TIME {
            self.peak_gain * t / ATTACK_TIME
        } else {
            self.peak_gain * (-(t - ATTACK_TIME) / self.decay_tau).exp()
        }
    }
}

/// Evaluate the partial table for a fundamental frequency.
pub fn compute_partials(fundamental_hz: f64) -> [PartialDescriptor; 5] {
    PARTIALS.map(|p| PartialDescriptor {
        frequency_hz: fundamental_hz * p.ratio,
        peak_gain: p.peak_gain,
        decay_tau: p.decay_tau,
    })
}

/// Sum of all partial peak gains; dividing the mix by it keeps it in [-1, 1].
pub fn total_peak_gain() -> f64 {
    PARTIALS.iter().map(|p| p.peak_gain).sum()
}

/// Low-pass cutoff `t` seconds after the strike.
pub fn damping_cutoff_at(t: f64, damping_cutoff_hz: f64) -> f64 {
    if t <= 0.0 {
        DAMPING_START_HZ
    } else if t >= DAMPING_SWEEP_TIME {
        damping_cutoff_hz
    } else {
        DAMPING_START_HZ * (damping_cutoff_hz / DAMPING_START_HZ).powf(t / DAMPING_SWEEP_TIME)
    }
}
