//! Audio host — where the output context and its clock come from.
//!
//! In the browser the host is the page's AudioContext driving an
//! AudioWorklet; natively it is whatever device callback pulls
//! [`AudioEngine::process`](crate::engine::AudioEngine::process). Either way
//! the engine only needs the device sample rate and a frame clock.

use crate::dsp::renderer::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::error::EngineError;

/// Supplies the audio output context on unlock.
pub trait AudioHost {
    /// Acquire the output context. Called once, on the first gesture.
    fn open_output(&mut self) -> Result<OutputContext, EngineError>;
}

/// The acquired output context: device rate plus the output clock.
#[derive(Debug, Clone)]
pub struct OutputContext {
    sample_rate: f64,
    /// Next frame the device will pull.
    frame: u64,
}

impl OutputContext {
    pub fn new(sample_rate: f64) -> Result<Self, EngineError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(EngineError::AudioUnavailable(format!(
                "unsupported output sample rate {sample_rate}"
            )));
        }
        Ok(OutputContext {
            sample_rate,
            frame: 0,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current output frame.
    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    /// Current output time in seconds.
    pub fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    /// Move the clock forward after `frames` have been delivered.
    pub fn advance(&mut self, frames: usize) {
        self.frame += frames as u64;
    }

    pub fn seconds_to_frames(&self, seconds: f64) -> u64 {
        (seconds * self.sample_rate).ceil() as u64
    }
}

/// A host whose device runs at a known, fixed rate.
#[derive(Debug, Clone, Copy)]
pub struct FixedRateHost {
    pub sample_rate: f64,
}

impl FixedRateHost {
    pub fn new(sample_rate: f64) -> Self {
        FixedRateHost { sample_rate }
    }
}

impl AudioHost for FixedRateHost {
    fn open_output(&mut self) -> Result<OutputContext, EngineError> {
        OutputContext::new(self.sample_rate)
    }
}

/// A host with no audio output at all.
#[derive(Debug, Clone, Default)]
pub struct UnavailableHost {
    pub reason: String,
}

impl AudioHost for UnavailableHost {
    fn open_output(&mut self) -> Result<OutputContext, EngineError> {
        Err(EngineError::AudioUnavailable(self.reason.clone()))
    }
}
