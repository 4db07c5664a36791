//! DSP — modal tone synthesis and playback primitives.
//!
//! Tones are rendered offline into fixed buffers; playback only reads those
//! buffers under a per-voice gain ramp and mixes them on the master bus.

pub mod bus;
pub mod envelope;
pub mod filter;
pub mod limiter;
pub mod modal;
pub mod oscillator;
pub mod renderer;
pub mod voice;
