pub mod cache;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod host;
pub mod notes;

use crate::cache::PrerenderBatch;
use crate::config::EngineConfig;
use crate::engine::{AudioEngine, TriggerOutcome};
use crate::host::FixedRateHost;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the crate version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed instrument for the page script.
///
/// The page creates it with the AudioContext's sample rate, calls
/// `unlock()` from its first gesture handler, then calls `prerenderNext()`
/// from idle callbacks until it returns false. The AudioWorklet pulls
/// samples through `process()`.
#[wasm_bindgen]
pub struct Instrument {
    engine: AudioEngine<FixedRateHost>,
    batch: Option<PrerenderBatch>,
}

#[wasm_bindgen]
impl Instrument {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> Result<Instrument, JsValue> {
        Self::build(sample_rate, EngineConfig::default())
    }

    /// Create an instrument from a JSON config document.
    #[wasm_bindgen(js_name = withConfig)]
    pub fn with_config(sample_rate: f64, config_json: &str) -> Result<Instrument, JsValue> {
        let config =
            EngineConfig::from_json(config_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
        Self::build(sample_rate, config)
    }

    fn build(sample_rate: f64, config: EngineConfig) -> Result<Instrument, JsValue> {
        let engine = AudioEngine::new(FixedRateHost::new(sample_rate), config)
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        Ok(Instrument {
            engine,
            batch: None,
        })
    }

    pub fn unlock(&mut self) -> Result<(), JsValue> {
        let batch = self
            .engine
            .unlock()
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        if batch.is_some() {
            self.batch = batch;
        }
        Ok(())
    }

    /// Render one more note. Returns true while notes remain.
    #[wasm_bindgen(js_name = prerenderNext)]
    pub fn prerender_next(&mut self) -> bool {
        let Some(batch) = self.batch.as_mut() else {
            return false;
        };
        if batch.render_next() {
            true
        } else {
            self.batch = None;
            false
        }
    }

    /// Strike a note. Returns whether a voice started.
    #[wasm_bindgen(js_name = triggerNote)]
    pub fn trigger_note(&mut self, name: &str) -> bool {
        self.engine.trigger_note(name) != TriggerOutcome::Ignored
    }

    #[wasm_bindgen(js_name = setMasterGain)]
    pub fn set_master_gain(&mut self, gain: f64) {
        self.engine.set_master_gain(gain);
    }

    #[wasm_bindgen(js_name = setReleaseSeconds)]
    pub fn set_release_seconds(&mut self, seconds: f64) {
        self.engine.set_release_seconds(seconds);
    }

    #[wasm_bindgen(js_name = setDampingCutoffHz)]
    pub fn set_damping_cutoff_hz(&mut self, hz: f64) {
        self.engine.set_damping_cutoff_hz(hz);
    }

    #[wasm_bindgen(js_name = setMuted)]
    pub fn set_muted(&mut self, muted: bool) {
        self.engine.set_muted(muted);
    }

    #[wasm_bindgen(js_name = isCached)]
    pub fn is_cached(&self, name: &str) -> bool {
        self.engine.cache().contains(name)
    }

    /// Fill an output block (mono f32).
    pub fn process(&mut self, out: &mut [f32]) {
        self.engine.process(out);
    }

    /// Current status: "idle", "unlocking", "prerendering", "ready", ...
    pub fn status(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.status())
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// The session's UI-controlled values.
    pub fn session(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.session())
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    /// The playable notes as `[{ name, fundamentalHz }]`.
    pub fn notes(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.engine.notes().as_slice())
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }

    pub fn dispose(&mut self) {
        self.batch = None;
        self.engine.dispose();
    }
}
