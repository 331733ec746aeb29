pub mod dsp;
pub mod error;
pub mod params;
pub mod patch;
pub mod processor;

use crate::dsp::renderer::TimedNote;
use crate::params::{PARAM_SPECS, ParamId, ParamStore};
use crate::processor::{EngineConfig, SynthProcessor};
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the duosynth version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: every parameter's id, range, default, step, skew and unit.
#[wasm_bindgen]
pub fn param_specs() -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(PARAM_SPECS).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: bounce a JSON list of `{note, velocity?, start, duration}`
/// (seconds) to a WAV byte array, optionally applying patch JSON first.
#[wasm_bindgen]
pub fn render_notes_wav(
    notes_json: &str,
    patch_json: Option<String>,
    sample_rate: u32,
) -> Result<Vec<u8>, JsValue> {
    let notes: Vec<TimedNote> =
        serde_json::from_str(notes_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let params = ParamStore::new();
    if let Some(patch) = patch_json {
        patch::apply_patch_json(&params, &patch).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    }
    dsp::renderer::render_notes_wav(&notes, &params, sample_rate, 1.0)
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed synth for AudioWorklet playback: stereo, no inputs.
#[wasm_bindgen]
pub struct WasmSynth {
    processor: SynthProcessor,
}

#[wasm_bindgen]
impl WasmSynth {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f32, max_block_size: usize) -> Result<WasmSynth, JsValue> {
        let config = EngineConfig {
            sample_rate: sample_rate as f64,
            max_block_size,
            ..EngineConfig::default()
        };
        let processor = SynthProcessor::new(config).map_err(|e| JsValue::from_str(&format!("{e}")))?;
        Ok(WasmSynth { processor })
    }

    pub fn note_on(&mut self, note: u8, velocity: f32) {
        self.processor.note_on(note, velocity);
    }

    pub fn note_off(&mut self, note: u8) {
        self.processor.note_off(note);
    }

    pub fn all_notes_off(&mut self, hard: bool) {
        self.processor.all_notes_off(hard);
    }

    /// Set a parameter by id; returns false for unknown ids.
    pub fn set_param(&self, key: &str, value: f64) -> bool {
        self.processor.params().set_by_key(key, value).is_some()
    }

    pub fn get_param(&self, key: &str) -> Option<f32> {
        self.processor.params().get_by_key(key)
    }

    /// Set a parameter from a normalized [0, 1] knob position, honoring skew
    /// and step. Returns the stored real value, or `None` for unknown ids.
    pub fn set_param_normalized(&self, key: &str, normalized: f32) -> Option<f32> {
        ParamId::from_key(key).map(|id| self.processor.params().set_normalized(id, normalized))
    }

    pub fn get_param_normalized(&self, key: &str) -> Option<f32> {
        ParamId::from_key(key).map(|id| self.processor.params().get_normalized(id))
    }

    /// Apply patch JSON; returns how many known parameters were written.
    pub fn apply_patch_json(&self, json: &str) -> Result<u32, JsValue> {
        let report = patch::apply_patch_json(&self.processor.params(), json)
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        Ok(report.applied as u32)
    }

    /// Render one block into planar left/right buffers.
    pub fn render_into(&mut self, left: &mut [f32], right: &mut [f32]) {
        let n = left.len().min(right.len());
        let mut channels: [&mut [f32]; 2] = [left, right];
        self.processor.render(&[], &mut channels, n);
    }

    pub fn active_voices(&self) -> usize {
        self.processor.active_voices()
    }

    /// Latest `{rms, peak}` reading.
    pub fn meter(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.processor.meter_reader().reading())
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }
}
