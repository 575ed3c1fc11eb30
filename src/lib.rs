pub mod clock;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod pitch;
#[cfg(not(target_arch = "wasm32"))]
pub mod player;
pub mod scheduler;
pub mod sequencer;
pub mod sink;
pub mod timeline;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::EngineConfig;
pub use crate::engine::{Engine, EngineState};
pub use crate::error::AmbientError;
#[cfg(not(target_arch = "wasm32"))]
pub use crate::player::AmbientPlayer;
pub use crate::sink::{BufferSink, NullSink, OutputSink};
pub use crate::timeline::Section;

use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the ambient_core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: the default configuration as pretty-printed JSON.
#[wasm_bindgen]
pub fn default_config_json() -> String {
    EngineConfig::default().to_json()
}

/// WASM-exposed: equal-tempered frequency of a note number.
#[wasm_bindgen]
pub fn note_frequency(pitch: i32) -> f64 {
    pitch::to_frequency(pitch)
}

fn config_from_js(value: JsValue) -> Result<EngineConfig, JsValue> {
    if value.is_null() || value.is_undefined() {
        return Ok(EngineConfig::default());
    }
    let config: EngineConfig =
        serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    config
        .validate()
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(config)
}

/// WASM-exposed: render `seconds` of the piece to interleaved stereo f32
/// samples. Pass `null` for the default configuration.
#[wasm_bindgen]
pub fn render_ambient_samples(config: JsValue, seconds: f64) -> Result<Vec<f32>, JsValue> {
    let config = config_from_js(config)?;
    dsp::renderer::render_offline(&config, seconds).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: render `seconds` of the piece to a WAV byte array.
#[wasm_bindgen]
pub fn render_ambient_wav(config: JsValue, seconds: f64) -> Result<Vec<u8>, JsValue> {
    let config = config_from_js(config)?;
    dsp::renderer::render_wav(&config, seconds).map_err(|e| JsValue::from_str(&format!("{e}")))
}
