use std::sync::Arc;

use darksky_core::protocol::{handle_request, Request, Response};
use darksky_core::{RasterSource, SearchConfig};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// A loaded raster plus search configuration, driven from the page's worker
/// script. Every request produces its progress messages and one terminal
/// message through the callback passed to `handle`.
#[wasm_bindgen]
pub struct DarkSkyWorker {
    raster: Arc<RasterSource>,
    config: SearchConfig,
}

#[wasm_bindgen]
impl DarkSkyWorker {
    /// Decode the raster image (PNG, JPEG or TIFF bytes). `config_json` is
    /// an optional partial search configuration.
    #[wasm_bindgen(constructor)]
    pub fn new(image_bytes: &[u8], config_json: Option<String>) -> Result<DarkSkyWorker, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) => SearchConfig::from_json_str(json).map_err(to_js_error)?,
            None => SearchConfig::default(),
        };
        let raster = RasterSource::from_image_bytes(image_bytes).map_err(to_js_error)?;
        log::info!("Raster ready: {}x{}", raster.width(), raster.height());
        Ok(Self { raster: Arc::new(raster), config })
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// Handle one request object (`{ id, type, ... }`), posting each response
    /// object to `on_message`.
    pub fn handle(&self, request: JsValue, on_message: &js_sys::Function) -> Result<(), JsValue> {
        let request: Request = serde_wasm_bindgen::from_value(request)
            .map_err(|e| JsValue::from_str(&format!("Invalid request: {e}")))?;
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let mut failure = None;
        handle_request(&self.raster, &self.config, &request, &mut |response| {
            if failure.is_some() {
                return;
            }
            let posted = response
                .serialize(&serializer)
                .map_err(JsValue::from)
                .and_then(|value| on_message.call1(&JsValue::NULL, &value));
            if let Err(e) = posted {
                failure = Some(e);
            }
        });
        failure.map_or(Ok(()), Err)
    }

    /// JSON-string variant of [`handle`](Self::handle) for hosts that post
    /// serialized messages.
    #[wasm_bindgen(js_name = handleJson)]
    pub fn handle_json(&self, request_json: &str, on_message: &js_sys::Function) -> Result<(), JsValue> {
        for message in self.respond_json(request_json).map_err(|e| JsValue::from_str(&e))? {
            on_message.call1(&JsValue::NULL, &JsValue::from_str(&message))?;
        }
        Ok(())
    }
}

impl DarkSkyWorker {
    fn respond_json(&self, request_json: &str) -> Result<Vec<String>, String> {
        let request: Request =
            serde_json::from_str(request_json).map_err(|e| format!("Invalid request: {e}"))?;
        let mut responses: Vec<Response> = Vec::new();
        handle_request(&self.raster, &self.config, &request, &mut |r| responses.push(r));
        responses
            .iter()
            .map(|r| serde_json::to_string(r).map_err(|e| e.to_string()))
            .collect()
    }
}

fn to_js_error(e: darksky_core::DarkSkyError) -> JsValue {
    JsValue::from_str(&e.to_string())
}
