//! WebAssembly bindings for the PDF image shrinker

use crate::{compress_pdf_bytes, describe_pdf_images, CompressOptions, QualityTier};
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Recompress the images in a PDF
///
/// # Arguments
/// * `pdf_bytes` - The input PDF file as a byte array
/// * `quality` - Quality between 0.1 and 1.0 (default: 0.7)
///
/// # Returns
/// The compressed PDF as a byte array, or throws an error
#[wasm_bindgen]
pub fn compress_pdf(pdf_bytes: &[u8], quality: Option<f32>) -> Result<Vec<u8>, JsError> {
    let quality = match quality {
        Some(q) => QualityTier::new(q).map_err(|e| JsError::new(&e.to_string()))?,
        None => QualityTier::default(),
    };
    let options = CompressOptions {
        quality,
        ..CompressOptions::default()
    };

    let (output_bytes, _report) =
        compress_pdf_bytes(pdf_bytes, &options).map_err(|e| JsError::new(&e.to_string()))?;

    Ok(output_bytes)
}

/// Describe the images on each page of a PDF as a JSON string
#[wasm_bindgen]
pub fn inspect_pdf_images(pdf_bytes: &[u8]) -> Result<String, JsError> {
    let pages = describe_pdf_images(pdf_bytes).map_err(|e| JsError::new(&e.to_string()))?;
    serde_json::to_string(&pages).map_err(|e| JsError::new(&e.to_string()))
}
