//! Per-page listing of the images a PDF draws.

use crate::decode::{filter_names, ColorSpace};
use crate::locate::page_images;
use crate::CompressError;
use lopdf::{Document, Object, ObjectId, Stream};
use serde::Serialize;

/// Information about a single image in the PDF
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    /// Object ID (number, generation)
    pub object_id: (u32, u16),
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Color space
    pub color_space: String,
    /// Bits per component
    pub bits_per_component: u32,
    /// Filter/encoding
    pub filter: String,
    /// Encoded size in bytes
    pub size_bytes: usize,
}

/// Images grouped by page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageImages {
    pub page_number: u32,
    pub images: Vec<ImageInfo>,
}

/// Describe the images each page of a PDF references.
///
/// Pages without images are left out. A shared image is listed on every
/// page that uses it.
pub fn describe_pdf_images(pdf_bytes: &[u8]) -> Result<Vec<PageImages>, CompressError> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| CompressError::Load(e.to_string()))?;
    Ok(describe_document(&doc))
}

pub fn describe_document(doc: &Document) -> Vec<PageImages> {
    page_images(doc)
        .into_iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(page_number, ids)| PageImages {
            page_number,
            images: ids
                .into_iter()
                .filter_map(|id| match doc.get_object(id) {
                    Ok(Object::Stream(stream)) => Some(image_info(doc, id, stream)),
                    _ => None,
                })
                .collect(),
        })
        .collect()
}

fn image_info(doc: &Document, id: ObjectId, stream: &Stream) -> ImageInfo {
    let int = |key: &[u8]| match stream.dict.get(key) {
        Ok(Object::Integer(n)) => *n as u32,
        _ => 0,
    };

    let color_space = stream
        .dict
        .get(b"ColorSpace")
        .ok()
        .map(|cs| match ColorSpace::resolve(cs, doc) {
            Ok(space) => space.name().to_string(),
            Err(_) => color_space_family(cs, doc),
        })
        .unwrap_or_else(|| "Unknown".to_string());

    let filter = filter_names(&stream.dict)
        .first()
        .map(|f| String::from_utf8_lossy(f).to_string())
        .unwrap_or_else(|| "raw".to_string());

    let bits_per_component = match int(b"BitsPerComponent") {
        0 => 8,
        bpc => bpc,
    };

    ImageInfo {
        object_id: id,
        width: int(b"Width"),
        height: int(b"Height"),
        color_space,
        bits_per_component,
        filter,
        size_bytes: stream.content.len(),
    }
}

/// Name of a color space family, for spaces that cannot be decoded.
fn color_space_family(obj: &Object, doc: &Document) -> String {
    match obj {
        Object::Name(name) => String::from_utf8_lossy(name).to_string(),
        Object::Array(arr) => match arr.first() {
            Some(Object::Name(name)) => String::from_utf8_lossy(name).to_string(),
            _ => "Unknown".to_string(),
        },
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(resolved) => color_space_family(resolved, doc),
            Err(_) => "Unknown".to_string(),
        },
        _ => "Unknown".to_string(),
    }
}
