//! Swapping recompressed streams into the document.
//!
//! The new stream is stored under the original object id, so every page,
//! form or resource dictionary referring to the image sees the new content
//! without being touched. A resampled `/Matte` soft mask is the one new
//! object this adds.

use crate::recompress::RecompressedImage;
use lopdf::{Dictionary, Document, Object, Stream};

/// Entries of the original image dictionary that stay valid after re-encoding.
const CARRIED_KEYS: [&[u8]; 7] = [
    b"SMask",
    b"Metadata",
    b"OC",
    b"Interpolate",
    b"Intent",
    b"StructParent",
    b"Name",
];

/// Replace the image stored under `image.id` with its recompressed stream.
pub fn substitute(doc: &mut Document, image: RecompressedImage) {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(image.width as i64));
    dict.set("Height", Object::Integer(image.height as i64));
    dict.set("ColorSpace", Object::Name(image.color.color_space().as_bytes().to_vec()));
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(image.format.filter().as_bytes().to_vec()));

    // `/Decode` is already applied to the new samples and is not carried.
    if let Ok(Object::Stream(original)) = doc.get_object(image.id) {
        for key in CARRIED_KEYS {
            if let Ok(value) = original.dict.get(key) {
                dict.set(key.to_vec(), value.clone());
            }
        }
        // Color-key masks are in terms of the old samples; only stencil masks survive.
        if let Ok(mask @ Object::Reference(_)) = original.dict.get(b"Mask") {
            dict.set("Mask", mask.clone());
        }
    }

    if let Some(mask_data) = image.soft_mask {
        let matte = dict
            .get(b"SMask")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_object(id))
            .and_then(Object::as_stream)
            .and_then(|mask| mask.dict.get(b"Matte"))
            .ok()
            .cloned();
        let mut mask_dict = Dictionary::new();
        mask_dict.set("Type", Object::Name(b"XObject".to_vec()));
        mask_dict.set("Subtype", Object::Name(b"Image".to_vec()));
        mask_dict.set("Width", Object::Integer(image.width as i64));
        mask_dict.set("Height", Object::Integer(image.height as i64));
        mask_dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
        mask_dict.set("BitsPerComponent", Object::Integer(8));
        mask_dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        if let Some(matte) = matte {
            mask_dict.set("Matte", matte);
        }
        let mask_id = doc.add_object(Stream::new(mask_dict, mask_data));
        dict.set("SMask", Object::Reference(mask_id));
        log::debug!("[Substitute] {:?}: soft mask resampled into {:?}", image.id, mask_id);
    }

    log::debug!(
        "[Substitute] {:?}: {}x{} -> {}x{}",
        image.id,
        image.original_width,
        image.original_height,
        image.width,
        image.height
    );

    doc.objects.insert(image.id, Object::Stream(Stream::new(dict, image.data)));
}
