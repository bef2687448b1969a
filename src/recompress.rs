//! Per-image recompression: decode, fit inside the tier's box, encode JPEG.

use crate::decode::{self, ColorSpace};
use crate::{QualityTier, SkipReason};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::imageops::FilterType;
use image::DynamicImage;
use lopdf::{Document, Object, ObjectId, Stream};
use std::io::Write;

/// Format of a recompressed image stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedFormat {
    Jpeg,
}

impl EncodedFormat {
    /// PDF filter that decodes this format.
    pub fn filter(self) -> &'static str {
        match self {
            EncodedFormat::Jpeg => "DCTDecode",
        }
    }
}

/// Color model of the encoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputColor {
    Gray,
    Rgb,
}

impl OutputColor {
    pub fn color_space(self) -> &'static str {
        match self {
            OutputColor::Gray => "DeviceGray",
            OutputColor::Rgb => "DeviceRGB",
        }
    }
}

/// An image XObject copied out of its document.
///
/// Owning the stream lets recompression run on worker threads while the
/// document itself stays untouched until every image has settled.
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub id: ObjectId,
    pub stream: Stream,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u32,
    pub color_space: ColorSpace,
    /// Soft mask carrying `/Matte`, which must keep the image's dimensions.
    pub matte_mask: Option<MatteMask>,
}

/// Snapshot of a preblended soft mask.
#[derive(Debug, Clone)]
pub struct MatteMask {
    pub stream: Stream,
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u32,
}

fn dimension(dict: &lopdf::Dictionary, key: &[u8]) -> Option<u32> {
    match dict.get(key) {
        Ok(Object::Integer(n)) if *n > 0 && *n <= u32::MAX as i64 => Some(*n as u32),
        _ => None,
    }
}

fn bits_per_component(dict: &lopdf::Dictionary) -> u32 {
    match dict.get(b"BitsPerComponent") {
        Ok(Object::Integer(n)) => *n as u32,
        _ => 8,
    }
}

impl MatteMask {
    fn from_document(doc: &Document, parent: &lopdf::Dictionary) -> Result<Option<Self>, SkipReason> {
        let stream = match parent.get(b"SMask") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Stream(stream)) => stream,
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        if stream.dict.get(b"Matte").is_err() {
            return Ok(None);
        }

        let (Some(width), Some(height)) = (dimension(&stream.dict, b"Width"), dimension(&stream.dict, b"Height"))
        else {
            return Err(SkipReason::Decode("soft mask has invalid dimensions".into()));
        };
        Ok(Some(MatteMask {
            stream: stream.clone(),
            width,
            height,
            bits_per_component: bits_per_component(&stream.dict),
        }))
    }

    /// Resample the mask to `width × height` and Flate-encode it.
    fn resample(&self, width: u32, height: u32) -> Result<Vec<u8>, SkipReason> {
        let mask = decode::decode_image(
            &self.stream,
            self.width,
            self.height,
            self.bits_per_component,
            &ColorSpace::Gray,
        )?;
        let mask = mask.resize_exact(width, height, FilterType::Lanczos3).to_luma8();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(mask.as_raw())
            .and_then(|_| encoder.finish())
            .map_err(|e| SkipReason::Encode(format!("soft mask: {e}")))
    }
}

impl ImageSource {
    pub fn from_document(doc: &Document, id: ObjectId) -> Result<Self, SkipReason> {
        let stream = match doc.get_object(id) {
            Ok(Object::Stream(stream)) => stream,
            _ => return Err(SkipReason::NotAStream),
        };
        let dict = &stream.dict;

        if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
            return Err(SkipReason::ImageMask);
        }

        let (Some(width), Some(height)) = (dimension(dict, b"Width"), dimension(dict, b"Height")) else {
            return Err(SkipReason::InvalidDimensions);
        };
        let bits_per_component = bits_per_component(dict);

        // JPEG data carries its own color model.
        let color_space = match dict.get(b"ColorSpace") {
            Ok(obj) => ColorSpace::resolve(obj, doc)?,
            Err(_) if decode::is_dct(dict) => ColorSpace::Rgb,
            Err(_) => return Err(SkipReason::UnsupportedColorSpace("missing".into())),
        };

        // Matte colors are given in the image's own color space, which must survive.
        let matte_mask = MatteMask::from_document(doc, dict)?;
        if matte_mask.is_some() && !matches!(color_space, ColorSpace::Gray | ColorSpace::Rgb) {
            return Err(SkipReason::UnsupportedColorSpace(format!(
                "{} image with a Matte soft mask",
                color_space.name()
            )));
        }

        Ok(ImageSource {
            id,
            stream: stream.clone(),
            width,
            height,
            bits_per_component,
            color_space,
            matte_mask,
        })
    }
}

/// A successfully recompressed image, ready to be substituted.
#[derive(Debug, Clone)]
pub struct RecompressedImage {
    pub id: ObjectId,
    pub format: EncodedFormat,
    pub color: OutputColor,
    pub original_width: u32,
    pub original_height: u32,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Flate-encoded gray soft mask at the new dimensions, replacing a
    /// `/Matte` mask that no longer matches.
    pub soft_mask: Option<Vec<u8>>,
}

/// Outcome of recompressing one image.
pub type RecompressionResult = Result<RecompressedImage, SkipReason>;

/// Dimensions that fit `width × height` inside a `max × max` box.
///
/// The longer edge becomes exactly `max`; images already inside the box are
/// returned unchanged, never upscaled.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scale = |edge: u32, longest: u32| -> u32 {
        let scaled = (edge as u64 * max as u64 + longest as u64 / 2) / longest as u64;
        (scaled as u32).max(1)
    };
    if width >= height {
        (max, scale(height, width))
    } else {
        (scale(width, height), max)
    }
}

pub fn recompress(source: &ImageSource, tier: QualityTier) -> RecompressionResult {
    let img = decode::decode_image(
        &source.stream,
        source.width,
        source.height,
        source.bits_per_component,
        &source.color_space,
    )?;

    let (width, height) = (img.width(), img.height());
    let (target_width, target_height) = fit_within(width, height, tier.max_dimension());

    let img = if (target_width, target_height) != (width, height) {
        log::debug!(
            "[Recompress] {:?}: resampling {}x{} -> {}x{}",
            source.id,
            width,
            height,
            target_width,
            target_height
        );
        img.resize_exact(target_width, target_height, FilterType::Lanczos3)
    } else {
        img
    };

    let soft_mask = match &source.matte_mask {
        Some(mask) if (mask.width, mask.height) != (target_width, target_height) => {
            Some(mask.resample(target_width, target_height)?)
        }
        _ => None,
    };

    let (data, color) = encode_jpeg(&img, tier.encoder_quality())?;
    log::debug!(
        "[Recompress] {:?}: {} -> {} bytes at quality {}",
        source.id,
        source.stream.content.len(),
        data.len(),
        tier.encoder_quality()
    );

    Ok(RecompressedImage {
        id: source.id,
        format: EncodedFormat::Jpeg,
        color,
        original_width: width,
        original_height: height,
        width: img.width(),
        height: img.height(),
        data,
        soft_mask,
    })
}

fn is_grayscale(img: &DynamicImage) -> bool {
    matches!(
        img,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
    )
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<(Vec<u8>, OutputColor), SkipReason> {
    let (width, height) = (img.width(), img.height());
    let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(SkipReason::Encode(format!("{width}x{height} exceeds JPEG limits")));
    };

    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, quality);

    let color = if is_grayscale(img) {
        let luma = img.to_luma8();
        encoder
            .encode(luma.as_raw(), w, h, jpeg_encoder::ColorType::Luma)
            .map_err(|e| SkipReason::Encode(e.to_string()))?;
        OutputColor::Gray
    } else {
        let rgb = img.to_rgb8();
        encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
        encoder
            .encode(rgb.as_raw(), w, h, jpeg_encoder::ColorType::Rgb)
            .map_err(|e| SkipReason::Encode(e.to_string()))?;
        OutputColor::Rgb
    };

    Ok((jpeg_bytes, color))
}
