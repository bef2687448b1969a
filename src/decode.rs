//! Decoding image XObject streams into pixel buffers.
//!
//! Handles the filter chain (Flate with PNG predictors, DCT), unpacks raw
//! samples of any standard bit depth, applies `/Decode` ranges, and converts
//! CMYK and palette images to RGB so the encoder only ever sees luma or RGB.

use crate::SkipReason;
use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};
use std::io::Read;

/// Room allowed on top of the expected size of inflated data.
const INFLATE_SLACK: usize = 64 * 1024;

/// Largest palette: 256 entries of up to four components.
const PALETTE_LIMIT: usize = 256 * 4 + INFLATE_SLACK;

/// Color space of an image, resolved against its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Palette image; `palette` holds `base.components()` bytes per entry.
    Indexed { base: Box<ColorSpace>, palette: Vec<u8> },
}

impl ColorSpace {
    /// Samples per pixel in the encoded data.
    pub fn components(&self) -> usize {
        match self {
            ColorSpace::Gray | ColorSpace::Indexed { .. } => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }

    pub fn resolve(obj: &Object, doc: &Document) -> Result<Self, SkipReason> {
        match obj {
            Object::Reference(id) => {
                let target = doc
                    .get_object(*id)
                    .map_err(|_| SkipReason::UnsupportedColorSpace(format!("dangling reference {id:?}")))?;
                ColorSpace::resolve(target, doc)
            }
            Object::Name(name) => ColorSpace::from_family(name),
            Object::Array(items) => {
                let family = match items.first() {
                    Some(Object::Name(name)) => name.as_slice(),
                    _ => return Err(SkipReason::UnsupportedColorSpace("empty array".into())),
                };
                match family {
                    b"ICCBased" => icc_based(items.get(1), doc),
                    b"Indexed" | b"I" => indexed(items, doc),
                    _ => ColorSpace::from_family(family),
                }
            }
            _ => Err(SkipReason::UnsupportedColorSpace("not a name or array".into())),
        }
    }

    fn from_family(name: &[u8]) -> Result<Self, SkipReason> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
            other => Err(SkipReason::UnsupportedColorSpace(
                String::from_utf8_lossy(other).to_string(),
            )),
        }
    }

    /// Short name used in reports.
    pub fn name(&self) -> &'static str {
        match self {
            ColorSpace::Gray => "DeviceGray",
            ColorSpace::Rgb => "DeviceRGB",
            ColorSpace::Cmyk => "DeviceCMYK",
            ColorSpace::Indexed { .. } => "Indexed",
        }
    }
}

fn icc_based(profile: Option<&Object>, doc: &Document) -> Result<ColorSpace, SkipReason> {
    let stream = match profile {
        Some(Object::Reference(id)) => doc.get_object(*id).ok().and_then(|o| o.as_stream().ok()),
        Some(Object::Stream(stream)) => Some(stream),
        _ => None,
    }
    .ok_or_else(|| SkipReason::UnsupportedColorSpace("ICCBased without profile stream".into()))?;

    match stream.dict.get(b"N").and_then(Object::as_i64) {
        Ok(1) => Ok(ColorSpace::Gray),
        Ok(3) => Ok(ColorSpace::Rgb),
        Ok(4) => Ok(ColorSpace::Cmyk),
        _ => match stream.dict.get(b"Alternate") {
            Ok(alternate) => ColorSpace::resolve(alternate, doc),
            Err(_) => Err(SkipReason::UnsupportedColorSpace("ICCBased with unknown /N".into())),
        },
    }
}

/// `[/Indexed base hival lookup]`
fn indexed(items: &[Object], doc: &Document) -> Result<ColorSpace, SkipReason> {
    let [_, base, hival, lookup] = items else {
        return Err(SkipReason::UnsupportedColorSpace("malformed Indexed array".into()));
    };

    let base = ColorSpace::resolve(base, doc)?;
    if matches!(base, ColorSpace::Indexed { .. }) {
        return Err(SkipReason::UnsupportedColorSpace("nested Indexed".into()));
    }

    let hival = resolve(hival, doc)
        .as_i64()
        .map_err(|_| SkipReason::UnsupportedColorSpace("Indexed without hival".into()))?;
    let entries = (hival.clamp(0, 255) + 1) as usize;

    let mut palette = match resolve(lookup, doc) {
        Object::String(bytes, _) => bytes.clone(),
        Object::Stream(stream) => decode_filters(stream, PALETTE_LIMIT)?,
        _ => return Err(SkipReason::UnsupportedColorSpace("Indexed without lookup".into())),
    };

    let expected = entries * base.components();
    if palette.len() < expected {
        return Err(SkipReason::Decode(format!(
            "palette too short: got {} bytes, expected {}",
            palette.len(),
            expected
        )));
    }
    palette.truncate(expected);

    Ok(ColorSpace::Indexed {
        base: Box::new(base),
        palette,
    })
}

fn resolve<'a>(obj: &'a Object, doc: &'a Document) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Filter names applied to a stream, outermost first.
pub fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(filters)) => filters
            .iter()
            .filter_map(|f| match f {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn is_dct(dict: &Dictionary) -> bool {
    filter_names(dict)
        .last()
        .is_some_and(|f| f == b"DCTDecode" || f == b"DCT")
}

/// `/DecodeParms` entry matching filter `index`.
fn decode_parms(dict: &Dictionary, index: usize) -> Option<&Dictionary> {
    match dict.get(b"DecodeParms").ok()? {
        Object::Dictionary(parms) if index == 0 => Some(parms),
        Object::Array(parms) => match parms.get(index)? {
            Object::Dictionary(parms) => Some(parms),
            _ => None,
        },
        _ => None,
    }
}

/// Undo every filter of a stream whose result is raw bytes.
fn decode_filters(stream: &Stream, limit: usize) -> Result<Vec<u8>, SkipReason> {
    match decode_stream(stream, limit)? {
        Decoded::Raw(data) => Ok(data),
        Decoded::Image(_) => Err(SkipReason::UnsupportedFilter("DCTDecode in lookup".into())),
    }
}

enum Decoded {
    Raw(Vec<u8>),
    Image(DynamicImage),
}

/// Each Flate stage may produce at most `limit` bytes.
fn decode_stream(stream: &Stream, limit: usize) -> Result<Decoded, SkipReason> {
    let filters = filter_names(&stream.dict);
    let mut data = stream.content.clone();

    for (index, filter) in filters.iter().enumerate() {
        match filter.as_slice() {
            b"FlateDecode" | b"Fl" => {
                data = inflate(&data, limit)?;
                if let Some(parms) = decode_parms(&stream.dict, index) {
                    data = apply_predictor(data, parms)?;
                }
            }
            b"DCTDecode" | b"DCT" if index + 1 == filters.len() => {
                let img = image::load_from_memory_with_format(&data, ImageFormat::Jpeg)
                    .map_err(|e| SkipReason::Decode(format!("JPEG: {e}")))?;
                return Ok(Decoded::Image(img));
            }
            other => {
                return Err(SkipReason::UnsupportedFilter(
                    String::from_utf8_lossy(other).to_string(),
                ))
            }
        }
    }

    Ok(Decoded::Raw(data))
}

fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>, SkipReason> {
    let mut decoded = Vec::new();
    ZlibDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut decoded)
        .map_err(|e| SkipReason::Decode(format!("FlateDecode: {e}")))?;
    if decoded.len() > limit {
        return Err(SkipReason::Decode(format!("FlateDecode output exceeds {limit} bytes")));
    }
    Ok(decoded)
}

/// Bytes in one row of `width` pixels, padded to a whole byte.
fn row_bytes(width: usize, components: usize, bpc: usize) -> Option<usize> {
    let bits = width.checked_mul(components)?.checked_mul(bpc)?;
    Some(bits.div_ceil(8))
}

fn apply_predictor(data: Vec<u8>, parms: &Dictionary) -> Result<Vec<u8>, SkipReason> {
    let int = |key: &[u8], default: i64| parms.get(key).and_then(Object::as_i64).unwrap_or(default);

    match int(b"Predictor", 1) {
        1 => Ok(data),
        2 => Err(SkipReason::UnsupportedFilter("TIFF predictor".into())),
        _ => {
            let param = |key: &[u8], default: i64| {
                usize::try_from(int(key, default).max(1))
                    .map_err(|_| SkipReason::Decode("predictor parameter out of range".into()))
            };
            let colors = param(b"Colors", 1)?;
            let bpc = param(b"BitsPerComponent", 8)?;
            let columns = param(b"Columns", 1)?;
            let (Some(bytes_per_pixel), Some(row_len)) =
                (row_bytes(1, colors, bpc), row_bytes(columns, colors, bpc))
            else {
                return Err(SkipReason::Decode(format!(
                    "predictor row of {columns} columns overflows"
                )));
            };
            png_unfilter(&data, row_len, bytes_per_pixel)
        }
    }
}

/// Reverse PNG row filtering. Each row is prefixed by its filter type byte.
fn png_unfilter(data: &[u8], row_len: usize, bpp: usize) -> Result<Vec<u8>, SkipReason> {
    let stride = row_len
        .checked_add(1)
        .filter(|stride| *stride <= data.len())
        .ok_or_else(|| {
            SkipReason::Decode(format!(
                "predictor row of {row_len} bytes exceeds {} bytes of data",
                data.len()
            ))
        })?;
    let mut out = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];

    for chunk in data.chunks_exact(stride) {
        let mut row = chunk[1..].to_vec();
        match chunk[0] {
            0 => {}
            1 => {
                for i in bpp..row_len {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            2 => {
                for i in 0..row_len {
                    row[i] = row[i].wrapping_add(prev[i]);
                }
            }
            3 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(((left as u16 + prev[i] as u16) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_len {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let upper_left = if i >= bpp { prev[i - bpp] } else { 0 };
                    row[i] = row[i].wrapping_add(paeth(left, prev[i], upper_left));
                }
            }
            tag => return Err(SkipReason::Decode(format!("invalid PNG filter type {tag}"))),
        }
        out.extend_from_slice(&row);
        prev = row;
    }

    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Expand packed samples to one byte each. Rows are padded to whole bytes.
///
/// With `scale` set, samples are stretched to 0-255; otherwise they are kept
/// as-is (palette indices).
fn unpack_samples(
    data: &[u8],
    width: usize,
    height: usize,
    components: usize,
    bpc: u32,
    scale: bool,
) -> Result<Vec<u8>, SkipReason> {
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(SkipReason::UnsupportedBitDepth(bpc));
    }
    let too_large = || SkipReason::Decode(format!("{width}x{height} image is too large"));
    let samples_per_row = width.checked_mul(components).ok_or_else(too_large)?;
    let row_bytes = row_bytes(width, components, bpc as usize).ok_or_else(too_large)?;
    let expected = row_bytes.checked_mul(height).ok_or_else(too_large)?;
    if data.len() < expected {
        return Err(SkipReason::Decode(format!(
            "image data too short: got {} bytes, expected {}",
            data.len(),
            expected
        )));
    }
    let data = &data[..expected];

    match bpc {
        8 => Ok(data.to_vec()),
        // Keep the high byte of each 16-bit sample.
        16 => Ok(data.chunks_exact(2).map(|sample| sample[0]).collect()),
        _ => {
            let bits = bpc as usize;
            let mask = (1u8 << bits) - 1;
            let mut out = Vec::with_capacity(samples_per_row * height);
            for row in data.chunks_exact(row_bytes) {
                for sample in 0..samples_per_row {
                    let bit = sample * bits;
                    let value = (row[bit / 8] >> (8 - bits - bit % 8)) & mask;
                    out.push(if scale {
                        (value as u16 * 255 / mask as u16) as u8
                    } else {
                        value
                    });
                }
            }
            Ok(out)
        }
    }
}

fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk.len() / 4 * 3);
    for pixel in cmyk.chunks_exact(4) {
        let k = 1.0 - pixel[3] as f32 / 255.0;
        for &ink in &pixel[..3] {
            rgb.push(((1.0 - ink as f32 / 255.0) * k * 255.0) as u8);
        }
    }
    rgb
}

fn samples_to_image(
    samples: Vec<u8>,
    width: u32,
    height: u32,
    color_space: &ColorSpace,
) -> Result<DynamicImage, SkipReason> {
    let mismatch = || SkipReason::Decode("pixel buffer does not match dimensions".into());
    match color_space {
        ColorSpace::Gray => GrayImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(mismatch),
        ColorSpace::Rgb => RgbImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(mismatch),
        ColorSpace::Cmyk => RgbImage::from_raw(width, height, cmyk_to_rgb(&samples))
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(mismatch),
        ColorSpace::Indexed { base, palette } => {
            let n = base.components();
            let Some(last) = (palette.len() / n).checked_sub(1) else {
                return Err(SkipReason::Decode("empty palette".into()));
            };
            let mut expanded = Vec::with_capacity(samples.len() * n);
            for index in samples {
                let entry = (index as usize).min(last) * n;
                expanded.extend_from_slice(&palette[entry..entry + n]);
            }
            samples_to_image(expanded, width, height, base)
        }
    }
}

/// `/Decode` entries as `(min, max)` pairs, or `None` when absent.
fn decode_ranges(dict: &Dictionary) -> Result<Option<Vec<(f32, f32)>>, SkipReason> {
    let items = match dict.get(b"Decode") {
        Ok(Object::Array(items)) => items,
        Ok(_) => return Err(SkipReason::Decode("Decode is not an array".into())),
        Err(_) => return Ok(None),
    };
    let values = items
        .iter()
        .map(|value| value.as_float())
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|_| SkipReason::Decode("Decode holds a non-number".into()))?;
    if values.is_empty() || values.len() % 2 != 0 {
        return Err(SkipReason::Decode(format!("Decode has {} entries", values.len())));
    }
    Ok(Some(values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()))
}

/// Map samples through `/Decode` ranges, component by component.
///
/// A sample `s` in `0..=sample_max` becomes `min + s / sample_max * (max - min)`,
/// multiplied by `out_scale` and clamped to a byte.
fn remap_samples(samples: &mut [u8], ranges: &[(f32, f32)], sample_max: f32, out_scale: f32) {
    let tables: Vec<[u8; 256]> = ranges
        .iter()
        .map(|&(min, max)| {
            std::array::from_fn(|s| {
                let value = min + s as f32 / sample_max * (max - min);
                (value * out_scale).round().clamp(0.0, 255.0) as u8
            })
        })
        .collect();
    for (i, sample) in samples.iter_mut().enumerate() {
        *sample = tables[i % tables.len()][*sample as usize];
    }
}

fn is_identity(ranges: &[(f32, f32)], top: f32) -> bool {
    ranges.iter().all(|&(min, max)| min == 0.0 && max == top)
}

/// Apply `/Decode` to pixels produced by the JPEG decoder.
fn remap_jpeg(img: DynamicImage, ranges: &[(f32, f32)]) -> Result<DynamicImage, SkipReason> {
    match ranges.len() {
        1 => {
            let mut luma = img.to_luma8();
            remap_samples(&mut luma, ranges, 255.0, 255.0);
            Ok(DynamicImage::ImageLuma8(luma))
        }
        3 => {
            let mut rgb = img.to_rgb8();
            remap_samples(&mut rgb, ranges, 255.0, 255.0);
            Ok(DynamicImage::ImageRgb8(rgb))
        }
        // The decoder has already left CMYK behind.
        n => Err(SkipReason::UnsupportedColorSpace(format!(
            "Decode with {n} ranges on JPEG data"
        ))),
    }
}

/// Decode an image stream into pixels.
///
/// JPEG data is handed to the `image` crate whole; everything else is
/// unpacked according to the declared dimensions, depth and color space.
/// A non-default `/Decode` array is applied to the samples, so the result
/// renders the same without it.
pub fn decode_image(
    stream: &Stream,
    width: u32,
    height: u32,
    bits_per_component: u32,
    color_space: &ColorSpace,
) -> Result<DynamicImage, SkipReason> {
    let components = color_space.components();
    let indexed = matches!(color_space, ColorSpace::Indexed { .. });

    // Raw rows plus one predictor tag byte each, doubled for JPEG inside Flate.
    let limit = row_bytes(width as usize, components, bits_per_component.clamp(1, 16) as usize)
        .and_then(|row| row.checked_add(1))
        .and_then(|row| row.checked_mul(height as usize))
        .and_then(|raw| raw.checked_mul(2))
        .and_then(|raw| raw.checked_add(INFLATE_SLACK))
        .ok_or_else(|| SkipReason::Decode(format!("{width}x{height} image is too large")))?;

    let sample_top = if bits_per_component >= 8 {
        255.0
    } else {
        ((1u32 << bits_per_component) - 1) as f32
    };
    let default_top = if indexed {
        ((1u32 << bits_per_component.clamp(1, 16)) - 1) as f32
    } else {
        1.0
    };
    let ranges = decode_ranges(&stream.dict)?.filter(|ranges| !is_identity(ranges, default_top));

    let data = match decode_stream(stream, limit)? {
        Decoded::Image(img) => {
            return match ranges {
                Some(ranges) => remap_jpeg(img, &ranges),
                None => Ok(img),
            }
        }
        Decoded::Raw(data) => data,
    };

    let mut samples = unpack_samples(
        &data,
        width as usize,
        height as usize,
        components,
        bits_per_component,
        !indexed,
    )?;

    if let Some(ranges) = ranges {
        if ranges.len() != components {
            return Err(SkipReason::Decode(format!(
                "Decode has {} ranges for {} components",
                ranges.len(),
                components
            )));
        }
        // Indices stay indices; color samples were already stretched to 0-255.
        if indexed {
            remap_samples(&mut samples, &ranges, sample_top, 1.0);
        } else {
            remap_samples(&mut samples, &ranges, 255.0, 255.0);
        }
    }

    samples_to_image(samples, width, height, color_space)
}
