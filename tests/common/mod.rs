//! In-memory PDF fixtures.

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{GrayImage, RgbImage};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        PdfBuilder {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    pub fn add_image(&mut self, image: Stream) -> ObjectId {
        self.doc.add_object(image)
    }

    /// Adds a page drawing each image in turn.
    pub fn add_page(&mut self, images: &[ObjectId]) -> ObjectId {
        let mut xobjects = lopdf::Dictionary::new();
        let mut content = String::new();
        for (i, id) in images.iter().enumerate() {
            let name = format!("Im{i}");
            xobjects.set(name.as_str(), *id);
            content.push_str(&format!("q 200 0 0 100 50 {} cm /{} Do Q\n", 50 + i * 150, name));
        }

        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        self.kids.push(page_id.into());
        page_id
    }

    /// Adds a page with a line of text and no images.
    pub fn add_text_page(&mut self, text: &str) -> ObjectId {
        let font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        self.kids.push(page_id.into());
        page_id
    }

    pub fn build(mut self) -> Vec<u8> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).unwrap();
        bytes
    }
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn image_dict(width: u32, height: u32, color_space: &str, filter: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => filter,
    }
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 96])
    })
}

/// Raw RGB samples behind FlateDecode.
pub fn flate_rgb_image(width: u32, height: u32) -> Stream {
    let pixels = gradient(width, height);
    Stream::new(
        image_dict(width, height, "DeviceRGB", "FlateDecode"),
        zlib(pixels.as_raw()),
    )
}

/// Raw gray samples behind FlateDecode.
pub fn flate_gray_image(width: u32, height: u32) -> Stream {
    let pixels = GrayImage::from_fn(width, height, |x, _| image::Luma([(x * 255 / width) as u8]));
    Stream::new(
        image_dict(width, height, "DeviceGray", "FlateDecode"),
        zlib(pixels.as_raw()),
    )
}

/// A baseline JPEG at high quality.
pub fn jpeg_image(width: u32, height: u32) -> Stream {
    let pixels = gradient(width, height);
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 95)
        .encode(pixels.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    Stream::new(image_dict(width, height, "DeviceRGB", "DCTDecode"), bytes)
}

/// Claims to be a JPEG but is not.
pub fn corrupt_jpeg_image(width: u32, height: u32) -> Stream {
    Stream::new(
        image_dict(width, height, "DeviceRGB", "DCTDecode"),
        b"\xFF\xD8 this is not really jpeg data".to_vec(),
    )
}

pub fn load(bytes: &[u8]) -> Document {
    Document::load_mem(bytes).expect("output should be a loadable PDF")
}

pub fn stream(doc: &Document, id: ObjectId) -> &Stream {
    doc.get_object(id).unwrap().as_stream().unwrap()
}

pub fn dimensions(doc: &Document, id: ObjectId) -> (i64, i64) {
    let dict = &stream(doc, id).dict;
    (
        dict.get(b"Width").unwrap().as_i64().unwrap(),
        dict.get(b"Height").unwrap().as_i64().unwrap(),
    )
}

pub fn filter(doc: &Document, id: ObjectId) -> Vec<u8> {
    stream(doc, id).dict.get(b"Filter").unwrap().as_name().unwrap().to_vec()
}

/// Number of image XObjects stored in the document.
pub fn image_object_count(doc: &Document) -> usize {
    doc.objects
        .values()
        .filter(|obj| match obj {
            Object::Stream(stream) => matches!(
                stream.dict.get(b"Subtype"),
                Ok(Object::Name(name)) if name == b"Image"
            ),
            _ => false,
        })
        .count()
}
