//! Load → locate → recompress (parallel) → substitute → save.

use crate::locate::locate_images;
use crate::recompress::{recompress, ImageSource, RecompressionResult};
use crate::substitute::substitute;
use crate::{CompressError, QualityTier, SkipReason};
use lopdf::{Document, ObjectId};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};

/// Options for PDF compression
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Quality tier driving both downsampling and JPEG quality
    pub quality: QualityTier,
    /// Compress uncompressed PDF streams (content streams, fonts) on save
    pub compress_streams: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            quality: QualityTier::default(),
            compress_streams: true,
        }
    }
}

/// An image left as it was, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub id: ObjectId,
    pub reason: SkipReason,
}

/// What happened to the images of one document.
#[derive(Debug, Clone, Default)]
pub struct CompressReport {
    pub total_images: usize,
    pub recompressed_images: usize,
    pub skipped: Vec<SkippedImage>,
}

/// Recompress every located image of `doc` in place.
///
/// Individual image failures never fail the document: the image keeps its
/// original stream and the reason is recorded in the report.
pub fn compress_document(doc: &mut Document, options: &CompressOptions) -> CompressReport {
    let ids = locate_images(doc);
    log::info!("[Pipeline] Located {} unique images", ids.len());

    let mut report = CompressReport {
        total_images: ids.len(),
        ..CompressReport::default()
    };

    let mut sources = Vec::with_capacity(ids.len());
    for id in ids {
        match ImageSource::from_document(doc, id) {
            Ok(source) => sources.push(source),
            Err(reason) => skip(&mut report, id, reason),
        }
    }

    let tier = options.quality;
    log::debug!(
        "[Pipeline] Recompressing {} images (max {}px, quality {})",
        sources.len(),
        tier.max_dimension(),
        tier.encoder_quality()
    );

    // collect() only returns once every task has settled.
    let settled: Vec<(ObjectId, RecompressionResult)> = sources
        .into_par_iter()
        .map(|source| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| recompress(&source, tier)))
                .unwrap_or(Err(SkipReason::Panicked));
            (source.id, result)
        })
        .collect();

    for (id, result) in settled {
        match result {
            Ok(image) => {
                substitute(doc, image);
                report.recompressed_images += 1;
            }
            Err(reason) => skip(&mut report, id, reason),
        }
    }

    log::info!(
        "[Pipeline] {} of {} images recompressed, {} skipped",
        report.recompressed_images,
        report.total_images,
        report.skipped.len()
    );
    report
}

fn skip(report: &mut CompressReport, id: ObjectId, reason: SkipReason) {
    log::warn!("[Pipeline] Skipping image {:?}: {}", id, reason);
    report.skipped.push(SkippedImage { id, reason });
}

fn finish(doc: &mut Document, options: &CompressOptions) {
    if options.compress_streams {
        doc.compress();
    }
}

/// Compress a PDF held in memory and return the new PDF bytes
pub fn compress_pdf_bytes(
    input_bytes: &[u8],
    options: &CompressOptions,
) -> Result<(Vec<u8>, CompressReport), CompressError> {
    let mut doc =
        Document::load_mem(input_bytes).map_err(|e| CompressError::Load(e.to_string()))?;

    let report = compress_document(&mut doc, options);
    finish(&mut doc, options);

    let mut output_bytes = Vec::new();
    doc.save_to(&mut output_bytes)
        .map_err(|e| CompressError::Save(e.to_string()))?;

    Ok((output_bytes, report))
}

#[cfg(not(target_arch = "wasm32"))]
pub mod file_ops {
    use super::*;
    use std::path::Path;

    /// Compress a PDF from file path to file path
    pub fn compress_pdf_file(
        input_path: &Path,
        output_path: &Path,
        options: &CompressOptions,
    ) -> Result<CompressReport, CompressError> {
        let mut doc = Document::load(input_path)
            .map_err(|e| CompressError::Load(format!("{:?}: {}", input_path, e)))?;

        let report = compress_document(&mut doc, options);
        finish(&mut doc, options);

        doc.save(output_path)
            .map_err(|e| CompressError::Save(format!("{:?}: {}", output_path, e)))?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_input_is_a_load_error() {
        let err = compress_pdf_bytes(b"definitely not a pdf", &CompressOptions::default()).unwrap_err();
        assert!(matches!(err, CompressError::Load(_)));

        let err = compress_pdf_bytes(&[], &CompressOptions::default()).unwrap_err();
        assert!(matches!(err, CompressError::Load(_)));
    }

    #[test]
    fn default_options() {
        let options = CompressOptions::default();
        assert_eq!(options.quality.value(), 0.7);
        assert!(options.compress_streams);
    }
}
