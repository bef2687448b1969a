use thiserror::Error;

/// Errors that abort a whole document.
#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Quality must be between 0.1 and 1.0, got {0}")]
    InvalidQuality(f32),

    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("Failed to save PDF: {0}")]
    Save(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single image was left untouched.
///
/// Skips never fail the document; they are collected into the
/// [`CompressReport`](crate::CompressReport) and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    #[error("object is not a stream")]
    NotAStream,

    #[error("missing or invalid image dimensions")]
    InvalidDimensions,

    #[error("stencil image masks are left as-is")]
    ImageMask,

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("unsupported color space: {0}")]
    UnsupportedColorSpace(String),

    #[error("unsupported bits per component: {0}")]
    UnsupportedBitDepth(u32),

    #[error("could not decode image data: {0}")]
    Decode(String),

    #[error("could not encode JPEG: {0}")]
    Encode(String),

    #[error("image worker panicked")]
    Panicked,
}
