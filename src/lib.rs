//! PDF Image Shrinker Library
//!
//! Core logic for recompressing the images embedded in PDFs. Shared between
//! the CLI, the HTTP server and the WASM target.
//!
//! Every image XObject referenced from a page's resources is decoded,
//! downsampled to fit the box of the requested quality tier, re-encoded as
//! JPEG and written back under its original object id. Images that cannot be
//! processed are left untouched; only load and save failures are errors.

pub mod decode;
pub mod error;
pub mod inspect;
pub mod locate;
pub mod pipeline;
pub mod quality;
pub mod recompress;
pub mod substitute;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use error::{CompressError, SkipReason};
pub use inspect::{describe_pdf_images, ImageInfo, PageImages};
pub use locate::locate_images;
pub use pipeline::{compress_document, compress_pdf_bytes, CompressOptions, CompressReport, SkippedImage};
pub use quality::QualityTier;

#[cfg(not(target_arch = "wasm32"))]
pub use pipeline::file_ops;
