//! Page Renderer (spec §4.3) and Direct Extractor (spec §4.2).
//!
//! Grounded on `docling_rs`'s own workspace dependency choice,
//! `pdfium-render = "0.8"` — not its bespoke `pdfium_fast` FFI bridge in
//! `docling-backend::pdfium_adapter`, which is thousands of lines of
//! custom C bindings far beyond what this crate's two operations need.
//! Exact rendering/extraction semantics (zoom factor, page separator
//! string, single-paragraph-per-page shape) are taken from
//! `original_source/worker/src/ocr/renderer.py` and `extractor.py`.

pub mod extractor;
pub mod renderer;

pub use extractor::extract_text;
pub use renderer::{page_count, render, RenderedPage};

use thiserror::Error;

/// Errors produced by PDF rendering or direct text extraction.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("invalid page index {index}: document has {page_count} pages")]
    InvalidPage { index: u32, page_count: u32 },

    #[error("failed to load PDF: {0}")]
    LoadFailed(String),

    #[error("failed to render page: {0}")]
    RenderFailed(String),

    #[error("failed to extract text: {0}")]
    ExtractFailed(String),
}

/// Result type for this crate's operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Engine identifier reported in [`docflow_common::OcrVersion::engine`]
/// for direct-extraction results, standing in for the original's
/// `pymupdf` identifier.
pub const DIRECT_ENGINE_NAME: &str = "pdfium";
