//! Normaliser (spec §4.7) and OCR Router (spec §4.8): turns per-page OCR
//! engine output into the versioned [`docflow_common::OcrVersion`]
//! result record, and orchestrates the three-phase adaptive escalation
//! that decides which engine and DPI produced each page.

pub mod normalize;
pub mod router;

pub use normalize::{build_result, BuildParams, PageInput};
pub use router::{process_document_ocr, PageSource, PdfiumPageSource, RenderedPage, RouterConfig, RouterError};

/// Errors from this crate, re-exported at the top level for callers that
/// don't need the module split.
pub type PipelineError = router::RouterError;
pub type Result<T> = router::Result<T>;
