//! OCR Engine Contract (spec §4.4): a shared capability both the primary
//! and fallback engines implement, letting the OCR Router hold either
//! behind a `Box<dyn OcrEngine>` and swap implementations in tests with
//! pure fakes (Open Question "Engine polymorphism", resolved per
//! SPEC_FULL.md §9).

pub mod paddle;
pub mod tesseract;

pub use paddle::PaddleOcrEngine;
pub use tesseract::TesseractOcrEngine;

use docflow_common::{BBox, Block, BlockRole};
use thiserror::Error;

/// Errors internal to an OCR engine. Per spec §4.4/§7, an engine
/// absorbs its own internal failures and returns an empty block list
/// rather than propagating — these variants exist for engine
/// construction failures (missing model/language data), which are not
/// absorbed since they make the engine unusable for every page.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("failed to initialize engine: {0}")]
    InitError(String),

    #[error("invalid image dimensions: {0}x{1}")]
    InvalidDimensions(u32, u32),
}

/// Result type for this crate's operations.
pub type Result<T> = std::result::Result<T, OcrError>;

/// An RGB image in the shape the Page Renderer produces: row-major,
/// 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// The OCR Engine Contract (spec §4.4). Both the primary (ONNX/PaddleOCR-
/// style) and fallback (Tesseract) engines implement this; the Router
/// never downcasts to a concrete engine type.
pub trait OcrEngine: Send + Sync {
    /// Run OCR on an image, returning Blocks with `text`, optional
    /// `confidence ∈ [0,1]`, and `bbox` in the image's pixel units. On
    /// internal engine error, returns an empty list rather than
    /// propagating (spec §4.4, §7 taxonomy item 3).
    fn ocr(&self, image: &Image) -> Vec<Block>;

    /// Stable identifier of the underlying engine, used to build the
    /// Result's `engine_version` / hybrid aggregate string (spec §4.8).
    fn version(&self) -> String;
}

/// Convert a polygonal detection (four corner points) to an axis-aligned
/// [`BBox`] by taking the min/max of the corner coordinates, as spec
/// §4.4 requires of the primary engine.
#[must_use]
pub fn polygon_to_bbox(corners: &[(f32, f32); 4]) -> BBox {
    let xs = corners.iter().map(|(x, _)| *x);
    let ys = corners.iter().map(|(_, y)| *y);
    let min_x = xs.clone().fold(f32::INFINITY, f32::min);
    let max_x = xs.fold(f32::NEG_INFINITY, f32::max);
    let min_y = ys.clone().fold(f32::INFINITY, f32::min);
    let max_y = ys.fold(f32::NEG_INFINITY, f32::max);
    BBox::new(min_x, min_y, max_x - min_x, max_y - min_y)
}

pub(crate) fn block_with_bbox(role: BlockRole, text: String, confidence: Option<f32>, bbox: Option<BBox>) -> Block {
    Block::new(role, text).with_confidence(confidence).with_bbox(bbox)
}
