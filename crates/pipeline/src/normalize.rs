//! Normaliser (spec §4.7): converts per-page engine [`Block`]s into
//! [`Page`] records and assembles the final [`OcrVersion`].
//!
//! Grounded on `original_source/worker/src/ocr/normalize.py`'s
//! `normalize_paddle_output`/`normalize_tesseract_output`/
//! `build_ocr_version` — both engine-specific normalisers turned out
//! identical in the original (same classify-then-wrap shape), so they
//! collapse into the single `normalize_blocks` below, parametrised by
//! nothing engine-specific since the shared [`docflow_ocr::OcrEngine`]
//! contract already returns the common [`Block`] shape (spec §9
//! "Engine polymorphism").

use chrono::Utc;
use docflow_common::{Block, Metrics, Method, OcrVersion, Page};

/// One page's raw engine output, prior to classification.
pub struct PageInput {
    /// 1-indexed page number.
    pub page: u32,
    pub blocks: Vec<Block>,
    /// `(width, height)` of the image the blocks were detected on, in
    /// pixel units — `None` when position-based classification isn't
    /// possible (e.g. a fake engine in tests that never sets bboxes).
    pub page_size: Option<(f32, f32)>,
}

/// Classify a page's blocks (unless `classify` is false, per spec §4.7's
/// caller opt-out, in which case every block's role becomes
/// `paragraph`) and fold them into a [`Page`] record.
fn build_page(input: PageInput, classify: bool) -> Page {
    let blocks: Vec<Block> = input
        .blocks
        .into_iter()
        .map(|b| {
            if classify {
                docflow_classify::classify(b, input.page_size)
            } else {
                Block {
                    role: docflow_common::BlockRole::Paragraph,
                    ..b
                }
            }
        })
        .collect();

    let page_text = blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let confidences: Vec<f32> = blocks.iter().filter_map(|b| b.confidence).collect();
    let confidence = if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f32>() / confidences.len() as f32)
    };

    Page {
        page: input.page,
        blocks,
        text: page_text.clone(),
        raw_text: page_text,
        confidence,
    }
}

/// Build the reading-order `doc_text`: per page, the core-content-filtered
/// blocks joined by `\n`, pages joined by `\n\n` (spec §4.7). Pages whose
/// filtered block list is empty contribute nothing (not even a blank
/// paragraph break).
fn build_doc_text(pages: &[Page]) -> String {
    pages
        .iter()
        .filter_map(|page| {
            let parts: Vec<&str> = page
                .blocks
                .iter()
                .filter(|b| b.is_core_content())
                .map(|b| b.text.as_str())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parameters for [`build_result`], grouped to keep the call site
/// readable (mirrors `build_ocr_version`'s keyword-argument signature in
/// the original).
pub struct BuildParams<'a> {
    pub engine: &'a str,
    pub engine_version: &'a str,
    pub pipeline_version: &'a str,
    pub method: Method,
    pub runtime_ms: u64,
    pub dpi_initial: Option<u32>,
    pub dpi_rerun: Option<u32>,
    pub bad_pages: Vec<u32>,
    pub fallback_pages: Vec<u32>,
    pub warnings: Vec<String>,
    pub classify: bool,
}

/// Convert per-page engine output into a complete [`OcrVersion`] (spec
/// §4.7).
#[must_use]
pub fn build_result(page_inputs: Vec<PageInput>, params: BuildParams<'_>) -> OcrVersion {
    let pages: Vec<Page> = page_inputs
        .into_iter()
        .map(|p| build_page(p, params.classify))
        .collect();

    let char_count: usize = pages
        .iter()
        .flat_map(|p| p.blocks.iter())
        .map(|b| b.text.chars().count())
        .sum();

    let all_confidences: Vec<f32> = pages
        .iter()
        .flat_map(|p| p.blocks.iter())
        .filter_map(|b| b.confidence)
        .collect();
    let avg_conf = if all_confidences.is_empty() {
        None
    } else {
        Some(all_confidences.iter().sum::<f32>() / all_confidences.len() as f32)
    };

    let doc_text = build_doc_text(&pages);

    OcrVersion {
        created_at: Utc::now(),
        engine: params.engine.to_string(),
        engine_version: params.engine_version.to_string(),
        pipeline_version: params.pipeline_version.to_string(),
        metrics: Metrics {
            total_pages: pages.len() as u32,
            method: params.method,
            char_count,
            avg_conf,
            runtime_ms: params.runtime_ms,
            dpi_initial: params.dpi_initial,
            dpi_rerun: params.dpi_rerun,
            bad_pages: params.bad_pages,
            fallback_pages: params.fallback_pages,
        },
        pages,
        doc_text: Some(doc_text),
        warnings: params.warnings,
        model_name: None,
        model_version: None,
    }
}
