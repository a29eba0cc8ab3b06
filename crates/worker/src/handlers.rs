//! The two job handlers (spec §4.1 "Dispatch"), grounded on
//! `original_source/worker/src/main.py`'s `handle_extraction_job`/
//! `handle_ocr_job`. Each returns the finished [`OcrVersion`] and the
//! [`DocumentStatus`] it earned, or an error string suitable for
//! `fail_job`'s `error_message` — mirroring the original's pattern of
//! letting any exception raised here propagate up to a single
//! `fail_job` call site in the poll loop.

use docflow_common::{DocumentStatus, Job, OcrVersion};
use docflow_ocr::{OcrEngine, PaddleOcrEngine, TesseractOcrEngine};
use docflow_pipeline::PdfiumPageSource;

use crate::config::Config;

pub type HandlerResult = std::result::Result<(OcrVersion, DocumentStatus), String>;

/// Direct Extractor pass (spec §4.2), falling through to `pending_ocr`
/// when the embedded text layer turns out insufficient.
pub fn handle_extraction(config: &Config, pdf_bytes: &[u8]) -> HandlerResult {
    let mut result = docflow_pdf::extract_text(pdf_bytes).map_err(|e| e.to_string())?;
    result.pipeline_version = config.pipeline_version.clone();

    tracing::info!(
        chars = result.metrics.char_count,
        pages = result.metrics.total_pages,
        runtime_ms = result.metrics.runtime_ms,
        "direct extraction complete"
    );

    let doc_text = result.doc_text.clone().unwrap_or_default();
    let sufficient = docflow_quality::is_document_sufficient(&doc_text, result.metrics.total_pages);

    let status = if sufficient {
        DocumentStatus::Ready
    } else {
        result.warnings.push(format!(
            "Insufficient text extracted ({} chars). Document likely scanned or image-based. Needs OCR processing.",
            result.metrics.char_count
        ));
        DocumentStatus::PendingOcr
    };

    Ok((result, status))
}

/// OCR Router pass (spec §4.8), escalating through the adaptive
/// three-phase pipeline and landing on `ready` or `ocr_failed`.
pub fn handle_ocr(config: &Config, job: &Job, pdf_bytes: &[u8]) -> HandlerResult {
    let language = job.requested_language();
    let tess_lang = config.tesseract_language(&language);

    let primary = PaddleOcrEngine::new(&config.ocr_models_dir).map_err(|e| e.to_string())?;
    let fallback = TesseractOcrEngine::new(&tess_lang).map_err(|e| e.to_string())?;
    let page_source = PdfiumPageSource;

    let mut result = docflow_pipeline::process_document_ocr(
        pdf_bytes,
        &page_source,
        &primary as &dyn OcrEngine,
        &fallback as &dyn OcrEngine,
        &config.pipeline_version,
        config.router_config(),
    )
    .map_err(|e| e.to_string())?;

    tracing::info!(
        chars = result.metrics.char_count,
        pages = result.metrics.total_pages,
        method = ?result.metrics.method,
        runtime_ms = result.metrics.runtime_ms,
        bad_pages = result.metrics.bad_pages.len(),
        fallback_pages = result.metrics.fallback_pages.len(),
        "OCR pass complete"
    );

    let doc_text = result.doc_text.clone().unwrap_or_default();
    let sufficient = docflow_quality::is_document_sufficient(&doc_text, result.metrics.total_pages);

    let status = if sufficient {
        DocumentStatus::Ready
    } else {
        result.warnings.push(format!(
            "OCR produced insufficient text ({} chars). Document may be damaged, very low quality, or in an unsupported format.",
            result.metrics.char_count
        ));
        DocumentStatus::OcrFailed
    };

    Ok((result, status))
}
