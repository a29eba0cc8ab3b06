//! Rasterise a PDF page to an RGB pixel grid at a requested DPI.

use crate::{PdfError, Result};
use pdfium_render::prelude::*;

/// A rendered page: RGB pixel data, row-major, 3 bytes per pixel, plus
/// the pixel dimensions it was rendered at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

fn bind_pdfium() -> Result<Pdfium> {
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| PdfError::LoadFailed(e.to_string()))
}

/// Number of pages in a PDF.
pub fn page_count(pdf_bytes: &[u8]) -> Result<u32> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| PdfError::LoadFailed(e.to_string()))?;
    Ok(document.pages().len() as u32)
}

/// Render one page (0-indexed) at the given DPI. Width/height derive
/// from the page's native point dimensions scaled by `dpi/72`, per
/// spec §4.3. The document handle is released on every exit path via
/// RAII (`document`/`pdfium` drop at the end of this function's scope,
/// including on the early error returns below).
pub fn render(pdf_bytes: &[u8], page_index: u32, dpi: u32) -> Result<RenderedPage> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| PdfError::LoadFailed(e.to_string()))?;

    let pages = document.pages();
    let total = pages.len() as u32;
    let page = pages.get(page_index as u16).map_err(|_| PdfError::InvalidPage {
        index: page_index,
        page_count: total,
    })?;

    let zoom = dpi as f32 / 72.0;
    let target_width = (page.width().value * zoom).round() as i32;
    let target_height = (page.height().value * zoom).round() as i32;

    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width)
        .set_target_height(Some(target_height));

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| PdfError::RenderFailed(e.to_string()))?;

    let image = bitmap.as_image().into_rgb8();
    let (width, height) = image.dimensions();

    Ok(RenderedPage {
        width,
        height,
        rgb: image.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_factor_matches_dpi_over_72() {
        // 72 DPI is a 1.0 zoom (native point dimensions), 200 DPI scales up ~2.78x.
        let zoom_72 = 72.0_f32 / 72.0;
        let zoom_200 = 200.0_f32 / 72.0;
        assert!((zoom_72 - 1.0).abs() < 1e-6);
        assert!((zoom_200 - 2.777_78).abs() < 1e-3);
    }
}
