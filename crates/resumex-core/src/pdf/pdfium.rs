//! Page rendering through the PDFium library.

use std::sync::OnceLock;

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::PdfError;

/// Why binding failed, recorded once so later documents skip straight to
/// the built-in rasterizer.
static BIND_FAILURE: OnceLock<String> = OnceLock::new();

/// Bind to the system PDFium library, or `None` when it is not installed.
pub(crate) fn bind() -> Option<Pdfium> {
    if let Some(reason) = BIND_FAILURE.get() {
        debug!("PDFium unavailable ({}), using built-in rasterizer", reason);
        return None;
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(e) => {
            warn!("Failed to bind PDFium, using built-in rasterizer: {}", e);
            let _ = BIND_FAILURE.set(e.to_string());
            None
        }
    }
}

/// Render page `page` (1-indexed) of `data` at `scale` pixels per point.
pub(crate) fn render(
    pdfium: &Pdfium,
    data: &[u8],
    page: u32,
    scale: f32,
) -> Result<DynamicImage, PdfError> {
    let render_err = |reason: String| PdfError::Render { page, reason };

    let document = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(|e| render_err(e.to_string()))?;

    let index = u16::try_from(page.saturating_sub(1)).map_err(|_| PdfError::InvalidPage(page))?;
    let pdf_page = document
        .pages()
        .get(index)
        .map_err(|_| PdfError::InvalidPage(page))?;

    let width = ((pdf_page.width().value * scale).round() as i32).max(1);
    let height = ((pdf_page.height().value * scale).round() as i32).max(1);

    let config = PdfRenderConfig::new()
        .set_target_width(width)
        .set_target_height(height)
        .rotate_if_landscape(PdfPageRenderRotation::None, false);

    let bitmap = pdf_page
        .render_with_config(&config)
        .map_err(|e| render_err(format!("PDFium: {}", e)))?;

    debug!("PDFium rendered page {} at {}x{}", page, width, height);
    Ok(DynamicImage::ImageRgb8(bitmap.as_image().into_rgb8()))
}
