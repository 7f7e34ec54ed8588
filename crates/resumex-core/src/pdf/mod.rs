//! PDF processing module.

mod extractor;
#[cfg(feature = "pdfium")]
mod pdfium;
mod raster;
mod samples;

pub use extractor::{LopdfLoader, PdfExtractor};

use crate::error::PdfError;
use image::DynamicImage;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Trait for an opened PDF document.
pub trait PdfProcessor {
    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Positioned text runs of a page (1-indexed), in content order.
    fn page_text_runs(&self, page: u32) -> Result<Vec<String>>;

    /// Rasterize a page at `scale` pixels per PDF point.
    fn render_page(&self, page: u32, scale: f32) -> Result<DynamicImage>;
}

/// Opens documents. `PdfError::Unavailable` means the reader itself could
/// not be constructed, as opposed to a bad input file.
pub trait DocumentLoader: Send + Sync {
    /// Parse a document from bytes.
    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfProcessor>>;
}

#[cfg(test)]
pub(crate) use extractor::tests::{FULL_PAGE, PlacedImage, build_pdf};
