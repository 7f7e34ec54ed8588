//! PDF text runs and page rasterization using lopdf, pdf-extract and PDFium.

use std::cell::OnceCell;

use image::{DynamicImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use super::raster::PageRaster;
use super::{DocumentLoader, PdfProcessor, Result};
use crate::error::PdfError;

/// US Letter in points, used when a page has no usable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Largest raster edge we are willing to allocate.
const MAX_RENDER_EDGE: u32 = 16_384;

const MAX_TREE_DEPTH: usize = 64;

/// PDF document reader backed by lopdf.
pub struct PdfExtractor {
    document: Option<Document>,
    raw_data: Vec<u8>,
    /// Per-page text from pdf-extract, computed on first need.
    fallback_pages: OnceCell<Option<Vec<String>>>,
    #[cfg(feature = "pdfium")]
    pdfium: OnceCell<Option<pdfium_render::prelude::Pdfium>>,
}

impl PdfExtractor {
    /// Create an empty extractor.
    pub fn new() -> Self {
        Self {
            document: None,
            raw_data: Vec::new(),
            fallback_pages: OnceCell::new(),
            #[cfg(feature = "pdfium")]
            pdfium: OnceCell::new(),
        }
    }

    /// Parse a PDF from bytes.
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract and PDFium need the decrypted bytes
            let mut decrypted_data = Vec::new();
            doc.save_to(&mut decrypted_data)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            self.raw_data = decrypted_data;
        } else {
            self.raw_data = data.to_vec();
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        self.fallback_pages = OnceCell::new();
        Ok(())
    }

    /// Text of every page via pdf-extract, one entry per page.
    pub fn extract_text_by_pages(&self) -> Result<Vec<String>> {
        pdf_extract::extract_text_from_mem_by_pages(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| PdfError::Parse("No document loaded".to_string()))
    }

    fn page_id(&self, page: u32) -> Result<ObjectId> {
        self.document()?
            .get_pages()
            .get(&page)
            .copied()
            .ok_or(PdfError::InvalidPage(page))
    }

    /// Runs of a page lopdf cannot decode, taken from pdf-extract.
    fn fallback_page_runs(&self, page: u32) -> Vec<String> {
        let pages = self
            .fallback_pages
            .get_or_init(|| match self.extract_text_by_pages() {
                Ok(pages) => Some(pages),
                Err(e) => {
                    warn!("pdf-extract fallback failed: {}", e);
                    None
                }
            });

        match pages {
            Some(pages) => page_lines(pages, page),
            None => Vec::new(),
        }
    }

    /// Page bounds `[x0, y0, x1, y1]` in points, honoring MediaBox
    /// inheritance.
    fn media_box(&self, doc: &Document, page_id: ObjectId) -> [f32; 4] {
        let media_box = self
            .inherited_entry(doc, page_id, b"MediaBox")
            .and_then(|obj| obj.as_array().ok().cloned())
            .and_then(|arr| {
                let nums: Vec<f32> = arr.iter().filter_map(|o| o.as_float().ok()).collect();
                match nums[..] {
                    [ax, ay, bx, by] => Some([ax.min(bx), ay.min(by), ax.max(bx), ay.max(by)]),
                    _ => None,
                }
            });

        match media_box {
            Some(bounds) if bounds[2] > bounds[0] && bounds[3] > bounds[1] => bounds,
            _ => {
                trace!("Page {:?} has no usable MediaBox, using Letter", page_id);
                DEFAULT_MEDIA_BOX
            }
        }
    }

    /// Look up a page attribute, walking up the page tree.
    fn inherited_entry(&self, doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
        let mut node_id = page_id;

        // Bounded so a cyclic Parent chain cannot spin forever
        for _ in 0..MAX_TREE_DEPTH {
            let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
                return None;
            };

            if let Ok(value) = dict.get(key) {
                if let Ok((_, resolved)) = doc.dereference(value) {
                    return Some(resolved.clone());
                }
            }

            match dict.get(b"Parent") {
                Ok(Object::Reference(parent_id)) => node_id = *parent_id,
                _ => return None,
            }
        }

        warn!("Page tree deeper than {} levels at {:?}", MAX_TREE_DEPTH, page_id);
        None
    }

    /// Get resources dictionary for a page, handling inheritance.
    fn page_resources(&self, doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
        match self.inherited_entry(doc, page_id, b"Resources")? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Rasterize a page with the built-in painter: every image the content
    /// stream places, at its transformed position, on a white canvas the
    /// size of the MediaBox.
    pub(crate) fn paint_page(&self, page: u32, scale: f32) -> Result<RgbImage> {
        let doc = self.document()?;
        let page_id = self.page_id(page)?;

        let bounds = self.media_box(doc, page_id);
        let (width, height) = canvas_size(bounds, scale, page)?;

        let resources = self.page_resources(doc, page_id).unwrap_or_default();
        let operations = match doc.get_and_decode_page_content(page_id) {
            Ok(content) => content.operations,
            Err(e) => {
                warn!("Could not decode content of page {}: {}", page, e);
                Vec::new()
            }
        };

        let mut raster = PageRaster::new(doc, bounds, scale, width, height);
        raster.paint(&operations, &resources);

        debug!(
            "Painted page {} at {}x{} (scale {}, {} images)",
            page,
            width,
            height,
            scale,
            raster.images()
        );
        Ok(raster.finish())
    }
}

/// Canvas size for `bounds` at `scale`, bounded by [`MAX_RENDER_EDGE`].
fn canvas_size(bounds: [f32; 4], scale: f32, page: u32) -> Result<(u32, u32)> {
    let width = ((bounds[2] - bounds[0]) * scale).round();
    let height = ((bounds[3] - bounds[1]) * scale).round();

    let edge = MAX_RENDER_EDGE as f32;
    if !(width >= 1.0 && height >= 1.0 && width <= edge && height <= edge) {
        return Err(PdfError::Render {
            page,
            reason: format!("raster size {}x{} out of range", width, height),
        });
    }

    Ok((width as u32, height as u32))
}

/// Non-empty trimmed lines of one page (1-indexed) of per-page text.
fn page_lines(pages: &[String], page: u32) -> Vec<String> {
    let Some(text) = (page as usize).checked_sub(1).and_then(|i| pages.get(i)) else {
        return Vec::new();
    };

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfProcessor for PdfExtractor {
    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn page_text_runs(&self, page: u32) -> Result<Vec<String>> {
        let doc = self.document()?;
        self.page_id(page)?;

        match doc.extract_text(&[page]) {
            Ok(text) => Ok(text
                .lines()
                .map(str::trim)
                .filter(|run| !run.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) => {
                debug!("lopdf could not decode page {}: {}, trying pdf-extract", page, e);
                Ok(self.fallback_page_runs(page))
            }
        }
    }

    fn render_page(&self, page: u32, scale: f32) -> Result<DynamicImage> {
        self.page_id(page)?;

        #[cfg(feature = "pdfium")]
        {
            if let Some(pdfium) = self.pdfium.get_or_init(super::pdfium::bind) {
                return super::pdfium::render(pdfium, &self.raw_data, page, scale);
            }
        }

        self.paint_page(page, scale).map(DynamicImage::ImageRgb8)
    }
}

/// Opens documents with [`PdfExtractor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfLoader;

impl DocumentLoader for LopdfLoader {
    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfProcessor>> {
        let mut extractor = PdfExtractor::new();
        extractor.load(data)?;
        Ok(Box::new(extractor))
    }
}
