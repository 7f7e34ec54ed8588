//! Resume text extraction with tiered fallback.
//!
//! Strategies are tried from cheapest to most expensive and the first one
//! producing usable text wins:
//!
//! 1. plain text is returned as-is;
//! 2. PDFs go through the native text layer, accepted when it yields more
//!    than [`PdfConfig::min_native_chars`] characters;
//! 3. images, and PDFs with too little native text, go through OCR. PDF
//!    pages are rasterized at [`PdfConfig::render_scale`] first.
//!
//! [`ResumeExtractor::extract`] never fails: every error, and any panic
//! raised by an engine, comes back as an [`ExtractionResult`] with an error
//! message and empty text.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use crate::error::ExtractError;
use crate::models::config::{OcrConfig, PdfConfig, ResumexConfig};
use crate::models::resume::{ExtractionResult, MimeType, ResumeFile};
use crate::ocr::{EngineLoader, OcrEngineLoader, TextRecognizer};
use crate::pdf::{DocumentLoader, LopdfLoader, PdfProcessor};
use crate::progress::{ProgressReporter, ProgressTracker};

/// Per-run extraction state, traced at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    ExtractingNative,
    Accepted,
    NeedsOcr,
    ExtractingOcr,
    Done,
    Failed,
}

fn enter(stage: Stage, file: &ResumeFile) {
    debug!("{}: {:?}", file.name, stage);
}

/// Extracts plain text from resume files.
pub struct ResumeExtractor {
    pdf_loader: Box<dyn DocumentLoader>,
    ocr_loader: Box<dyn OcrEngineLoader>,
    ocr: OcrConfig,
    pdf: PdfConfig,
    render_surface: bool,
}

impl ResumeExtractor {
    /// Create an extractor using lopdf and the configured OCR backend.
    pub fn new(config: &ResumexConfig) -> Self {
        Self {
            pdf_loader: Box::new(LopdfLoader),
            ocr_loader: Box::new(EngineLoader::new(config.models.clone())),
            ocr: config.ocr.clone(),
            pdf: config.pdf.clone(),
            render_surface: config.runtime.render_surface,
        }
    }

    /// Replace the PDF document loader.
    pub fn with_pdf_loader(mut self, loader: impl DocumentLoader + 'static) -> Self {
        self.pdf_loader = Box::new(loader);
        self
    }

    /// Replace the OCR engine loader.
    pub fn with_ocr_loader(mut self, loader: impl OcrEngineLoader + 'static) -> Self {
        self.ocr_loader = Box::new(loader);
        self
    }

    /// Extract text from `file`, reporting milestones to `progress`.
    pub fn extract(
        &self,
        file: &ResumeFile,
        progress: Option<&mut dyn ProgressReporter>,
    ) -> ExtractionResult {
        enter(Stage::Idle, file);
        let mut tracker = ProgressTracker::new(progress);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(file, &mut tracker)))
            .unwrap_or_else(|payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ExtractError::ExtractionFailed(format!("extraction panicked: {}", reason)))
            });

        match outcome {
            Ok(text) => {
                enter(Stage::Done, file);
                tracker.report(100.0, "Extraction complete");
                info!("Extracted {} chars from {}", text.chars().count(), file.name);
                ExtractionResult::success(text)
            }
            Err(e) => {
                enter(Stage::Failed, file);
                warn!("Extraction error for {}: {}", file.name, e);
                ExtractionResult::failure(e.to_string())
            }
        }
    }

    fn run(
        &self,
        file: &ResumeFile,
        progress: &mut ProgressTracker<'_>,
    ) -> Result<String, ExtractError> {
        if !self.render_surface {
            return Err(ExtractError::EnvironmentUnsupported);
        }

        progress.report(0.0, "Starting extraction...");

        match &file.mime {
            MimeType::PlainText => String::from_utf8(file.data.clone()).map_err(|e| {
                ExtractError::ExtractionFailed(format!("text file is not valid UTF-8: {}", e))
            }),
            MimeType::Pdf => self.extract_pdf(file, progress),
            MimeType::Png | MimeType::Jpeg => self.extract_image(file, progress),
            MimeType::Unsupported(mime) => {
                debug!("Rejecting {} with type {}", file.name, mime);
                Err(ExtractError::UnsupportedType)
            }
        }
    }

    fn extract_pdf(
        &self,
        file: &ResumeFile,
        progress: &mut ProgressTracker<'_>,
    ) -> Result<String, ExtractError> {
        enter(Stage::ExtractingNative, file);
        progress.report(20.0, "Trying native PDF text extraction...");

        let pdf = self.pdf_loader.open(&file.data)?;
        let page_count = pdf.page_count();

        let mut native = String::new();
        for page in 1..=page_count {
            native.push_str(&pdf.page_text_runs(page)?.join(" "));
            native.push('\n');
        }

        let native = native.trim();
        let native_chars = native.chars().count();
        debug!("Native text layer: {} chars over {} pages", native_chars, page_count);

        if native_chars > self.pdf.min_native_chars {
            enter(Stage::Accepted, file);
            return Ok(native.to_string());
        }

        enter(Stage::NeedsOcr, file);
        progress.report(40.0, "Native text low, running OCR on PDF pages...");

        let mut engine = self.ocr_loader.load(&self.ocr)?;
        enter(Stage::ExtractingOcr, file);
        let pages = self.ocr_pages(pdf.as_ref(), engine.as_mut(), progress);
        engine.terminate();

        let mut text = String::new();
        for page in pages? {
            text.push_str(&page);
            text.push_str("\n\n");
        }
        progress.report(90.0, "OCR complete");
        Ok(text.trim().to_string())
    }

    /// Render and recognize every page, strictly in order. Pages come back
    /// exactly as recognized, blank ones included, so the page separators
    /// stay in place.
    fn ocr_pages(
        &self,
        pdf: &dyn PdfProcessor,
        engine: &mut dyn TextRecognizer,
        progress: &mut ProgressTracker<'_>,
    ) -> Result<Vec<String>, ExtractError> {
        let page_count = pdf.page_count();
        let mut pages = Vec::with_capacity(page_count as usize);

        for page in 1..=page_count {
            let done = (page - 1) as f32 / page_count as f32;
            progress.report(40.0 + 50.0 * done, &format!("OCR page {}/{}", page, page_count));

            let image = pdf.render_page(page, self.pdf.render_scale)?;
            let text = engine.recognize(&image)?;
            if text.trim().is_empty() {
                debug!("No text recognized on page {}", page);
            }
            pages.push(text);
        }

        Ok(pages)
    }

    fn extract_image(
        &self,
        file: &ResumeFile,
        progress: &mut ProgressTracker<'_>,
    ) -> Result<String, ExtractError> {
        let image = image::load_from_memory(&file.data)?;

        let mut engine = self.ocr_loader.load(&self.ocr)?;
        enter(Stage::ExtractingOcr, file);
        progress.report(50.0, "Running OCR on image...");
        let text = engine.recognize(&image);
        engine.terminate();

        let text = text?.trim().to_string();
        progress.report(90.0, "OCR complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OcrError, PdfError};
    use crate::models::resume::ProgressEvent;
    use crate::pdf::{FULL_PAGE, PlacedImage, build_pdf};
    use crate::progress::ProgressLog;
    use image::DynamicImage;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory document whose pages hold fixed text runs.
    struct FakePdf {
        pages: Vec<Vec<String>>,
        renders: Arc<Mutex<Vec<(u32, f32)>>>,
    }

    impl PdfProcessor for FakePdf {
        fn page_count(&self) -> u32 {
            self.pages.len() as u32
        }

        fn page_text_runs(&self, page: u32) -> Result<Vec<String>, PdfError> {
            self.pages
                .get(page as usize - 1)
                .cloned()
                .ok_or(PdfError::InvalidPage(page))
        }

        fn render_page(&self, page: u32, scale: f32) -> Result<DynamicImage, PdfError> {
            self.renders.lock().unwrap().push((page, scale));
            // Encode the page number in the image width for the fake engine
            Ok(DynamicImage::new_rgb8(page, 1))
        }
    }

    #[derive(Clone, Default)]
    struct FakePdfLoader {
        pages: Vec<Vec<String>>,
        renders: Arc<Mutex<Vec<(u32, f32)>>>,
        unavailable: bool,
    }

    impl FakePdfLoader {
        fn with_pages(pages: &[&[&str]]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|runs| runs.iter().map(|r| r.to_string()).collect())
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl DocumentLoader for FakePdfLoader {
        fn open(&self, _data: &[u8]) -> Result<Box<dyn PdfProcessor>, PdfError> {
            if self.unavailable {
                return Err(PdfError::Unavailable("not linked".to_string()));
            }
            Ok(Box::new(FakePdf {
                pages: self.pages.clone(),
                renders: self.renders.clone(),
            }))
        }
    }

    /// Engine that answers "Page N text" for an image N pixels wide, and
    /// nothing for an image `blank_width` pixels wide.
    struct FakeEngine {
        calls: Arc<AtomicUsize>,
        terminations: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<DynamicImage>>>,
        fixed: Option<String>,
        blank_width: Option<u32>,
        fail: bool,
    }

    impl TextRecognizer for FakeEngine {
        fn recognize(&mut self, image: &DynamicImage) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(image.clone());
            if self.fail {
                return Err(OcrError::Recognition("engine crashed".to_string()));
            }
            if self.blank_width == Some(image.width()) {
                return Ok(String::new());
            }
            Ok(self
                .fixed
                .clone()
                .unwrap_or_else(|| format!("Page {} text", image.width())))
        }

        fn terminate(self: Box<Self>) {
            self.terminations.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Clone, Default)]
    struct FakeOcrLoader {
        constructions: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        terminations: Arc<AtomicUsize>,
        seen: Arc<Mutex<Vec<DynamicImage>>>,
        fixed: Option<String>,
        blank_width: Option<u32>,
        fail: bool,
        unavailable: bool,
    }

    impl OcrEngineLoader for FakeOcrLoader {
        fn load(&self, config: &OcrConfig) -> Result<Box<dyn TextRecognizer>, OcrError> {
            assert_eq!(config.language, "eng");
            if self.unavailable {
                return Err(OcrError::Unavailable("no models".to_string()));
            }
            self.constructions.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeEngine {
                calls: self.calls.clone(),
                terminations: self.terminations.clone(),
                seen: self.seen.clone(),
                fixed: self.fixed.clone(),
                blank_width: self.blank_width,
                fail: self.fail,
            }))
        }
    }

    fn build_extractor(pdf: FakePdfLoader, ocr: FakeOcrLoader) -> ResumeExtractor {
        ResumeExtractor::new(&ResumexConfig::default())
            .with_pdf_loader(pdf)
            .with_ocr_loader(ocr)
    }

    fn png_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        DynamicImage::new_rgb8(4, 4)
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        data
    }

    fn assert_monotonic(events: &[ProgressEvent]) {
        assert!(!events.is_empty());
        for pair in events.windows(2) {
            assert!(pair[0].percent <= pair[1].percent, "{:?}", events);
        }
        for event in events {
            assert!((0.0..=100.0).contains(&event.percent));
        }
    }

    #[test]
    fn test_plain_text_is_returned_exactly() {
        let ocr = FakeOcrLoader::default();
        let extractor = build_extractor(FakePdfLoader::default(), ocr.clone());
        let content = "  Jane Doe\n\nSkills: Rust, SQL  \n";
        let file = ResumeFile::new("cv.txt", MimeType::PlainText, content.as_bytes().to_vec());

        let result = extractor.extract(&file, None);

        assert_eq!(result, ExtractionResult::success(content));
        assert_eq!(ocr.constructions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_utf8_text_fails() {
        let extractor = build_extractor(FakePdfLoader::default(), FakeOcrLoader::default());
        let file = ResumeFile::new("cv.txt", MimeType::PlainText, vec![0xff, 0xfe, 0x00]);

        let result = extractor.extract(&file, None);
        assert_eq!(result.text, "");
        assert!(result.error.unwrap().contains("UTF-8"));
    }

    #[test]
    fn test_native_pdf_skips_ocr() {
        let long_run = "Senior engineer with ten years of experience ".repeat(3);
        let pdf = FakePdfLoader::with_pages(&[&["Jane Doe", long_run.as_str()], &["Education", "MSc"]]);
        let ocr = FakeOcrLoader::default();
        let extractor = build_extractor(pdf, ocr.clone());
        let file = ResumeFile::new("cv.pdf", MimeType::Pdf, b"%PDF".to_vec());

        let result = extractor.extract(&file, None);

        let expected = format!("Jane Doe {}\nEducation MSc", long_run);
        assert_eq!(result, ExtractionResult::success(expected.trim()));
        assert_eq!(ocr.constructions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_short_native_pdf_runs_ocr_per_page() {
        let pdf = FakePdfLoader::with_pages(&[&["scan"], &[], &[]]);
        let ocr = FakeOcrLoader::default();
        let extractor = build_extractor(pdf.clone(), ocr.clone());
        let file = ResumeFile::new("scan.pdf", MimeType::Pdf, b"%PDF".to_vec());

        let mut log = ProgressLog::default();
        let result = extractor.extract(&file, Some(&mut log));

        assert_eq!(
            result,
            ExtractionResult::success("Page 1 text\n\nPage 2 text\n\nPage 3 text")
        );
        assert_eq!(ocr.constructions.load(Ordering::SeqCst), 1);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 3);
        assert_eq!(ocr.terminations.load(Ordering::SeqCst), 1);
        assert_eq!(
            *pdf.renders.lock().unwrap(),
            vec![(1, 2.5), (2, 2.5), (3, 2.5)]
        );

        assert_monotonic(&log.events);
        let percents: Vec<f32> = log.events.iter().map(|e| e.percent).collect();
        assert!(percents.contains(&40.0));
        assert!(percents.iter().any(|p| (*p - (40.0 + 50.0 / 3.0)).abs() < 1e-3));
        assert_eq!(log.events.last().unwrap().percent, 100.0);
    }

    #[test]
    fn test_blank_ocr_page_keeps_its_separator() {
        let pdf = FakePdfLoader::with_pages(&[&[], &[], &[]]);
        let ocr = FakeOcrLoader {
            blank_width: Some(2),
            ..FakeOcrLoader::default()
        };
        let extractor = build_extractor(pdf, ocr.clone());
        let file = ResumeFile::new("scan.pdf", MimeType::Pdf, b"%PDF".to_vec());

        let result = extractor.extract(&file, None);

        assert_eq!(
            result,
            ExtractionResult::success("Page 1 text\n\n\n\nPage 3 text")
        );
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_ocr_page_text_is_joined_untrimmed() {
        let pdf = FakePdfLoader::with_pages(&[&[], &[]]);
        let ocr = FakeOcrLoader {
            fixed: Some("  indented line\n".to_string()),
            ..FakeOcrLoader::default()
        };
        let extractor = build_extractor(pdf, ocr);
        let file = ResumeFile::new("scan.pdf", MimeType::Pdf, b"%PDF".to_vec());

        let result = extractor.extract(&file, None);

        // Only the joined document is trimmed, not each page
        assert_eq!(
            result,
            ExtractionResult::success("indented line\n\n\n  indented line")
        );
    }

    #[test]
    fn test_native_threshold_is_exclusive() {
        let exactly_200 = "x".repeat(200);
        let pdf = FakePdfLoader::with_pages(&[&[exactly_200.as_str()]]);
        let ocr = FakeOcrLoader {
            fixed: Some("ocr text".to_string()),
            ..FakeOcrLoader::default()
        };
        let extractor = build_extractor(pdf, ocr.clone());
        let file = ResumeFile::new("cv.pdf", MimeType::Pdf, Vec::new());

        let result = extractor.extract(&file, None);
        assert_eq!(result.text, "ocr text");
        assert_eq!(ocr.constructions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_image_runs_ocr_once() {
        let ocr = FakeOcrLoader {
            fixed: Some("  Jane Doe\nRust Engineer \n".to_string()),
            ..FakeOcrLoader::default()
        };
        let extractor = build_extractor(FakePdfLoader::default(), ocr.clone());
        let file = ResumeFile::new("cv.png", MimeType::Png, png_bytes());

        let mut log = ProgressLog::default();
        let result = extractor.extract(&file, Some(&mut log));

        assert_eq!(result, ExtractionResult::success("Jane Doe\nRust Engineer"));
        assert_eq!(ocr.constructions.load(Ordering::SeqCst), 1);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ocr.terminations.load(Ordering::SeqCst), 1);
        assert_monotonic(&log.events);
    }

    #[test]
    fn test_unsupported_type_touches_no_engine() {
        let pdf = FakePdfLoader::default();
        let ocr = FakeOcrLoader::default();
        let extractor = build_extractor(pdf.clone(), ocr.clone());
        let file = ResumeFile::new("cv.zip", MimeType::parse("application/zip"), vec![1, 2, 3]);

        let result = extractor.extract(&file, None);

        assert_eq!(result, ExtractionResult::failure("Unsupported file type"));
        assert_eq!(ocr.constructions.load(Ordering::SeqCst), 0);
        assert!(pdf.renders.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_render_surface() {
        let mut config = ResumexConfig::default();
        config.runtime.render_surface = false;
        let ocr = FakeOcrLoader::default();
        let extractor = ResumeExtractor::new(&config).with_ocr_loader(ocr.clone());
        let file = ResumeFile::new("cv.png", MimeType::Png, png_bytes());

        let result = extractor.extract(&file, None);
        assert_eq!(
            result,
            ExtractionResult::failure("Text extraction only works on client side")
        );
        assert_eq!(ocr.constructions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_engine_unavailable_messages() {
        let pdf = FakePdfLoader {
            unavailable: true,
            ..FakePdfLoader::default()
        };
        let extractor = build_extractor(pdf, FakeOcrLoader::default());
        let file = ResumeFile::new("cv.pdf", MimeType::Pdf, Vec::new());
        assert_eq!(
            extractor.extract(&file, None),
            ExtractionResult::failure("PDF library not available")
        );

        let ocr = FakeOcrLoader {
            unavailable: true,
            ..FakeOcrLoader::default()
        };
        let extractor = build_extractor(FakePdfLoader::default(), ocr);
        let file = ResumeFile::new("cv.jpg", MimeType::Png, png_bytes());
        assert_eq!(
            extractor.extract(&file, None),
            ExtractionResult::failure("OCR library not available")
        );
    }

    #[test]
    fn test_recognition_failure_terminates_engine() {
        let pdf = FakePdfLoader::with_pages(&[&[], &[]]);
        let ocr = FakeOcrLoader {
            fail: true,
            ..FakeOcrLoader::default()
        };
        let extractor = build_extractor(pdf, ocr.clone());
        let file = ResumeFile::new("scan.pdf", MimeType::Pdf, Vec::new());

        let result = extractor.extract(&file, None);

        assert_eq!(result, ExtractionResult::failure("text recognition failed: engine crashed"));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ocr.terminations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_corrupt_image_is_extraction_failure() {
        let ocr = FakeOcrLoader::default();
        let extractor = build_extractor(FakePdfLoader::default(), ocr.clone());
        let file = ResumeFile::new("cv.png", MimeType::Png, b"not a png".to_vec());

        let result = extractor.extract(&file, None);
        assert!(result.text.is_empty());
        assert!(result.error.unwrap().starts_with("failed to decode image"));
        assert_eq!(ocr.constructions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_real_pdf_through_lopdf() {
        let summary = "Backend engineer building distributed systems in Rust and Go. ";
        let runs = [summary, summary, summary, summary];
        let data = build_pdf(&[&runs[..]], &[]);
        let ocr = FakeOcrLoader::default();
        let extractor =
            ResumeExtractor::new(&ResumexConfig::default()).with_ocr_loader(ocr.clone());
        let file = ResumeFile::new("cv.pdf", MimeType::Pdf, data);

        let result = extractor.extract(&file, None);

        assert_eq!(result.error, None);
        assert!(result.text.contains("distributed systems"));
        assert_eq!(ocr.constructions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scanned_pdf_through_lopdf_reaches_ocr() {
        let data = build_pdf(&[&[]], &[PlacedImage::bilevel(16, 8, true, FULL_PAGE)]);
        let ocr = FakeOcrLoader::default();
        let extractor =
            ResumeExtractor::new(&ResumexConfig::default()).with_ocr_loader(ocr.clone());
        let file = ResumeFile::new("scan.pdf", MimeType::Pdf, data);

        let result = extractor.extract(&file, None);

        // The 200x100 pt page is rendered at 2.5x before recognition
        assert_eq!(result, ExtractionResult::success("Page 500 text"));
        let seen = ocr.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let page = seen[0].to_rgb8();
        assert_eq!(page.dimensions(), (500, 250));
        assert_eq!(page.get_pixel(250, 125), &image::Rgb([0, 0, 0]));
        assert_eq!(ocr.terminations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_garbage_pdf_reports_parse_error() {
        let extractor = ResumeExtractor::new(&ResumexConfig::default())
            .with_ocr_loader(FakeOcrLoader::default());
        let file = ResumeFile::new("cv.pdf", MimeType::Pdf, b"garbage".to_vec());

        let result = extractor.extract(&file, None);
        assert!(result.text.is_empty());
        assert!(result.error.unwrap().starts_with("failed to parse PDF"));
    }
}
