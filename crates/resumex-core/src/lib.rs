//! Core library for resume text extraction.
//!
//! This crate provides:
//! - Plain text, PDF and image resume extraction with tiered fallback
//! - PDF text runs and page rasterization (lopdf, pdf-extract, PDFium)
//! - OCR through pure-onnx-ocr or the tesseract binary
//! - The caller-side intake policy (size cap, fallback text)

pub mod error;
pub mod extractor;
pub mod intake;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod progress;

pub use error::{ExtractError, IntakeError, OcrError, PdfError, ResumexError, Result};
pub use extractor::ResumeExtractor;
pub use intake::{PreparedResume, ResumeIntake, extract_text_fallback};
pub use models::config::ResumexConfig;
pub use models::resume::{ExtractionResult, MimeType, ProgressEvent, ResumeFile};
pub use ocr::{EngineLoader, OcrEngineLoader, TextRecognizer};
pub use pdf::{DocumentLoader, LopdfLoader, PdfExtractor, PdfProcessor};
pub use progress::{ProgressLog, ProgressReporter, ProgressTracker};
