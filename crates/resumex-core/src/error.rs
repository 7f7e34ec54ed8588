//! Error types for the resumex-core library.

use thiserror::Error;

/// Error type for configuration loading and saving.
///
/// Extraction itself never returns this: its failures travel inside
/// [`ExtractionResult`](crate::ExtractionResult) as [`ExtractError`] text.
#[derive(Error, Debug)]
pub enum ResumexError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Failures surfaced at the extractor boundary.
///
/// The `Display` text of each variant is exactly the message placed in
/// [`ExtractionResult::error`](crate::ExtractionResult).
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Declared file type is not text, PDF, PNG or JPEG.
    #[error("Unsupported file type")]
    UnsupportedType,

    /// The PDF reader or OCR engine could not be constructed.
    #[error("{0} library not available")]
    EngineUnavailable(&'static str),

    /// An engine ran but failed on this input.
    #[error("{0}")]
    ExtractionFailed(String),

    /// No rendering surface is available in this runtime.
    #[error("Text extraction only works on client side")]
    EnvironmentUnsupported,
}

impl From<PdfError> for ExtractError {
    fn from(err: PdfError) -> Self {
        match err {
            PdfError::Unavailable(_) => Self::EngineUnavailable("PDF"),
            other => Self::ExtractionFailed(other.to_string()),
        }
    }
}

impl From<OcrError> for ExtractError {
    fn from(err: OcrError) -> Self {
        match err {
            OcrError::Unavailable(_) => Self::EngineUnavailable("OCR"),
            other => Self::ExtractionFailed(other.to_string()),
        }
    }
}

impl From<image::ImageError> for ExtractError {
    fn from(err: image::ImageError) -> Self {
        Self::ExtractionFailed(format!("failed to decode image: {err}"))
    }
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// The document reader could not be constructed.
    #[error("PDF reader unavailable: {0}")]
    Unavailable(String),

    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to render a page.
    #[error("failed to render page {page}: {reason}")]
    Render { page: u32, reason: String },

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The engine (models or binary) could not be loaded.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// Recognition failed on an image.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors raised by the caller-side intake policy.
#[derive(Error, Debug)]
pub enum IntakeError {
    /// File is larger than the configured upload cap.
    #[error("file is {size} bytes, larger than the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ResumexError>;
