//! Resume input and extraction output types.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Declared content type of an uploaded resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum MimeType {
    /// `text/plain`
    PlainText,
    /// `application/pdf`
    Pdf,
    /// `image/png`
    Png,
    /// `image/jpeg`
    Jpeg,
    /// Anything else, kept verbatim.
    Unsupported(String),
}

impl MimeType {
    /// Parse a declared MIME type string.
    pub fn parse(value: &str) -> Self {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "text/plain" => Self::PlainText,
            "application/pdf" => Self::Pdf,
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            _ => Self::Unsupported(value.to_string()),
        }
    }

    /// Guess the type from a file extension.
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "txt" => Self::PlainText,
            "pdf" => Self::Pdf,
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            "" => Self::Unsupported("application/octet-stream".to_string()),
            other => Self::Unsupported(format!("application/x-{other}")),
        }
    }

    /// Canonical MIME string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PlainText => "text/plain",
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Unsupported(raw) => raw,
        }
    }

    /// Whether this is a raster image type.
    pub fn is_image(&self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for MimeType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<MimeType> for String {
    fn from(value: MimeType) -> Self {
        value.as_str().to_string()
    }
}

/// A user-supplied resume file.
#[derive(Debug, Clone)]
pub struct ResumeFile {
    /// Original file name.
    pub name: String,
    /// Declared content type.
    pub mime: MimeType,
    /// Raw file content.
    pub data: Vec<u8>,
}

impl ResumeFile {
    /// Create a file from its parts.
    pub fn new(name: impl Into<String>, mime: MimeType, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime,
            data,
        }
    }

    /// Byte length of the content.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Whether the file has no content.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Outcome of one extraction run.
///
/// Exactly one of `text` (non-empty on success) or `error` is meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted text, empty on failure.
    pub text: String,
    /// Failure message, `None` on success.
    pub error: Option<String>,
}

impl ExtractionResult {
    /// Successful extraction.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }

    /// Failed extraction.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            error: Some(error.into()),
        }
    }

    /// True when the caller should substitute fallback text.
    pub fn needs_fallback(&self) -> bool {
        self.error.is_some() || self.text.trim().is_empty()
    }
}

/// A progress milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Completion percentage in `[0, 100]`.
    pub percent: f32,
    /// Human-readable status.
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_mime() {
        assert_eq!(MimeType::parse("text/plain"), MimeType::PlainText);
        assert_eq!(MimeType::parse("text/plain; charset=utf-8"), MimeType::PlainText);
        assert_eq!(MimeType::parse("APPLICATION/PDF"), MimeType::Pdf);
        assert_eq!(MimeType::parse("image/jpg"), MimeType::Jpeg);
        assert_eq!(
            MimeType::parse("application/zip"),
            MimeType::Unsupported("application/zip".to_string())
        );
        assert_eq!(
            MimeType::parse("image/gif"),
            MimeType::Unsupported("image/gif".to_string())
        );
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(MimeType::from_path(Path::new("cv.PDF")), MimeType::Pdf);
        assert_eq!(MimeType::from_path(Path::new("scan.jpeg")), MimeType::Jpeg);
        assert_eq!(MimeType::from_path(Path::new("notes.txt")), MimeType::PlainText);
        assert!(!MimeType::from_path(Path::new("archive.zip")).is_image());
        assert!(matches!(
            MimeType::from_path(Path::new("README")),
            MimeType::Unsupported(_)
        ));
    }

    #[test]
    fn test_result_serializes_null_error() {
        let json = serde_json::to_string(&ExtractionResult::success("hi")).unwrap();
        assert_eq!(json, r#"{"text":"hi","error":null}"#);
    }

    #[test]
    fn test_needs_fallback() {
        assert!(!ExtractionResult::success("Jane Doe").needs_fallback());
        assert!(ExtractionResult::success("  \n ").needs_fallback());
        assert!(ExtractionResult::failure("boom").needs_fallback());
    }
}
