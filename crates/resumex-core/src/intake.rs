//! Caller-side handling of an uploaded resume.
//!
//! The extractor stays free of policy; this module applies the upload size
//! cap and substitutes a fixed sentence when extraction yields nothing
//! usable.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::IntakeError;
use crate::extractor::ResumeExtractor;
use crate::models::config::IntakeConfig;
use crate::models::resume::ResumeFile;
use crate::progress::ProgressReporter;

/// Text used in place of an extraction that produced nothing usable.
pub fn extract_text_fallback(file_name: &str) -> String {
    format!(
        "Resume uploaded: {file_name}. Text extraction failed — please manually enter key details for better results."
    )
}

/// Resume text ready for question generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedResume {
    /// Original file name.
    pub file_name: String,
    /// Extracted text, or the fallback sentence.
    pub text: String,
    /// Whether `text` is the fallback sentence.
    pub used_fallback: bool,
    /// Error reported by the extractor, if any.
    pub extraction_error: Option<String>,
}

/// Applies the upload policy around a [`ResumeExtractor`].
pub struct ResumeIntake<'a> {
    extractor: &'a ResumeExtractor,
    config: IntakeConfig,
}

impl<'a> ResumeIntake<'a> {
    /// Create an intake over an extractor.
    pub fn new(extractor: &'a ResumeExtractor, config: IntakeConfig) -> Self {
        Self { extractor, config }
    }

    /// Check the size cap, extract, and fall back when the text is unusable.
    pub fn prepare(
        &self,
        file: &ResumeFile,
        progress: Option<&mut dyn ProgressReporter>,
    ) -> Result<PreparedResume, IntakeError> {
        if file.len() > self.config.max_file_bytes {
            return Err(IntakeError::TooLarge {
                size: file.len(),
                limit: self.config.max_file_bytes,
            });
        }

        let result = self.extractor.extract(file, progress);

        if result.needs_fallback() {
            warn!(
                "Extraction unusable for {} ({}), using fallback text",
                file.name,
                result.error.as_deref().unwrap_or("empty text")
            );
            return Ok(PreparedResume {
                file_name: file.name.clone(),
                text: extract_text_fallback(&file.name),
                used_fallback: true,
                extraction_error: result.error,
            });
        }

        info!("Prepared {} ({} chars)", file.name, result.text.len());
        Ok(PreparedResume {
            file_name: file.name.clone(),
            text: result.text,
            used_fallback: false,
            extraction_error: None,
        })
    }
}
