//! OCR through the `tesseract` command-line binary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, OnceLock};

use image::{DynamicImage, GenericImageView};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

use super::TextRecognizer;

/// Version banner per binary path. Checked once per process, never invalidated.
static VERSIONS: OnceLock<Mutex<HashMap<PathBuf, Result<String, String>>>> = OnceLock::new();

/// Run `tesseract --version` once per binary and remember the outcome.
fn binary_version(binary: &Path) -> Result<String, OcrError> {
    let versions = VERSIONS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut versions = versions
        .lock()
        .map_err(|_| OcrError::Unavailable("tesseract version cache poisoned".to_string()))?;

    versions
        .entry(binary.to_path_buf())
        .or_insert_with(|| {
            let output = Command::new(binary)
                .arg("--version")
                .output()
                .map_err(|e| format!("failed to run {}: {}", binary.display(), e))?;

            if !output.status.success() {
                return Err(format!("{} --version exited with {}", binary.display(), output.status));
            }

            // Older releases print the banner on stderr
            let banner = if output.stdout.is_empty() {
                output.stderr
            } else {
                output.stdout
            };
            Ok(String::from_utf8_lossy(&banner)
                .lines()
                .next()
                .unwrap_or("tesseract")
                .trim()
                .to_string())
        })
        .clone()
        .map_err(OcrError::Unavailable)
}

/// Tesseract engine with a fixed language and segmentation mode.
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
    psm: u8,
    workdir: TempDir,
    pages: u32,
}

impl TesseractEngine {
    /// Check the binary and prepare a scratch directory for page images.
    pub fn load(config: &OcrConfig) -> Result<Self, OcrError> {
        let version = binary_version(&config.tesseract_path)?;

        let workdir = tempfile::tempdir()
            .map_err(|e| OcrError::Unavailable(format!("failed to create temp dir: {}", e)))?;

        info!(
            "Using {} (language={}, psm={})",
            version,
            config.language,
            config.segmentation.psm()
        );

        Ok(Self {
            binary: config.tesseract_path.clone(),
            language: config.language.clone(),
            psm: config.segmentation.psm(),
            workdir,
            pages: 0,
        })
    }
}

impl TextRecognizer for TesseractEngine {
    fn recognize(&mut self, image: &DynamicImage) -> Result<String, OcrError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidImage(format!("{}x{}", width, height)));
        }

        self.pages += 1;
        let image_path = self.workdir.path().join(format!("page-{}.png", self.pages));
        image
            .save_with_format(&image_path, image::ImageFormat::Png)
            .map_err(|e| OcrError::InvalidImage(format!("failed to write page image: {}", e)))?;

        let output = Command::new(&self.binary)
            .arg(&image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.psm.to_string())
            .output()
            .map_err(|e| OcrError::Recognition(format!("failed to run tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        // Tesseract ends each page with a form feed
        let text = String::from_utf8_lossy(&output.stdout)
            .trim_end_matches(|c: char| c.is_whitespace() || c == '\x0c')
            .to_string();

        debug!("tesseract read {} chars from {}x{} image", text.len(), width, height);
        Ok(text)
    }

    fn terminate(self: Box<Self>) {
        let engine = *self;
        if let Err(e) = engine.workdir.close() {
            warn!("Failed to remove tesseract scratch directory: {}", e);
        }
        debug!("Tesseract engine terminated after {} pages", engine.pages);
    }
}
