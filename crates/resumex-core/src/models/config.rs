//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ResumexError, Result};

/// Main configuration for the resumex pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumexConfig {
    /// OCR configuration.
    pub ocr: OcrConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Caller-side intake policy.
    pub intake: IntakeConfig,

    /// Runtime capabilities.
    pub runtime: RuntimeConfig,

    /// Model configuration.
    pub models: ModelConfig,
}

/// Which OCR implementation to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackend {
    /// PaddleOCR models through `pure-onnx-ocr`.
    #[default]
    Onnx,
    /// The `tesseract` command-line binary.
    Tesseract,
}

/// How the recognizer partitions a page into text regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegmentation {
    /// Automatic segmentation with orientation detection.
    #[default]
    AutoOsd,
    /// Automatic segmentation, no orientation detection.
    Auto,
    /// Treat the image as a single uniform block of text.
    SingleBlock,
}

impl PageSegmentation {
    /// Tesseract `--psm` value for this mode.
    pub fn psm(self) -> u8 {
        match self {
            Self::AutoOsd => 1,
            Self::Auto => 3,
            Self::SingleBlock => 6,
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Engine implementation.
    pub backend: OcrBackend,

    /// Recognition language (tesseract language code).
    pub language: String,

    /// Page segmentation mode.
    pub segmentation: PageSegmentation,

    /// Mean confidence below which `AutoOsd` retries a rotated image.
    pub orientation_retry_threshold: f32,

    /// Keep `[UNK]` tokens produced by the ONNX recognizer.
    pub keep_unk: bool,

    /// Path or name of the tesseract binary.
    pub tesseract_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::default(),
            language: "eng".to_string(),
            segmentation: PageSegmentation::default(),
            orientation_retry_threshold: 0.5,
            keep_unk: false,
            tesseract_path: PathBuf::from("tesseract"),
        }
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Native text longer than this (in chars, after trimming) skips OCR.
    pub min_native_chars: usize,

    /// Oversampling factor when rasterizing pages for OCR.
    pub render_scale: f32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            min_native_chars: 200,
            render_scale: 2.5,
        }
    }
}

/// Upload policy applied by the caller before extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Largest accepted file, in bytes.
    pub max_file_bytes: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 15 * 1024 * 1024,
        }
    }
}

/// Capabilities of the host runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// An offscreen raster surface is available for rendering pages.
    pub render_surface: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            render_surface: true,
        }
    }
}

/// Model file locations for the ONNX backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
        }
    }
}

impl ModelConfig {
    /// Recognition model and dictionary file names for a language.
    pub fn recognition_files(&self, language: &str) -> Option<(&'static str, &'static str)> {
        match language {
            "eng" | "latin" | "fra" | "deu" | "spa" | "ita" | "por" | "pol" => {
                Some(("latin_rec.onnx", "latin_dict.txt"))
            }
            _ => None,
        }
    }
}

impl ResumexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| ResumexError::Config(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ResumexError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
