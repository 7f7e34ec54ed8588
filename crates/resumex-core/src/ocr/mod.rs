//! Optical recognition engines.
//!
//! An engine is created through an [`OcrEngineLoader`] once per extraction
//! that needs OCR, fed every page of that extraction in order, and then
//! terminated.

#[cfg(feature = "native")]
mod onnx;
mod tesseract;

#[cfg(feature = "native")]
pub use onnx::OnnxEngine;
pub use tesseract::TesseractEngine;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::OcrError;
use crate::models::config::{ModelConfig, OcrBackend, OcrConfig, PageSegmentation};

/// A stateful recognition engine that processes one image at a time.
pub trait TextRecognizer {
    /// Recognize the text in an image.
    fn recognize(&mut self, image: &DynamicImage) -> Result<String, OcrError>;

    /// Release the engine and anything it holds.
    fn terminate(self: Box<Self>) {}
}

/// Constructs recognition engines.
pub trait OcrEngineLoader: Send + Sync {
    /// Build and initialize an engine for `config`.
    fn load(&self, config: &OcrConfig) -> Result<Box<dyn TextRecognizer>, OcrError>;
}

/// Loader that picks the backend named in [`OcrConfig::backend`].
#[derive(Debug, Clone, Default)]
pub struct EngineLoader {
    models: ModelConfig,
}

impl EngineLoader {
    /// Create a loader resolving ONNX models from `models`.
    pub fn new(models: ModelConfig) -> Self {
        Self { models }
    }
}

impl OcrEngineLoader for EngineLoader {
    fn load(&self, config: &OcrConfig) -> Result<Box<dyn TextRecognizer>, OcrError> {
        debug!(
            "Loading {:?} OCR engine (language={}, segmentation={:?})",
            config.backend, config.language, config.segmentation
        );

        match config.backend {
            #[cfg(feature = "native")]
            OcrBackend::Onnx => Ok(Box::new(OnnxEngine::from_dir(&self.models, config.clone())?)),
            #[cfg(not(feature = "native"))]
            OcrBackend::Onnx => Err(OcrError::Unavailable(
                "built without the native ONNX engine".to_string(),
            )),
            OcrBackend::Tesseract => Ok(Box::new(TesseractEngine::load(config)?)),
        }
    }
}

/// A recognized text region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    /// Axis-aligned bounds (min_x, min_y, max_x, max_y).
    pub rect: [f32; 4],

    /// Recognized text content.
    pub text: String,

    /// Recognition confidence (0.0 - 1.0).
    pub confidence: f32,
}

impl TextBox {
    fn row(&self) -> i32 {
        // Group by approximate vertical position (within 20 pixels)
        (self.rect[1] / 20.0) as i32
    }
}

/// Sort boxes by reading order (top-to-bottom, left-to-right).
pub fn sort_by_reading_order(boxes: &mut [TextBox]) {
    boxes.sort_by(|a, b| {
        a.row().cmp(&b.row()).then_with(|| {
            a.rect[0]
                .partial_cmp(&b.rect[0])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });
}

/// Mean confidence of a set of boxes, 0 when empty.
pub fn mean_confidence(boxes: &[TextBox]) -> f32 {
    if boxes.is_empty() {
        return 0.0;
    }
    boxes.iter().map(|b| b.confidence).sum::<f32>() / boxes.len() as f32
}

/// Read `image` with `read`, retrying upside down when orientation
/// detection is on and the first reading is weak.
///
/// Under [`PageSegmentation::AutoOsd`] a non-empty reading whose mean
/// confidence is below `retry_threshold` is repeated on the image rotated
/// 180 degrees, and the more confident of the two readings wins. Other
/// modes read exactly once.
pub fn read_oriented<F>(
    image: &DynamicImage,
    segmentation: PageSegmentation,
    retry_threshold: f32,
    mut read: F,
) -> Result<Vec<TextBox>, OcrError>
where
    F: FnMut(&DynamicImage) -> Result<Vec<TextBox>, OcrError>,
{
    let boxes = read(image)?;

    // An upside-down scan reads with low confidence
    if segmentation != PageSegmentation::AutoOsd
        || boxes.is_empty()
        || mean_confidence(&boxes) >= retry_threshold
    {
        return Ok(boxes);
    }

    let flipped = read(&image.rotate180())?;
    if mean_confidence(&flipped) > mean_confidence(&boxes) {
        debug!("Image reads better rotated 180 degrees");
        return Ok(flipped);
    }
    Ok(boxes)
}

/// Lay recognized boxes out as text according to the segmentation mode.
///
/// `SingleBlock` yields one space-separated paragraph; the automatic modes
/// keep one output line per visual row.
pub fn assemble_text(mut boxes: Vec<TextBox>, segmentation: PageSegmentation) -> String {
    sort_by_reading_order(&mut boxes);

    let words = boxes.iter().map(|b| b.text.trim()).filter(|t| !t.is_empty());

    if segmentation == PageSegmentation::SingleBlock {
        return words.collect::<Vec<_>>().join(" ");
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current_row = None;
    for text_box in &boxes {
        let text = text_box.text.trim();
        if text.is_empty() {
            continue;
        }
        match (current_row, lines.last_mut()) {
            (Some(row), Some(line)) if row == text_box.row() => {
                line.push(' ');
                line.push_str(text);
            }
            _ => {
                lines.push(text.to_string());
                current_row = Some(text_box.row());
            }
        }
    }

    lines.join("\n")
}
