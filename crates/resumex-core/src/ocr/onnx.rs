//! Pure Rust OCR engine wrapper using `pure-onnx-ocr`.

use std::time::Instant;

use image::{DynamicImage, GenericImageView};
use tracing::{debug, info};

use crate::error::OcrError;
use crate::models::config::{ModelConfig, OcrConfig};

use super::{TextBox, TextRecognizer, assemble_text, read_oriented};

/// OCR engine backed by `pure-onnx-ocr` (pure Rust, no external ONNX Runtime).
pub struct OnnxEngine {
    engine: pure_onnx_ocr::engine::OcrEngine,
    config: OcrConfig,
}

impl OnnxEngine {
    /// Create an engine from model files in `models.model_dir`.
    ///
    /// The recognition model and dictionary are chosen by the configured
    /// language.
    pub fn from_dir(models: &ModelConfig, config: OcrConfig) -> Result<Self, OcrError> {
        let (rec_model, dictionary) = models.recognition_files(&config.language).ok_or_else(|| {
            OcrError::Unavailable(format!("no recognition model for language {}", config.language))
        })?;

        let det_path = models.model_dir.join(&models.detection_model);
        let rec_path = models.model_dir.join(rec_model);
        let dict_path = models.model_dir.join(dictionary);

        for path in [&det_path, &rec_path, &dict_path] {
            if !path.exists() {
                return Err(OcrError::Unavailable(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(&det_path)
            .rec_model_path(&rec_path)
            .dictionary_path(&dict_path)
            .build()
            .map_err(|e| OcrError::Unavailable(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded pure-onnx-ocr engine from {}", models.model_dir.display());

        Ok(Self { engine, config })
    }

    fn read_boxes(&self, image: &DynamicImage) -> Result<Vec<TextBox>, OcrError> {
        let results = self
            .engine
            .run_from_image(image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;

        debug!("pure-onnx-ocr returned {} text regions", results.len());

        Ok(results
            .iter()
            .map(|r| {
                let text = if self.config.keep_unk {
                    r.text.clone()
                } else {
                    r.text.replace("[UNK]", " ")
                };
                TextBox {
                    rect: polygon_to_rect(&r.bounding_box),
                    text,
                    confidence: r.confidence,
                }
            })
            .collect())
    }
}

impl TextRecognizer for OnnxEngine {
    fn recognize(&mut self, image: &DynamicImage) -> Result<String, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(OcrError::InvalidImage(format!("{}x{}", width, height)));
        }

        info!("Processing image: {}x{}", width, height);

        let boxes = read_oriented(
            image,
            self.config.segmentation,
            self.config.orientation_retry_threshold,
            |image| self.read_boxes(image),
        )?;

        let box_count = boxes.len();
        let text = assemble_text(boxes, self.config.segmentation);

        info!(
            "OCR complete: {} text boxes in {}ms",
            box_count,
            start.elapsed().as_millis()
        );

        Ok(text)
    }
}

/// Axis-aligned bounds of a detection polygon.
fn polygon_to_rect(polygon: &pure_onnx_ocr::Polygon<f64>) -> [f32; 4] {
    let mut rect = [f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY];
    for coord in polygon.exterior().coords() {
        rect[0] = rect[0].min(coord.x as f32);
        rect[1] = rect[1].min(coord.y as f32);
        rect[2] = rect[2].max(coord.x as f32);
        rect[3] = rect[3].max(coord.y as f32);
    }
    if rect[0].is_infinite() {
        return [0.0; 4];
    }
    rect
}
