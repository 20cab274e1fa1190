//! CLIP ViT-B/32 zero-shot classifier backed by onnxruntime.
//!
//! Expects three files in the model directory:
//! - `visual.onnx`: image encoder, input `pixel_values` [B, 3, 224, 224],
//!   first output the image embeddings [B, D]
//! - `textual.onnx`: text encoder, inputs `input_ids` and `attention_mask`
//!   [N, 77], first output the text embeddings [N, D]
//! - `tokenizer.json`: the HuggingFace tokenizer definition
//!
//! Both sessions are loaded once and shared read-only across requests.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ndarray::Array2;
use ort::{EnvironmentBuilder, GraphOptimizationLevel, Session};
use thiserror::Error;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::info;

use super::{softmax, transforms, ClassificationError, ImageClassifier};

/// CLIP's token context length.
const CONTEXT_LENGTH: usize = 77;

/// exp() of CLIP's learned logit scale, frozen at export time.
const LOGIT_SCALE: f32 = 100.0;

/// Errors raised while loading the model at startup.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    MissingFile(PathBuf),

    #[error("failed to build inference session: {0}")]
    Session(#[from] ort::Error),

    #[error("failed to load tokenizer: {0}")]
    Tokenizer(String),
}

/// Initialize the process-wide onnxruntime environment. Call once before
/// loading any session.
pub fn init_runtime() -> Result<(), ort::Error> {
    EnvironmentBuilder::default()
        .with_name("categoreyes")
        .commit()?;
    Ok(())
}

pub struct ClipClassifier {
    visual: Session,
    textual: Session,
    tokenizer: Tokenizer,
}

impl ClipClassifier {
    /// Load both encoder sessions and the tokenizer from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ModelLoadError> {
        let visual_path = require_file(model_dir, "visual.onnx")?;
        let textual_path = require_file(model_dir, "textual.onnx")?;
        let tokenizer_path = require_file(model_dir, "tokenizer.json")?;

        let visual = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(&visual_path)?;
        let textual = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_model_from_file(&textual_path)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| ModelLoadError::Tokenizer(e.to_string()))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(CONTEXT_LENGTH),
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: CONTEXT_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| ModelLoadError::Tokenizer(e.to_string()))?;

        info!(
            "Loaded CLIP encoders from {} (context length {})",
            model_dir.display(),
            CONTEXT_LENGTH
        );

        Ok(Self {
            visual,
            textual,
            tokenizer,
        })
    }

    /// Run the visual encoder and return the L2-normalized embedding.
    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>, ClassificationError> {
        let pixels = transforms::preprocess(image);
        let outputs = self.visual.run(ort::inputs![
            "pixel_values" => pixels.view()
        ]?)?;

        let tensor = outputs[0].extract_tensor::<f32>()?;
        let view = tensor.view();
        if view.ndim() != 2 || view.shape()[0] != 1 {
            return Err(ClassificationError::BadOutput(format!(
                "expected image embeddings of shape [1, D], got {:?}",
                view.shape()
            )));
        }

        let mut embedding: Vec<f32> = view.iter().copied().collect();
        l2_normalize(&mut embedding);
        Ok(embedding)
    }

    /// Tokenize all labels as one padded batch and run the text encoder,
    /// returning one L2-normalized embedding per label.
    fn embed_labels(&self, labels: &[&str]) -> Result<Vec<Vec<f32>>, ClassificationError> {
        let inputs: Vec<&str> = labels.to_vec();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| ClassificationError::Tokenize(e.to_string()))?;

        let n = encodings.len();
        let mut input_ids = Array2::<i64>::zeros((n, CONTEXT_LENGTH));
        let mut attention_mask = Array2::<i64>::zeros((n, CONTEXT_LENGTH));
        for (row, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for col in 0..CONTEXT_LENGTH.min(ids.len()) {
                input_ids[[row, col]] = ids[col] as i64;
                attention_mask[[row, col]] = mask[col] as i64;
            }
        }

        let outputs = self.textual.run(ort::inputs![
            "input_ids" => input_ids.view(),
            "attention_mask" => attention_mask.view()
        ]?)?;

        let tensor = outputs[0].extract_tensor::<f32>()?;
        let view = tensor.view();
        if view.ndim() != 2 || view.shape()[0] != n {
            return Err(ClassificationError::BadOutput(format!(
                "expected text embeddings of shape [{}, D], got {:?}",
                n,
                view.shape()
            )));
        }

        let dim = view.shape()[1];
        let flat: Vec<f32> = view.iter().copied().collect();
        let mut embeddings = Vec::with_capacity(n);
        for row in 0..n {
            let mut embedding = flat[row * dim..(row + 1) * dim].to_vec();
            l2_normalize(&mut embedding);
            embeddings.push(embedding);
        }
        Ok(embeddings)
    }
}

impl ImageClassifier for ClipClassifier {
    fn classify(
        &self,
        image: &DynamicImage,
        labels: &[&str],
    ) -> Result<Vec<f32>, ClassificationError> {
        if labels.is_empty() {
            return Err(ClassificationError::EmptyLabels);
        }

        // Full joint forward pass against all labels on every call: the
        // softmax is over this label batch, so scores are calibrated
        // within it.
        let image_embedding = self.embed_image(image)?;
        let label_embeddings = self.embed_labels(labels)?;

        let mut logits: Vec<f32> = label_embeddings
            .iter()
            .map(|label| LOGIT_SCALE * dot(&image_embedding, label))
            .collect();
        softmax(&mut logits);
        Ok(logits)
    }
}

fn require_file(dir: &Path, name: &str) -> Result<PathBuf, ModelLoadError> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ModelLoadError::MissingFile(path))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
