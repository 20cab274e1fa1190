//! Zero-shot image classification against a fixed category set.
//!
//! The classifier is used as a zero-shot ranker: every call scores the
//! image against all labels jointly and softmaxes the similarity scores,
//! so the output is a calibrated-within-batch distribution rather than
//! independent per-label scores.

pub mod clip;
pub mod mock;
pub mod transforms;

pub use clip::ClipClassifier;
pub use mock::MockClassifier;

use image::DynamicImage;
use thiserror::Error;

/// The fixed label set, in scoring order. The order is part of the system
/// contract: it determines which column of the probability vector maps to
/// which category and must not change across the service's lifetime.
pub const LABELS: [&str; 5] = ["Human", "Animal", "Food", "Document", "Landscape"];

/// Errors raised while classifying a decoded image.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("label set must not be empty")]
    EmptyLabels,

    #[error("failed to tokenize labels: {0}")]
    Tokenize(String),

    #[error("model invocation failed: {0}")]
    Inference(#[from] ort::Error),

    #[error("unexpected model output: {0}")]
    BadOutput(String),
}

/// A pure function from (image, ordered labels) to a probability vector of
/// the same length and order. Implementations hold only read-only state
/// loaded once at startup and are shared across requests without locking.
pub trait ImageClassifier: Send + Sync {
    fn classify(
        &self,
        image: &DynamicImage,
        labels: &[&str],
    ) -> Result<Vec<f32>, ClassificationError>;
}

/// One of the five fixed categories an upload can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Human,
    Animal,
    Food,
    Document,
    Landscape,
}

impl Category {
    /// Map a label index back to its category. Index i corresponds to
    /// `LABELS[i]`.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Human),
            1 => Some(Self::Animal),
            2 => Some(Self::Food),
            3 => Some(Self::Document),
            4 => Some(Self::Landscape),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "Human",
            Self::Animal => "Animal",
            Self::Food => "Food",
            Self::Document => "Document",
            Self::Landscape => "Landscape",
        }
    }
}

/// Index of the maximum entry. Ties resolve to the lowest index (first
/// label in the fixed order wins).
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Numerically stable in-place softmax.
pub fn softmax(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn argmax_picks_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.9, 0.05, 0.05]), 0);
    }

    #[test]
    fn argmax_ties_resolve_to_lowest_index() {
        assert_eq!(argmax(&[0.25, 0.25, 0.25, 0.25]), 0);
        assert_eq!(argmax(&[0.1, 0.45, 0.45]), 1);
    }

    #[test]
    fn softmax_is_a_distribution() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        softmax(&mut values);
        assert!((values.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(values.iter().all(|&p| (0.0..=1.0).contains(&p)));
        // Ordering of inputs is preserved in outputs
        assert_eq!(argmax(&values), 4);
    }

    #[test]
    fn softmax_handles_large_logits() {
        let mut values = vec![1000.0, 1001.0];
        softmax(&mut values);
        assert!(values.iter().all(|p| p.is_finite()));
        assert!((values.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn category_round_trips_through_labels() {
        for (i, label) in LABELS.iter().enumerate() {
            let category = Category::from_index(i).unwrap();
            assert_eq!(category.as_str(), *label);
        }
        assert_eq!(Category::from_index(5), None);
    }

    #[test]
    fn mock_classifier_returns_distribution() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 0])));
        let classifier = MockClassifier::default();
        let probs = classifier.classify(&image, &LABELS).unwrap();
        assert_eq!(probs.len(), LABELS.len());
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn mock_classifier_is_deterministic() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([10, 200, 30])));
        let classifier = MockClassifier::default();
        let first = classifier.classify(&image, &LABELS).unwrap();
        let second = classifier.classify(&image, &LABELS).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mock_classifier_rejects_empty_labels() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])));
        let classifier = MockClassifier::default();
        assert!(matches!(
            classifier.classify(&image, &[]),
            Err(ClassificationError::EmptyLabels)
        ));
    }
}
