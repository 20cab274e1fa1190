//! Deterministic classifier used by the test suite and `--mock-model` runs.

use image::DynamicImage;

use super::{softmax, ClassificationError, ImageClassifier};

/// Scores each label from the image's mean channel statistics, so the
/// output is a valid probability distribution that is stable for a given
/// image but varies between visually different images. No model files
/// required.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockClassifier;

impl ImageClassifier for MockClassifier {
    fn classify(
        &self,
        image: &DynamicImage,
        labels: &[&str],
    ) -> Result<Vec<f32>, ClassificationError> {
        if labels.is_empty() {
            return Err(ClassificationError::EmptyLabels);
        }

        let rgb = image.to_rgb8();
        let pixel_count = (rgb.width() as u64 * rgb.height() as u64).max(1);
        let mut sums = [0u64; 3];
        for pixel in rgb.pixels() {
            sums[0] += pixel[0] as u64;
            sums[1] += pixel[1] as u64;
            sums[2] += pixel[2] as u64;
        }
        let means = [
            sums[0] as f32 / pixel_count as f32 / 255.0,
            sums[1] as f32 / pixel_count as f32 / 255.0,
            sums[2] as f32 / pixel_count as f32 / 255.0,
        ];

        // Rotate through the channel means so different labels get
        // different scores; the per-index offset keeps the distribution
        // tie-free for uniform images.
        let mut scores: Vec<f32> = (0..labels.len())
            .map(|i| means[i % 3] * 2.0 + i as f32 * 0.05)
            .collect();
        softmax(&mut scores);
        Ok(scores)
    }
}
