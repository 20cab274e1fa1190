//! Image preprocessing for the CLIP visual encoder.
//!
//! Reproduces the HuggingFace CLIP image processor pipeline: resize the
//! shortest side to the model resolution with bicubic interpolation,
//! center crop, scale to [0, 1], then normalize per channel.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{s, Array3, Array4, Axis};

/// CLIP normalization mean values.
pub const CLIP_MEAN: [f64; 3] = [0.48145466, 0.4578275, 0.40821073];

/// CLIP normalization std values.
pub const CLIP_STD: [f64; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Input resolution of the ViT-B/32 visual encoder.
pub const CLIP_IMAGE_SIZE: u32 = 224;

/// Convert image to tensor [C, H, W] normalized to [0, 1].
pub fn to_tensor(image: &DynamicImage) -> Array3<f32> {
    let rgb = image.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    let mut arr = Array3::<f32>::zeros((3, h, w));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        arr[[0, y, x]] = pixel[0] as f32 / 255.0;
        arr[[1, y, x]] = pixel[1] as f32 / 255.0;
        arr[[2, y, x]] = pixel[2] as f32 / 255.0;
    }
    arr
}

/// Normalize tensor per channel: (x - mean) / std.
pub fn normalize(tensor: &mut Array3<f32>, mean: &[f64; 3], std: &[f64; 3]) {
    for c in 0..3 {
        let mean_c = mean[c] as f32;
        let std_c = std[c] as f32;
        tensor
            .slice_mut(s![c, .., ..])
            .mapv_inplace(|v| (v - mean_c) / std_c);
    }
}

/// Resize so the shortest side equals `target`, preserving aspect ratio.
pub fn resize_shortest_side(image: &DynamicImage, target: u32, filter: FilterType) -> DynamicImage {
    let (w, h) = image.dimensions();
    let short = w.min(h).max(1);
    let scale = target as f64 / short as f64;
    let new_w = ((w as f64 * scale).round() as u32).max(target);
    let new_h = ((h as f64 * scale).round() as u32).max(target);
    image.resize_exact(new_w, new_h, filter)
}

/// Center crop image to specified dimensions.
///
/// If the crop size is larger than the image, the image is returned unchanged.
pub fn center_crop(image: &DynamicImage, crop_w: u32, crop_h: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if crop_w >= w && crop_h >= h {
        return image.clone();
    }
    let left = (w.saturating_sub(crop_w)) / 2;
    let top = (h.saturating_sub(crop_h)) / 2;
    image.crop_imm(left, top, crop_w.min(w), crop_h.min(h))
}

/// Full CLIP preprocessing: resize, crop, scale, normalize, add batch axis.
/// Output shape is [1, 3, 224, 224].
pub fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let resized = resize_shortest_side(image, CLIP_IMAGE_SIZE, FilterType::CatmullRom);
    let cropped = center_crop(&resized, CLIP_IMAGE_SIZE, CLIP_IMAGE_SIZE);
    let mut tensor = to_tensor(&cropped);
    normalize(&mut tensor, &CLIP_MEAN, &CLIP_STD);
    tensor.insert_axis(Axis(0))
}
