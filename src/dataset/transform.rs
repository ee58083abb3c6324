//! Resize and normalization applied to every image before inference

use std::path::Path;

use image::{imageops::FilterType, DynamicImage};
use ndarray::Array3;
use serde::Deserialize;

use super::errors::DatasetError;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Input resolution expected by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct InputSize {
    pub height: u32,
    pub width: u32,
}

impl InputSize {
    pub const DEFAULT: InputSize = InputSize {
        height: 256,
        width: 512,
    };

    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

impl std::fmt::Display for InputSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Converts an image into a normalized `(3, height, width)` tensor.
///
/// Images are read as RGB, resized to exactly the target size with bilinear
/// filtering, scaled to `[0, 1]`, then normalized per channel with the
/// ImageNet mean and standard deviation.
#[derive(Debug, Clone)]
pub struct ImageTransform {
    size: InputSize,
    mean: [f32; 3],
    std: [f32; 3],
}

impl ImageTransform {
    pub fn new(size: InputSize) -> Self {
        Self {
            size,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    pub fn size(&self) -> InputSize {
        self.size
    }

    /// Decode the image at `path` and transform it.
    pub fn load(&self, path: &Path) -> Result<Array3<f32>, DatasetError> {
        let img = image::open(path).map_err(|source| DatasetError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.apply(&img))
    }

    pub fn apply(&self, img: &DynamicImage) -> Array3<f32> {
        let InputSize { height, width } = self.size;
        let rgb = img.to_rgb8();
        let resized = image::imageops::resize(&rgb, width, height, FilterType::Triangle);

        let alpha: Vec<f32> = self.std.iter().map(|s| 1.0 / (255.0 * s)).collect();
        let beta: Vec<f32> = self.mean.iter().zip(&self.std).map(|(m, s)| -m / s).collect();

        let mut tensor = Array3::<f32>::zeros((3, height as usize, width as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[c, y as usize, x as usize]] = pixel[c] as f32 * alpha[c] + beta[c];
            }
        }
        tensor
    }
}
