//! Optional grayscale clean-up applied before correlation and feature matching

use image::GrayImage;
use imageproc::contrast::{ThresholdType, equalize_histogram, otsu_level, threshold};
use imageproc::filter::{gaussian_blur_f32, sharpen3x3};
use serde::{Deserialize, Serialize};

const BLUR_SIGMA: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preprocess {
    /// Gaussian blur, suppresses capture noise
    Blur,
    /// Histogram equalization (normalize brightness)
    Equalize,
    /// 3x3 sharpening kernel
    Sharpen,
    /// Binarize at the Otsu level
    Threshold,
}

impl Preprocess {
    pub fn apply(&self, gray: &GrayImage) -> GrayImage {
        match self {
            Preprocess::Blur => gaussian_blur_f32(gray, BLUR_SIGMA),
            Preprocess::Equalize => equalize_histogram(gray),
            Preprocess::Sharpen => sharpen3x3(gray),
            Preprocess::Threshold => threshold(gray, otsu_level(gray), ThresholdType::Binary),
        }
    }
}

/// Run the chain in order. An empty chain returns a plain copy.
pub fn apply_chain(gray: GrayImage, chain: &[Preprocess]) -> GrayImage {
    chain.iter().fold(gray, |image, step| step.apply(&image))
}
