//! Common interface for the matching methods

use super::error::{MatchError, MatchOutcome};
use super::preprocess::{Preprocess, apply_chain};
use super::types::MatchMethod;
use image::{DynamicImage, GrayImage};

/// An image plus its (preprocessed) grayscale rendition, built once per
/// frame / template and shared by every method.
pub struct Prepared<'a> {
    pub image: &'a DynamicImage,
    pub gray: GrayImage,
}

impl<'a> Prepared<'a> {
    pub fn new(image: &'a DynamicImage, preprocess: &[Preprocess]) -> Self {
        Self {
            image,
            gray: apply_chain(image.to_luma8(), preprocess),
        }
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    pub fn has_color(&self) -> bool {
        self.image.color().has_color()
    }
}

/// Score and position produced by one method for one template
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Located {
    pub confidence: f32,
    pub location: (u32, u32),
}

pub trait MatchStrategy {
    fn method(&self) -> MatchMethod;

    fn locate(&self, frame: &Prepared<'_>, template: &Prepared<'_>) -> MatchOutcome<Located>;
}

/// Template must be non-empty and fit inside the frame
pub fn ensure_fits(frame_size: (u32, u32), template_size: (u32, u32)) -> MatchOutcome<()> {
    let (frame_width, frame_height) = frame_size;
    let (template_width, template_height) = template_size;

    if template_width == 0 || template_height == 0 {
        return Err(MatchError::EmptyTemplate);
    }
    if template_width > frame_width || template_height > frame_height {
        return Err(MatchError::TemplateTooLarge {
            template_width,
            template_height,
            frame_width,
            frame_height,
        });
    }
    Ok(())
}
