use thiserror::Error;

/// Result of a single (template, method) attempt.
pub type MatchOutcome<T> = Result<T, MatchError>;

/// Why a matching method produced no result. Never fatal: the engine logs
/// it and moves on to the next method or template.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    #[error("Template {template_width}x{template_height} is larger than frame {frame_width}x{frame_height}")]
    TemplateTooLarge {
        template_width: u32,
        template_height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("Template image is empty")]
    EmptyTemplate,

    #[error("Not enough descriptors (template={template}, frame={frame})")]
    InsufficientFeatures { template: usize, frame: usize },

    #[error("Only {found} correspondences survived filtering (need {required})")]
    TooFewCorrespondences { found: usize, required: usize },

    #[error("Could not estimate a homography from {correspondences} correspondences")]
    HomographyFailed { correspondences: usize },

    #[error("Histogram matching needs colour images")]
    UnsupportedColorSpace,

    #[error("Best score {score:.3} is below the method's acceptance level {required:.3}")]
    BelowAcceptance { score: f32, required: f32 },

    #[error("Correlation map holds no finite score")]
    NoCandidate,
}
