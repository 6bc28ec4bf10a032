/// Template matching module for spotting icons in captured frames
///
/// Four interchangeable methods sit behind `MatchStrategy`:
/// - `template`: normalized cross-correlation, fast path for static icons
/// - `sift` / `orb`: keypoint descriptors + RANSAC homography
/// - `histogram`: hue/saturation colour histograms
///
/// `MatchEngine` runs any subset of them and keeps the best candidate.
pub mod correlation;
pub mod error;
pub mod features;
pub mod histogram;
pub mod matcher;
pub mod nms;
pub mod preprocess;
pub mod strategy;
pub mod types;


pub use correlation::TemplateMatcher;
pub use error::{MatchError, MatchOutcome};
pub use features::FeatureMatcher;
pub use histogram::HistogramMatcher;
pub use matcher::MatchEngine;
pub use nms::{BoundingBox, suppress_overlapping};
pub use preprocess::Preprocess;
pub use strategy::{Located, MatchStrategy, Prepared};
pub use types::{IconMatch, Match, MatchMethod, MatchResult, MatchStats};
