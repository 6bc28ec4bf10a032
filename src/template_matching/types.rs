/// Template matching data types
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Matching strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Normalized cross-correlation on grayscale pixels
    Template,
    /// Gradient-histogram descriptors with a nearest/second-nearest ratio test
    Sift,
    /// Binary descriptors with cross-checked hamming matching
    Orb,
    /// Hue/saturation histogram correlation over a sliding window
    Histogram,
}

impl MatchMethod {
    pub const ALL: [MatchMethod; 4] = [
        MatchMethod::Template,
        MatchMethod::Sift,
        MatchMethod::Orb,
        MatchMethod::Histogram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Template => "template",
            MatchMethod::Sift => "sift",
            MatchMethod::Orb => "orb",
            MatchMethod::Histogram => "histogram",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "template" => Ok(MatchMethod::Template),
            "sift" => Ok(MatchMethod::Sift),
            "orb" => Ok(MatchMethod::Orb),
            "histogram" => Ok(MatchMethod::Histogram),
            other => Err(format!("unknown match method '{other}'")),
        }
    }
}

/// Best candidate for one template under one method
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchResult {
    /// Template name
    pub name: String,
    /// Method-dependent score, roughly 0.0-1.0
    pub confidence: f32,
    /// Top-left corner in frame coordinates
    pub location: (u32, u32),
    pub method: MatchMethod,
}

/// A single location from a multi-match search
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Match {
    /// X coordinate in the search image
    pub x: u32,
    /// Y coordinate in the search image
    pub y: u32,
    /// Correlation score (0.0-1.0)
    pub confidence: f32,
}

/// Answer to "is this one icon on screen?"
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IconMatch {
    pub is_match: bool,
    pub confidence: f32,
    pub location: Option<(u32, u32)>,
}

impl IconMatch {
    pub fn none() -> Self {
        Self {
            is_match: false,
            confidence: 0.0,
            location: None,
        }
    }
}

/// Counters kept across `find_best_match` calls
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub template_matches: u64,
    pub sift_matches: u64,
    pub orb_matches: u64,
    pub histogram_matches: u64,
    pub failed_matches: u64,
    pub total_calls: u64,
}

impl MatchStats {
    pub fn record_win(&mut self, method: MatchMethod) {
        match method {
            MatchMethod::Template => self.template_matches += 1,
            MatchMethod::Sift => self.sift_matches += 1,
            MatchMethod::Orb => self.orb_matches += 1,
            MatchMethod::Histogram => self.histogram_matches += 1,
        }
    }
}
