// Types and enums for the detection loop
use crate::template_matching::MatchResult;
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Stopped => "stopped",
            RunState::Running => "running",
            RunState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Notifications for whoever drives the loop; at most one of each per tick
#[derive(Debug, Clone)]
pub enum DetectionEvent {
    StatusChanged(String),
    IconDetected { name: String, confidence: f32 },
    FrameCaptured(Arc<DynamicImage>),
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No scan area in the current snapshot
    NoScanArea,
    CaptureFailed,
    /// Nothing scored above the threshold after smoothing
    NoMatch,
    /// A match qualified but the last press was too recent
    CoolingDown(MatchResult),
    /// A match qualified but its template has no key
    Unbound(MatchResult),
    DispatchFailed(MatchResult),
    Triggered { result: MatchResult, key: String },
}

impl TickOutcome {
    pub fn is_triggered(&self) -> bool {
        matches!(self, TickOutcome::Triggered { .. })
    }
}
