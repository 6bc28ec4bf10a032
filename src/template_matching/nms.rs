//! Non-maximum suppression for multi-instance search

use super::types::Match;

/// Candidates overlapping an accepted box by more than this share of the
/// smaller box are dropped
pub const OVERLAP_LIMIT: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn intersection(&self, other: &BoundingBox) -> u64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        if right <= left || bottom <= top {
            return 0;
        }
        (right - left) as u64 * (bottom - top) as u64
    }

    /// Intersection divided by the area of the smaller of the two boxes
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f32 {
        let smaller = self.area().min(other.area());
        if smaller == 0 {
            return 0.0;
        }
        self.intersection(other) as f32 / smaller as f32
    }
}

/// Greedy suppression: highest confidence first (stable for ties), keep a
/// candidate only if it does not overlap any kept box beyond the limit.
pub fn suppress_overlapping(
    mut candidates: Vec<Match>,
    template_size: (u32, u32),
    max_results: usize,
) -> Vec<Match> {
    let (width, height) = template_size;
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Match> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_results {
            break;
        }
        let bbox = BoundingBox::new(candidate.x, candidate.y, width, height);
        let overlaps = kept.iter().any(|k| {
            BoundingBox::new(k.x, k.y, width, height).overlap_ratio(&bbox) > OVERLAP_LIMIT
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
