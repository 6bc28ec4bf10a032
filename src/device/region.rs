//! Screen rectangle polled for ability icons

use serde::{Deserialize, Serialize};

/// Rectangle in screen coordinates. Persisted as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct ScanRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScanRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Region centered on a point, clamped so it never starts left of or above the origin
    pub fn centered_on(center_x: u32, center_y: u32, width: u32, height: u32) -> Self {
        Self {
            x: center_x.saturating_sub(width / 2),
            y: center_y.saturating_sub(height / 2),
            width,
            height,
        }
    }

    /// Check if this region is valid (non-zero dimensions)
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Check if this region contains a point
    pub fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && (x as u64) < self.x as u64 + self.width as u64
            && y >= self.y
            && (y as u64) < self.y as u64 + self.height as u64
    }

    /// Clip region to screen boundaries
    pub fn clip_to_screen(mut self, screen_width: u32, screen_height: u32) -> Self {
        self.x = self.x.min(screen_width.saturating_sub(1));
        self.y = self.y.min(screen_height.saturating_sub(1));
        self.width = self.width.min(screen_width.saturating_sub(self.x));
        self.height = self.height.min(screen_height.saturating_sub(self.y));
        self
    }
}

impl From<[u32; 4]> for ScanRegion {
    fn from([x, y, width, height]: [u32; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<ScanRegion> for [u32; 4] {
    fn from(region: ScanRegion) -> Self {
        [region.x, region.y, region.width, region.height]
    }
}

impl std::fmt::Display for ScanRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{},{},{},{}]",
            self.x, self.y, self.width, self.height
        )
    }
}
