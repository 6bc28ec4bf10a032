//! Hue/saturation histogram comparison
//!
//! Useful for icons whose shape changes (cooldown sweeps, glow) while the
//! colours stay put. Windows the size of the template are slid over the
//! frame with a quarter-size stride and compared by Pearson correlation.

use super::error::{MatchError, MatchOutcome};
use super::strategy::{Located, MatchStrategy, Prepared, ensure_fits};
use super::types::MatchMethod;
use image::RgbImage;

const HUE_BINS: usize = 50;
const SATURATION_BINS: usize = 60;
const HUE_RANGE: f32 = 180.0;
const SATURATION_RANGE: f32 = 256.0;
/// Windows scoring at or below this are not reported
const ACCEPTANCE: f32 = 0.7;

type Histogram = Vec<f32>;

#[derive(Debug, Default, Clone, Copy)]
pub struct HistogramMatcher;

impl HistogramMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl MatchStrategy for HistogramMatcher {
    fn method(&self) -> MatchMethod {
        MatchMethod::Histogram
    }

    fn locate(&self, frame: &Prepared<'_>, template: &Prepared<'_>) -> MatchOutcome<Located> {
        if !frame.has_color() || !template.has_color() {
            return Err(MatchError::UnsupportedColorSpace);
        }

        let frame_rgb = frame.image.to_rgb8();
        let template_rgb = template.image.to_rgb8();
        ensure_fits(frame_rgb.dimensions(), template_rgb.dimensions())?;

        let (w, h) = template_rgb.dimensions();
        let template_hist = normalized(hs_histogram(&bin_indices(&template_rgb), w, 0, 0, w, h));

        let (frame_w, frame_h) = frame_rgb.dimensions();
        let frame_bins = bin_indices(&frame_rgb);
        let stride = (w.min(h) / 4).max(1) as usize;

        let mut best: Option<Located> = None;
        for y in (0..=frame_h - h).step_by(stride) {
            for x in (0..=frame_w - w).step_by(stride) {
                let window = normalized(hs_histogram(&frame_bins, frame_w, x, y, w, h));
                let score = correlation(&template_hist, &window);
                if best.is_none_or(|b| score > b.confidence) {
                    best = Some(Located {
                        confidence: score,
                        location: (x, y),
                    });
                }
            }
        }

        let best = best.ok_or(MatchError::NoCandidate)?;
        if best.confidence > ACCEPTANCE {
            Ok(best)
        } else {
            Err(MatchError::BelowAcceptance {
                score: best.confidence,
                required: ACCEPTANCE,
            })
        }
    }
}

/// Hue in [0, 180) and saturation in [0, 255], 8-bit HSV convention
fn hue_saturation(r: u8, g: u8, b: u8) -> (f32, f32) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    if delta == 0.0 {
        return (0.0, saturation);
    }

    let mut hue = if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }
    (hue / 2.0, saturation)
}

/// Flat (hue, saturation) bin index for every pixel, row-major
fn bin_indices(rgb: &RgbImage) -> Vec<usize> {
    rgb.pixels()
        .map(|p| {
            let (hue, saturation) = hue_saturation(p[0], p[1], p[2]);
            let h_bin = ((hue / HUE_RANGE * HUE_BINS as f32) as usize).min(HUE_BINS - 1);
            let s_bin = ((saturation / SATURATION_RANGE * SATURATION_BINS as f32) as usize)
                .min(SATURATION_BINS - 1);
            h_bin * SATURATION_BINS + s_bin
        })
        .collect()
}

fn hs_histogram(bins: &[usize], stride: u32, x: u32, y: u32, w: u32, h: u32) -> Histogram {
    let mut hist = vec![0f32; HUE_BINS * SATURATION_BINS];
    for row in y..y + h {
        let start = (row * stride + x) as usize;
        for &bin in &bins[start..start + w as usize] {
            hist[bin] += 1.0;
        }
    }
    hist
}

/// Min-max scale to [0, 1]
fn normalized(mut hist: Histogram) -> Histogram {
    let min = hist.iter().copied().fold(f32::INFINITY, f32::min);
    let max = hist.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range > 0.0 {
        for v in hist.iter_mut() {
            *v = (*v - min) / range;
        }
    } else {
        hist.iter_mut().for_each(|v| *v = 0.0);
    }
    hist
}

/// Pearson correlation. Two constant histograms compare as 1.0.
fn correlation(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0f64, 0f64, 0f64);
    for (&x, &y) in a.iter().zip(b) {
        let da = x as f64 - mean_a;
        let db = y as f64 - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = var_a * var_b;
    if denom.abs() > f64::EPSILON {
        (cov / denom.sqrt()) as f32
    } else {
        1.0
    }
}
