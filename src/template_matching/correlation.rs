/// Zero-mean normalized cross-correlation matching
///
/// Fast path for static UI icons: slide the grayscale template over the
/// grayscale frame and take the correlation peak. Both sides are centered
/// on their mean, so a featureless window scores 0 instead of matching
/// every template of similar brightness.
use super::error::{MatchError, MatchOutcome};
use super::strategy::{Located, MatchStrategy, Prepared, ensure_fits};
use super::types::{Match, MatchMethod};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};

pub type CorrelationMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Below this the template is treated as flat
const MIN_TEMPLATE_ENERGY: f64 = 1e-6;

#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateMatcher;

impl TemplateMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Correlation coefficient in `[-1, 1]` for every placement of
    /// `template` inside `frame`. The map is `(W - w + 1) x (H - h + 1)`.
    /// A flat template or a flat window scores 0.
    pub fn correlation_map(&self, frame: &GrayImage, template: &GrayImage) -> MatchOutcome<CorrelationMap> {
        ensure_fits(frame.dimensions(), template.dimensions())?;
        let (frame_w, frame_h) = frame.dimensions();
        let (w, h) = template.dimensions();
        let area = u64::from(w) * u64::from(h);

        let mean = template.pixels().map(|p| f64::from(p[0])).sum::<f64>() / area as f64;
        let centered: Vec<f64> = template.pixels().map(|p| f64::from(p[0]) - mean).collect();
        let template_energy: f64 = centered.iter().map(|v| v * v).sum();
        if template_energy < MIN_TEMPLATE_ENERGY {
            log::debug!("Template is flat, correlation is undefined");
            return Ok(CorrelationMap::new(frame_w - w + 1, frame_h - h + 1));
        }

        let sums = integral_image::<_, u64>(frame);
        let squares = integral_squared_image::<_, u64>(frame);
        let pixels = frame.as_raw();

        Ok(CorrelationMap::from_fn(frame_w - w + 1, frame_h - h + 1, |x, y| {
            let (right, bottom) = (x + w - 1, y + h - 1);
            let sum = u128::from(sum_image_pixels(&sums, x, y, right, bottom)[0]);
            let sum_sq = u128::from(sum_image_pixels(&squares, x, y, right, bottom)[0]);
            // n * sum(I^2) - sum(I)^2, exact in integers
            let spread = u128::from(area) * sum_sq - sum * sum;
            if spread == 0 {
                return Luma([0.0]);
            }
            let window_energy = spread as f64 / area as f64;

            // The template is zero-mean, so the window mean cancels out
            let mut cross = 0.0;
            for ty in 0..h {
                let row = ((y + ty) * frame_w + x) as usize;
                let template_row = &centered[(ty * w) as usize..((ty + 1) * w) as usize];
                for (value, weight) in pixels[row..row + w as usize].iter().zip(template_row) {
                    cross += f64::from(*value) * weight;
                }
            }

            let score = cross / (template_energy * window_energy).sqrt();
            Luma([score.clamp(-1.0, 1.0) as f32])
        }))
    }

    /// Every placement scoring strictly above `threshold`, in scan order
    /// (row-major)
    pub fn candidates_above(
        &self,
        frame: &GrayImage,
        template: &GrayImage,
        threshold: f32,
    ) -> MatchOutcome<Vec<Match>> {
        let map = self.correlation_map(frame, template)?;
        Ok(map
            .enumerate_pixels()
            .filter(|(_, _, pixel)| pixel[0].is_finite() && pixel[0] > threshold)
            .map(|(x, y, pixel)| Match {
                x,
                y,
                confidence: pixel[0],
            })
            .collect())
    }
}

impl MatchStrategy for TemplateMatcher {
    fn method(&self) -> MatchMethod {
        MatchMethod::Template
    }

    fn locate(&self, frame: &Prepared<'_>, template: &Prepared<'_>) -> MatchOutcome<Located> {
        let map = self.correlation_map(&frame.gray, &template.gray)?;

        // Find the peak; the first maximum in scan order wins ties
        let mut best: Option<Located> = None;
        for (x, y, pixel) in map.enumerate_pixels() {
            let score = pixel[0];
            if !score.is_finite() {
                continue;
            }
            if best.is_none_or(|b| score > b.confidence) {
                best = Some(Located {
                    confidence: score,
                    location: (x, y),
                });
            }
        }

        best.ok_or(MatchError::NoCandidate)
    }
}
