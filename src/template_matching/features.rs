//! Keypoint-based matching for icons that shift or scale slightly
//!
//! Both flavours detect FAST corners, describe the patch around each
//! corner, pair template descriptors with frame descriptors, then fit a
//! homography with RANSAC to place the template's top-left corner.
//!
//! - `sift`: 128-float gradient-orientation descriptors, accepted when the
//!   nearest frame descriptor is closer than 0.75x the second nearest.
//! - `orb`: 256-bit BRIEF descriptors, cross-checked nearest neighbours by
//!   hamming distance, best 75% kept.
//!
//! Confidence is `accepted correspondences / template descriptors`.

use super::error::{MatchError, MatchOutcome};
use super::strategy::{Located, MatchStrategy, Prepared};
use super::types::MatchMethod;
use image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::Projection;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FAST_THRESHOLD: u8 = 20;
const MAX_KEYPOINTS: usize = 500;
/// Half-size of the described patch; corners closer than this to an edge are dropped
const PATCH_RADIUS: u32 = 8;
const GRID_CELLS: usize = 4;
const ORIENTATION_BINS: usize = 8;
const FLOAT_DESCRIPTOR_LEN: usize = GRID_CELLS * GRID_CELLS * ORIENTATION_BINS;
const DESCRIPTOR_CLAMP: f32 = 0.2;
const BRIEF_WORDS: usize = 4;
const BRIEF_SIGMA: f32 = 2.0;
const RATIO_TEST: f32 = 0.75;
const HAMMING_KEEP_FRACTION: f32 = 0.75;
const MIN_DESCRIPTORS: usize = 2;
const MIN_CORRESPONDENCES: usize = 4;
const RANSAC_ITERATIONS: usize = 200;
const RANSAC_REPROJECTION_THRESHOLD: f32 = 5.0;
const SEED: u64 = 0x0005_eed5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Keypoint {
    x: u32,
    y: u32,
}

type BriefDescriptor = [u64; BRIEF_WORDS];
type TestPair = ((i32, i32), (i32, i32));

#[derive(Debug, Clone, Copy)]
struct Correspondence {
    template_idx: usize,
    frame_idx: usize,
    distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavour {
    Gradient,
    Binary,
}

pub struct FeatureMatcher {
    flavour: Flavour,
    test_pairs: Vec<TestPair>,
}

impl FeatureMatcher {
    /// Scale-invariant-style float descriptors with ratio test
    pub fn sift() -> Self {
        Self {
            flavour: Flavour::Gradient,
            test_pairs: Vec::new(),
        }
    }

    /// Binary descriptors with hamming distance
    pub fn orb() -> Self {
        Self {
            flavour: Flavour::Binary,
            test_pairs: brief_test_pairs(),
        }
    }

    fn correspondences(
        &self,
        frame: &GrayImage,
        template: &GrayImage,
    ) -> MatchOutcome<(Vec<Correspondence>, Vec<Keypoint>, Vec<Keypoint>)> {
        match self.flavour {
            Flavour::Gradient => {
                let (template_kps, template_desc) = gradient_descriptors(template);
                let (frame_kps, frame_desc) = gradient_descriptors(frame);
                ensure_descriptors(template_desc.len(), frame_desc.len())?;
                Ok((
                    ratio_test_matches(&template_desc, &frame_desc),
                    template_kps,
                    frame_kps,
                ))
            }
            Flavour::Binary => {
                let (template_kps, template_desc) = self.brief_descriptors(template);
                let (frame_kps, frame_desc) = self.brief_descriptors(frame);
                ensure_descriptors(template_desc.len(), frame_desc.len())?;
                Ok((
                    cross_checked_hamming_matches(&template_desc, &frame_desc),
                    template_kps,
                    frame_kps,
                ))
            }
        }
    }

    fn brief_descriptors(&self, gray: &GrayImage) -> (Vec<Keypoint>, Vec<BriefDescriptor>) {
        let keypoints = detect_keypoints(gray);
        if keypoints.is_empty() {
            return (keypoints, Vec::new());
        }
        let smoothed = gaussian_blur_f32(gray, BRIEF_SIGMA);
        let descriptors = keypoints
            .iter()
            .map(|kp| {
                let mut bits = [0u64; BRIEF_WORDS];
                for (i, ((ax, ay), (bx, by))) in self.test_pairs.iter().enumerate() {
                    let a = sample(&smoothed, kp, *ax, *ay);
                    let b = sample(&smoothed, kp, *bx, *by);
                    if a < b {
                        bits[i / 64] |= 1 << (i % 64);
                    }
                }
                bits
            })
            .collect();
        (keypoints, descriptors)
    }
}

impl MatchStrategy for FeatureMatcher {
    fn method(&self) -> MatchMethod {
        match self.flavour {
            Flavour::Gradient => MatchMethod::Sift,
            Flavour::Binary => MatchMethod::Orb,
        }
    }

    fn locate(&self, frame: &Prepared<'_>, template: &Prepared<'_>) -> MatchOutcome<Located> {
        let (good, template_kps, frame_kps) = self.correspondences(&frame.gray, &template.gray)?;

        if good.len() < MIN_CORRESPONDENCES {
            return Err(MatchError::TooFewCorrespondences {
                found: good.len(),
                required: MIN_CORRESPONDENCES,
            });
        }

        let src: Vec<(f32, f32)> = good
            .iter()
            .map(|c| point(template_kps[c.template_idx]))
            .collect();
        let dst: Vec<(f32, f32)> = good.iter().map(|c| point(frame_kps[c.frame_idx])).collect();

        let projection = estimate_homography(&src, &dst).ok_or(MatchError::HomographyFailed {
            correspondences: good.len(),
        })?;

        let (left, top) = projection * (0.0, 0.0);
        if !left.is_finite() || !top.is_finite() {
            return Err(MatchError::HomographyFailed {
                correspondences: good.len(),
            });
        }
        let max_x = frame.width().saturating_sub(1) as f32;
        let max_y = frame.height().saturating_sub(1) as f32;
        let location = (
            left.round().clamp(0.0, max_x) as u32,
            top.round().clamp(0.0, max_y) as u32,
        );

        let confidence = good.len() as f32 / template_kps.len().max(1) as f32;
        Ok(Located {
            confidence,
            location,
        })
    }
}

fn ensure_descriptors(template: usize, frame: usize) -> MatchOutcome<()> {
    if template < MIN_DESCRIPTORS || frame < MIN_DESCRIPTORS {
        return Err(MatchError::InsufficientFeatures { template, frame });
    }
    Ok(())
}

fn point(kp: Keypoint) -> (f32, f32) {
    (kp.x as f32, kp.y as f32)
}

/// FAST-9 corners far enough from the border to describe, strongest first
fn detect_keypoints(gray: &GrayImage) -> Vec<Keypoint> {
    let (width, height) = gray.dimensions();
    if width <= 2 * PATCH_RADIUS || height <= 2 * PATCH_RADIUS {
        return Vec::new();
    }

    let mut corners = corners_fast9(gray, FAST_THRESHOLD);
    corners.retain(|c| {
        c.x >= PATCH_RADIUS
            && c.y >= PATCH_RADIUS
            && c.x < width - PATCH_RADIUS
            && c.y < height - PATCH_RADIUS
    });
    corners.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| (a.y, a.x).cmp(&(b.y, b.x)))
    });
    corners.truncate(MAX_KEYPOINTS);
    corners
        .into_iter()
        .map(|c| Keypoint { x: c.x, y: c.y })
        .collect()
}

fn sample(image: &GrayImage, kp: &Keypoint, dx: i32, dy: i32) -> u8 {
    let x = (kp.x as i32 + dx) as u32;
    let y = (kp.y as i32 + dy) as u32;
    image.get_pixel(x, y)[0]
}

/// Fixed pseudo-random offsets inside the patch, identical for every call
fn brief_test_pairs() -> Vec<TestPair> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let r = PATCH_RADIUS as i32 - 1;
    (0..BRIEF_WORDS * 64)
        .map(|_| {
            (
                (rng.gen_range(-r..=r), rng.gen_range(-r..=r)),
                (rng.gen_range(-r..=r), rng.gen_range(-r..=r)),
            )
        })
        .collect()
}

/// 4x4 grid of 8-bin gradient orientation histograms over a 16x16 patch
fn gradient_descriptors(gray: &GrayImage) -> (Vec<Keypoint>, Vec<Vec<f32>>) {
    let keypoints = detect_keypoints(gray);
    if keypoints.is_empty() {
        return (keypoints, Vec::new());
    }

    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let cell = (2 * PATCH_RADIUS) as usize / GRID_CELLS;

    let mut kept = Vec::with_capacity(keypoints.len());
    let mut descriptors = Vec::with_capacity(keypoints.len());

    for kp in keypoints {
        let mut desc = vec![0f32; FLOAT_DESCRIPTOR_LEN];
        for py in 0..2 * PATCH_RADIUS {
            for px in 0..2 * PATCH_RADIUS {
                let x = kp.x + px - PATCH_RADIUS;
                let y = kp.y + py - PATCH_RADIUS;
                let dx = gx.get_pixel(x, y)[0] as f32;
                let dy = gy.get_pixel(x, y)[0] as f32;
                let magnitude = (dx * dx + dy * dy).sqrt();
                if magnitude == 0.0 {
                    continue;
                }
                let angle = dy.atan2(dx) + std::f32::consts::PI;
                let bin = ((angle / std::f32::consts::TAU * ORIENTATION_BINS as f32) as usize)
                    % ORIENTATION_BINS;
                let cell_idx = (py as usize / cell) * GRID_CELLS + px as usize / cell;
                desc[cell_idx * ORIENTATION_BINS + bin] += magnitude;
            }
        }

        if normalize_descriptor(&mut desc) {
            kept.push(kp);
            descriptors.push(desc);
        }
    }

    (kept, descriptors)
}

/// L2 normalize, clamp large components, renormalize. False for flat patches.
fn normalize_descriptor(desc: &mut [f32]) -> bool {
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return false;
    }
    for v in desc.iter_mut() {
        *v = (*v / norm).min(DESCRIPTOR_CLAMP);
    }
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
    for v in desc.iter_mut() {
        *v /= norm;
    }
    true
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn hamming_distance(a: &BriefDescriptor, b: &BriefDescriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

fn ratio_test_matches(template: &[Vec<f32>], frame: &[Vec<f32>]) -> Vec<Correspondence> {
    let mut good = Vec::new();
    for (template_idx, t) in template.iter().enumerate() {
        let mut nearest: Option<(usize, f32)> = None;
        let mut second = f32::INFINITY;
        for (frame_idx, f) in frame.iter().enumerate() {
            let d = l2_distance(t, f);
            match nearest {
                Some((_, best)) if d >= best => second = second.min(d),
                Some((_, best)) => {
                    second = best;
                    nearest = Some((frame_idx, d));
                }
                None => nearest = Some((frame_idx, d)),
            }
        }
        match nearest {
            Some((frame_idx, distance)) if distance < RATIO_TEST * second => {
                good.push(Correspondence {
                    template_idx,
                    frame_idx,
                    distance,
                });
            }
            _ => {}
        }
    }
    good
}

fn nearest_hamming(query: &BriefDescriptor, candidates: &[BriefDescriptor]) -> Option<(usize, u32)> {
    candidates
        .iter()
        .enumerate()
        .map(|(idx, c)| (idx, hamming_distance(query, c)))
        .min_by_key(|&(idx, d)| (d, idx))
}

fn cross_checked_hamming_matches(
    template: &[BriefDescriptor],
    frame: &[BriefDescriptor],
) -> Vec<Correspondence> {
    let mut matches: Vec<Correspondence> = template
        .iter()
        .enumerate()
        .filter_map(|(template_idx, t)| {
            let (frame_idx, distance) = nearest_hamming(t, frame)?;
            let (back, _) = nearest_hamming(&frame[frame_idx], template)?;
            (back == template_idx).then_some(Correspondence {
                template_idx,
                frame_idx,
                distance: distance as f32,
            })
        })
        .collect();

    // Stable sort keeps template order among equal distances
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    let keep = (matches.len() as f32 * HAMMING_KEEP_FRACTION) as usize;
    matches.truncate(keep);
    matches
}

/// RANSAC over 4-point samples. Deterministic: the sampler is seeded.
fn estimate_homography(src: &[(f32, f32)], dst: &[(f32, f32)]) -> Option<Projection> {
    if src.len() < MIN_CORRESPONDENCES || src.len() != dst.len() {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(SEED);
    let iterations = if src.len() == MIN_CORRESPONDENCES {
        1
    } else {
        RANSAC_ITERATIONS
    };

    let mut best: Option<(usize, Projection)> = None;
    for _ in 0..iterations {
        let picked = rand::seq::index::sample(&mut rng, src.len(), MIN_CORRESPONDENCES);
        let from = [
            src[picked.index(0)],
            src[picked.index(1)],
            src[picked.index(2)],
            src[picked.index(3)],
        ];
        let to = [
            dst[picked.index(0)],
            dst[picked.index(1)],
            dst[picked.index(2)],
            dst[picked.index(3)],
        ];

        let Some(projection) = Projection::from_control_points(from, to) else {
            continue;
        };

        let inliers = src
            .iter()
            .zip(dst)
            .filter(|&(&s, &d)| {
                let (x, y) = projection * s;
                ((x - d.0).powi(2) + (y - d.1).powi(2)).sqrt() < RANSAC_REPROJECTION_THRESHOLD
            })
            .count();

        if best.as_ref().is_none_or(|(count, _)| inliers > *count) {
            best = Some((inliers, projection));
        }
    }

    best.filter(|(count, _)| *count >= MIN_CORRESPONDENCES)
        .map(|(_, projection)| projection)
}
