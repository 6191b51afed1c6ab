//! Oriented multi-scale keypoint detection with binary descriptors.
//!
//! FAST corners are detected over an image pyramid for scale invariance,
//! oriented by the patch intensity centroid for rotation invariance, and
//! described by a steered BRIEF test pattern. The pattern is generated once
//! from a fixed seed so descriptors from different images are comparable.

use std::sync::OnceLock;

use image::GrayImage;
use pano_core::{Error, KeyPoint, KeyPoints, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::descriptor::{Descriptor, Descriptors};
use crate::fast::fast_detect;

/// Descriptor patch side length; also the footprint of the orientation
/// centroid. Keypoints too close to the border for a full patch are dropped.
const PATCH_SIZE: i32 = 31;

/// 256 comparisons = 32 descriptor bytes.
const NUM_PATTERN_PAIRS: usize = 256;

/// The BRIEF pattern must be identical for every image in a run and across
/// runs, otherwise descriptors are not comparable.
const PATTERN_SEED: u64 = 0x5EED_B41F;

static BRIEF_PATTERN: OnceLock<Vec<(f32, f32, f32, f32)>> = OnceLock::new();

fn brief_pattern() -> &'static [(f32, f32, f32, f32)] {
    BRIEF_PATTERN.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let half = PATCH_SIZE as f32 / 2.0;
        (0..NUM_PATTERN_PAIRS)
            .map(|_| {
                (
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                    rng.gen_range(-half..half),
                )
            })
            .collect()
    })
}

/// Scale/rotation-invariant feature extractor.
///
/// Pure function of the image: no state is carried between calls, so
/// extraction may run per image in parallel.
pub struct Extractor {
    max_features: usize,
    n_levels: usize,
    scale_factor: f32,
    fast_threshold: u8,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            max_features: 1500,
            n_levels: 4,
            scale_factor: 1.3,
            fast_threshold: 20,
        }
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = n;
        self
    }

    pub fn with_n_levels(mut self, n: usize) -> Self {
        self.n_levels = n.max(1);
        self
    }

    pub fn with_scale_factor(mut self, factor: f32) -> Self {
        self.scale_factor = factor;
        self
    }

    pub fn with_fast_threshold(mut self, threshold: u8) -> Self {
        self.fast_threshold = threshold;
        self
    }

    /// Detect keypoints and compute their descriptors, 1:1 aligned.
    ///
    /// Fails only on degenerate input; an image with too little texture
    /// yields an empty set, which downstream treats as "no overlap".
    pub fn detect_and_describe(&self, image: &GrayImage) -> Result<(KeyPoints, Descriptors)> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::InvalidImage {
                index: 0,
                reason: format!("zero-size image {}x{}", image.width(), image.height()),
            });
        }

        let mut keypoints = self.detect(image);
        compute_orientations(image, &mut keypoints);

        let pattern = brief_pattern();
        let mut kept = KeyPoints::with_capacity(keypoints.len());
        let mut descriptors = Descriptors::with_capacity(keypoints.len());
        for kp in keypoints.iter() {
            if let Some(desc) = steered_brief(image, kp, pattern) {
                kept.push(*kp);
                descriptors.push(desc);
            }
        }

        Ok((kept, descriptors))
    }

    /// FAST over the pyramid, coordinates mapped back to full resolution,
    /// strongest responses kept.
    fn detect(&self, image: &GrayImage) -> KeyPoints {
        let mut all = Vec::new();
        let mut scale = 1.0f32;

        for level in 0..self.n_levels {
            let level_img;
            let img = if level == 0 {
                image
            } else {
                let w = (image.width() as f32 / scale).round() as u32;
                let h = (image.height() as f32 / scale).round() as u32;
                if w < 7 || h < 7 {
                    break;
                }
                level_img = image::imageops::resize(
                    image,
                    w,
                    h,
                    image::imageops::FilterType::Triangle,
                );
                &level_img
            };

            let kps = fast_detect(img, self.fast_threshold, self.max_features * 2);
            for kp in kps.iter() {
                all.push(
                    KeyPoint::new(kp.x * scale as f64, kp.y * scale as f64)
                        .with_size(PATCH_SIZE as f64 * scale as f64)
                        .with_response(kp.response)
                        .with_octave(level as i32),
                );
            }

            scale *= self.scale_factor;
        }

        all.sort_by(|a, b| {
            b.response
                .partial_cmp(&a.response)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all.truncate(self.max_features);

        KeyPoints { keypoints: all }
    }
}

/// Intensity-centroid orientation: the angle from the patch center to its
/// center of mass, in degrees.
fn compute_orientations(image: &GrayImage, keypoints: &mut KeyPoints) {
    let half_patch = PATCH_SIZE / 2;
    let width = image.width() as i32;
    let height = image.height() as i32;

    for kp in &mut keypoints.keypoints {
        let cx = kp.x as i32;
        let cy = kp.y as i32;

        let mut m01 = 0.0f64;
        let mut m10 = 0.0f64;
        for dy in -half_patch..=half_patch {
            for dx in -half_patch..=half_patch {
                let px = cx + dx;
                let py = cy + dy;
                if px >= 0 && px < width && py >= 0 && py < height {
                    let v = image.get_pixel(px as u32, py as u32)[0] as f64;
                    m01 += v * dy as f64;
                    m10 += v * dx as f64;
                }
            }
        }

        kp.angle = m01.atan2(m10).to_degrees();
    }
}

/// BRIEF with the test pattern rotated by the keypoint orientation.
/// `None` when the patch does not fit inside the image.
fn steered_brief(
    image: &GrayImage,
    kp: &KeyPoint,
    pattern: &[(f32, f32, f32, f32)],
) -> Option<Descriptor> {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let cx = kp.x as i32;
    let cy = kp.y as i32;

    let half_patch = PATCH_SIZE / 2 + 1;
    if cx < half_patch || cx >= width - half_patch || cy < half_patch || cy >= height - half_patch {
        return None;
    }

    let angle = kp.angle.to_radians();
    let cos_a = angle.cos() as f32;
    let sin_a = angle.sin() as f32;

    let mut bits = vec![0u8; NUM_PATTERN_PAIRS / 8];
    for (i, &(x1, y1, x2, y2)) in pattern.iter().enumerate() {
        let rx1 = cos_a * x1 - sin_a * y1;
        let ry1 = sin_a * x1 + cos_a * y1;
        let rx2 = cos_a * x2 - sin_a * y2;
        let ry2 = sin_a * x2 + cos_a * y2;

        let p1 = sample_clamped(image, cx as f32 + rx1, cy as f32 + ry1);
        let p2 = sample_clamped(image, cx as f32 + rx2, cy as f32 + ry2);

        if p1 < p2 {
            bits[i / 8] |= 1 << (7 - (i % 8));
        }
    }

    Some(Descriptor::new(bits, *kp))
}

fn sample_clamped(image: &GrayImage, x: f32, y: f32) -> u8 {
    let xi = (x.round() as i64).clamp(0, image.width() as i64 - 1) as u32;
    let yi = (y.round() as i64).clamp(0, image.height() as i64 - 1) as u32;
    image.get_pixel(xi, yi)[0]
}
