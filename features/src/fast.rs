//! FAST-9/16 corner detection on a 16-point Bresenham circle.

use image::GrayImage;
use pano_core::{KeyPoint, KeyPoints};

const CIRCLE_OFFSETS: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// A pixel is a corner when at least 9 contiguous circle samples are all
/// brighter or all darker than the center by `threshold`. An axis-aligned
/// 90 degree corner leaves 11 of the 16 samples on the outside.
const MIN_ARC: u32 = 9;

/// Detect FAST corners, score them, suppress non-maxima in a 3x3
/// neighborhood, and keep the `max_keypoints` strongest.
pub fn fast_detect(image: &GrayImage, threshold: u8, max_keypoints: usize) -> KeyPoints {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width < 7 || height < 7 {
        return KeyPoints::new();
    }

    let mut scores = vec![0f32; (width * height) as usize];
    let mut candidates = Vec::new();

    for y in 3..height - 3 {
        for x in 3..width - 3 {
            if let Some(score) = corner_score(image, x, y, threshold) {
                scores[(y * width + x) as usize] = score;
                candidates.push((x, y));
            }
        }
    }

    let mut keypoints = Vec::new();
    for (x, y) in candidates {
        let s = scores[(y * width + x) as usize];
        let mut is_max = true;
        'nms: for dy in -1..=1i32 {
            for dx in -1..=1i32 {
                if (dx, dy) == (0, 0) {
                    continue;
                }
                let n = scores[((y + dy) * width + x + dx) as usize];
                if n > s || (n == s && (dy < 0 || (dy == 0 && dx < 0))) {
                    is_max = false;
                    break 'nms;
                }
            }
        }
        if is_max {
            keypoints.push(KeyPoint::new(x as f64, y as f64).with_response(s as f64));
        }
    }

    keypoints.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| (a.y, a.x).partial_cmp(&(b.y, b.x)).unwrap())
    });
    keypoints.truncate(max_keypoints);

    KeyPoints { keypoints }
}

/// Corner test plus score: the score is the summed absolute contrast of the
/// contiguous arc, so stronger corners survive non-max suppression.
fn corner_score(image: &GrayImage, x: i32, y: i32, threshold: u8) -> Option<f32> {
    let p = image.get_pixel(x as u32, y as u32)[0];
    let hi = p.saturating_add(threshold);
    let lo = p.saturating_sub(threshold);

    // -1 darker, 0 similar, 1 brighter, for each of the 16 circle samples.
    let mut states = [0i8; 16];
    let mut diffs = [0f32; 16];
    for (i, &(dx, dy)) in CIRCLE_OFFSETS.iter().enumerate() {
        let v = image.get_pixel((x + dx) as u32, (y + dy) as u32)[0];
        if v > hi {
            states[i] = 1;
        } else if v < lo {
            states[i] = -1;
        }
        diffs[i] = (v as f32 - p as f32).abs();
    }

    let mut best: f32 = 0.0;
    for &sign in &[1i8, -1i8] {
        // Walk the circle twice to catch arcs that wrap around.
        let mut run = 0u32;
        let mut run_sum = 0.0;
        for i in 0..32 {
            let j = i % 16;
            if states[j] == sign {
                run += 1;
                run_sum += diffs[j];
                if run >= MIN_ARC {
                    best = best.max(run_sum);
                }
                if run == 16 {
                    break;
                }
            } else {
                run = 0;
                run_sum = 0.0;
            }
        }
    }

    if best > 0.0 {
        Some(best)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn detects_square_corners() {
        let mut img = GrayImage::new(50, 50);
        for y in 10..40 {
            for x in 10..40 {
                img.put_pixel(x, y, Luma([255]));
            }
        }

        let kps = fast_detect(&img, 20, 1000);
        assert!(!kps.is_empty());

        let near_top_left = kps
            .iter()
            .any(|kp| (kp.x - 10.0).abs() <= 2.0 && (kp.y - 10.0).abs() <= 2.0);
        assert!(near_top_left);
    }

    #[test]
    fn detects_dark_square_on_bright_background() {
        let mut img = GrayImage::from_pixel(50, 50, Luma([255]));
        for y in 10..40 {
            for x in 10..40 {
                img.put_pixel(x, y, Luma([0]));
            }
        }

        let kps = fast_detect(&img, 20, 1000);
        let near_corner = kps
            .iter()
            .any(|kp| (kp.x - 10.0).abs() <= 2.0 && (kp.y - 10.0).abs() <= 2.0);
        assert!(near_corner, "{} keypoints, none near (10, 10)", kps.len());
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayImage::from_pixel(32, 32, Luma([128]));
        let kps = fast_detect(&img, 20, 1000);
        assert!(kps.is_empty());
    }

    #[test]
    fn tiny_image_is_empty_not_panic() {
        let img = GrayImage::new(4, 4);
        assert!(fast_detect(&img, 20, 100).is_empty());
    }
}
