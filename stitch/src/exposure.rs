//! Exposure compensation: per-image multiplicative gains.
//!
//! Auto-exposure differences between captures leave visible brightness steps
//! at seams. For every overlapping pair the mean luma of each side is
//! measured, then one gain per image is solved jointly so overlapping sides
//! agree, with a prior pulling gains toward 1. Estimation failure is never a
//! pipeline failure: the fallback is no correction.

use image::RgbImage;
use nalgebra::{DMatrix, DVector};

use crate::align::WarpedImage;

/// Overlaps smaller than this give unreliable statistics and are skipped.
const MIN_OVERLAP_PIXELS: usize = 64;

/// Weight of the unit-gain prior relative to the pairwise terms.
const PRIOR_WEIGHT: f64 = 0.05;

const GAIN_MIN: f64 = 0.3;
const GAIN_MAX: f64 = 3.0;

/// Mean-intensity statistics of one overlapping pair, in warped list order.
struct OverlapStats {
    i: usize,
    j: usize,
    pixels: usize,
    mean_i: f64,
    mean_j: f64,
}

/// Solve one gain per warped image; `warped[k]` gets `gains[k]`.
pub fn estimate_gains(warped: &[WarpedImage]) -> Vec<f64> {
    let n = warped.len();
    let mut stats = Vec::new();

    for i in 0..n {
        for j in i + 1..n {
            if let Some(s) = overlap_stats(&warped[i], &warped[j], i, j) {
                stats.push(s);
            }
        }
    }
    if stats.is_empty() {
        return vec![1.0; n];
    }

    // Normal equations for
    //   sum_pairs N (g_i I_i - g_j I_j)^2 + w sum_i N_i (g_i - 1)^2.
    let mut a = DMatrix::<f64>::zeros(n, n);
    let mut b = DVector::<f64>::zeros(n);

    // Every image gets a unit-gain anchor, including images with no usable
    // overlap statistics; an all-zero row would make the solve singular.
    let anchor = PRIOR_WEIGHT * 255.0 * 255.0;
    for i in 0..n {
        a[(i, i)] += anchor;
        b[i] += anchor;
    }

    for s in &stats {
        let w = s.pixels as f64;
        a[(s.i, s.i)] += w * s.mean_i * s.mean_i;
        a[(s.j, s.j)] += w * s.mean_j * s.mean_j;
        a[(s.i, s.j)] -= w * s.mean_i * s.mean_j;
        a[(s.j, s.i)] -= w * s.mean_i * s.mean_j;

        let prior = PRIOR_WEIGHT * w * 255.0 * 255.0;
        a[(s.i, s.i)] += prior;
        a[(s.j, s.j)] += prior;
        b[s.i] += prior;
        b[s.j] += prior;
    }

    match a.lu().solve(&b) {
        Some(g) if g.iter().all(|v| v.is_finite()) => {
            g.iter().map(|&v| v.clamp(GAIN_MIN, GAIN_MAX)).collect()
        }
        _ => vec![1.0; n],
    }
}

fn overlap_stats(a: &WarpedImage, b: &WarpedImage, i: usize, j: usize) -> Option<OverlapStats> {
    let x0 = a.bounds.0.max(b.bounds.0);
    let y0 = a.bounds.1.max(b.bounds.1);
    let x1 = a.bounds.2.min(b.bounds.2);
    let y1 = a.bounds.3.min(b.bounds.3);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }

    let mut pixels = 0usize;
    let mut sum_a = 0.0f64;
    let mut sum_b = 0.0f64;
    for y in y0..y1 {
        for x in x0..x1 {
            if a.mask.get_pixel(x, y)[0] != 0 && b.mask.get_pixel(x, y)[0] != 0 {
                pixels += 1;
                sum_a += luma(&a.image, x, y);
                sum_b += luma(&b.image, x, y);
            }
        }
    }

    if pixels < MIN_OVERLAP_PIXELS {
        return None;
    }
    Some(OverlapStats {
        i,
        j,
        pixels,
        mean_i: sum_a / pixels as f64,
        mean_j: sum_b / pixels as f64,
    })
}

fn luma(img: &RgbImage, x: u32, y: u32) -> f64 {
    let p = img.get_pixel(x, y);
    0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64
}

/// Scale every covered pixel; uncovered pixels stay at the background value.
pub fn apply_gain(warped: &mut WarpedImage, gain: f64) {
    if (gain - 1.0).abs() < 1e-6 {
        return;
    }
    for (x, y, p) in warped.image.enumerate_pixels_mut() {
        if warped.mask.get_pixel(x, y)[0] != 0 {
            for c in 0..3 {
                p[c] = (p[c] as f64 * gain).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb};

    fn warped(index: usize, value: u8, x_offset: u32, w: u32, h: u32, canvas: (u32, u32)) -> WarpedImage {
        let mut image = RgbImage::new(canvas.0, canvas.1);
        let mut mask = GrayImage::new(canvas.0, canvas.1);
        for y in 0..h {
            for x in x_offset..x_offset + w {
                image.put_pixel(x, y, Rgb([value, value, value]));
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }
        WarpedImage {
            index,
            image,
            mask,
            bounds: (x_offset, 0, x_offset + w, h),
        }
    }

    #[test]
    fn gains_pull_bright_and_dark_sides_together() {
        // 60 px overlap where one side reads 100 and the other 140.
        let a = warped(0, 100, 0, 100, 40, (160, 40));
        let b = warped(1, 140, 40, 100, 40, (160, 40));

        let gains = estimate_gains(&[a, b]);
        assert!(gains[0] > 1.0, "dark side must be amplified: {gains:?}");
        assert!(gains[1] < 1.0, "bright side must be attenuated: {gains:?}");

        let corrected_a = 100.0 * gains[0];
        let corrected_b = 140.0 * gains[1];
        assert!((corrected_a - corrected_b).abs() < 10.0);
    }

    #[test]
    fn no_overlap_means_unit_gains() {
        let a = warped(0, 100, 0, 30, 40, (100, 40));
        let b = warped(1, 200, 60, 30, 40, (100, 40));
        assert_eq!(estimate_gains(&[a, b]), vec![1.0, 1.0]);
    }

    #[test]
    fn tiny_overlap_falls_back_to_unit_gains() {
        // 4x4 = 16 overlap pixels, below the minimum.
        let a = warped(0, 90, 0, 40, 4, (80, 4));
        let b = warped(1, 180, 36, 40, 4, (80, 4));
        assert_eq!(estimate_gains(&[a, b]), vec![1.0, 1.0]);
    }

    #[test]
    fn image_without_overlap_statistics_keeps_unit_gain() {
        // 0 and 1 overlap; 2 is included but touches neither, so it must not
        // poison the solve and must come back with gain 1.
        let a = warped(0, 100, 0, 100, 40, (300, 40));
        let b = warped(1, 140, 40, 100, 40, (300, 40));
        let c = warped(2, 200, 200, 80, 40, (300, 40));

        let gains = estimate_gains(&[a, b, c]);
        assert!((gains[2] - 1.0).abs() < 1e-6, "{gains:?}");
        assert!(gains[0] > 1.0, "{gains:?}");
        assert!(gains[1] < 1.0, "{gains:?}");
    }

    #[test]
    fn apply_gain_scales_only_covered_pixels() {
        let mut w = warped(0, 100, 10, 20, 10, (40, 10));
        apply_gain(&mut w, 1.5);
        assert_eq!(w.image.get_pixel(15, 5), &Rgb([150, 150, 150]));
        assert_eq!(w.image.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
