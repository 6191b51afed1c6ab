//! Inverse-mapped perspective warping.

use image::{GrayImage, RgbImage};
use nalgebra::Matrix3;
use rayon::prelude::*;

/// Apply a homography to a point, with projective division.
pub fn transform_point(m: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let w = m[(2, 0)] * x + m[(2, 1)] * y + m[(2, 2)];
    let px = m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)];
    let py = m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)];
    if w.abs() > 1e-10 {
        (px / w, py / w)
    } else {
        (px, py)
    }
}

/// The four image corners mapped through a homography, for canvas sizing.
pub fn project_corners(m: &Matrix3<f64>, width: u32, height: u32) -> [(f64, f64); 4] {
    let w = width as f64;
    let h = height as f64;
    [
        transform_point(m, 0.0, 0.0),
        transform_point(m, w, 0.0),
        transform_point(m, 0.0, h),
        transform_point(m, w, h),
    ]
}

/// Warp a color image onto a destination grid of `width` x `height`.
///
/// `map` transforms destination coordinates into source coordinates
/// (inverse mapping); sampling is bilinear. Returns the warped image and a
/// coverage mask that is 255 exactly where the source footprint landed.
/// Uncovered destination pixels are black.
pub fn warp_perspective_rgb(
    src: &RgbImage,
    map: &Matrix3<f64>,
    width: u32,
    height: u32,
) -> (RgbImage, GrayImage) {
    let mut rgb_data = vec![0u8; (width * height * 3) as usize];
    let mut mask_data = vec![0u8; (width * height) as usize];

    rgb_data
        .par_chunks_mut(width as usize * 3)
        .zip(mask_data.par_chunks_mut(width as usize))
        .enumerate()
        .for_each(|(y, (rgb_row, mask_row))| {
            for x in 0..width as usize {
                let (sx, sy) = transform_point(map, x as f64, y as f64);
                if let Some(px) = sample_bilinear_rgb(src, sx, sy) {
                    rgb_row[x * 3] = px[0];
                    rgb_row[x * 3 + 1] = px[1];
                    rgb_row[x * 3 + 2] = px[2];
                    mask_row[x] = 255;
                }
            }
        });

    (
        RgbImage::from_raw(width, height, rgb_data).expect("buffer sized to dimensions"),
        GrayImage::from_raw(width, height, mask_data).expect("buffer sized to dimensions"),
    )
}

/// Bilinear sample, `None` outside the source rectangle.
pub fn sample_bilinear_rgb(img: &RgbImage, x: f64, y: f64) -> Option<[u8; 3]> {
    let w = img.width() as i64;
    let h = img.height() as i64;
    if x < 0.0 || y < 0.0 || x > (w - 1) as f64 || y > (h - 1) as f64 {
        return None;
    }

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = img.get_pixel(x0 as u32, y0 as u32);
    let p10 = img.get_pixel(x1 as u32, y0 as u32);
    let p01 = img.get_pixel(x0 as u32, y1 as u32);
    let p11 = img.get_pixel(x1 as u32, y1 as u32);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let v0 = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let v1 = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (v0 * (1.0 - fy) + v1 * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn identity_warp_preserves_pixels_and_covers_all() {
        let mut img = RgbImage::new(8, 6);
        img.put_pixel(3, 2, Rgb([200, 10, 30]));

        let (out, mask) = warp_perspective_rgb(&img, &Matrix3::identity(), 8, 6);
        assert_eq!(out.get_pixel(3, 2), &Rgb([200, 10, 30]));
        assert!(mask.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn translation_moves_footprint() {
        let img = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        // dst(x, y) samples src(x - 6, y), so only x >= 6 is covered.
        let map = Matrix3::new(1.0, 0.0, -6.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        let (out, mask) = warp_perspective_rgb(&img, &map, 12, 4);

        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(7, 1)[0], 255);
        assert_eq!(out.get_pixel(7, 1), &Rgb([100, 100, 100]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn corners_project_through_translation() {
        let m = Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, -2.0, 0.0, 0.0, 1.0);
        let corners = project_corners(&m, 10, 8);
        assert_eq!(corners[0], (5.0, -2.0));
        assert_eq!(corners[3], (15.0, 6.0));
    }
}
