//! Compositing: merge warped images across seams into the final panorama.
//!
//! Multi-band blending runs a Laplacian pyramid per image and a Gaussian
//! pyramid per seam mask, merging each frequency band over a spatial extent
//! proportional to its wavelength. Feathering is the cheap single-band
//! alternative: weights fall off linearly over a fixed transition width.
//! Canvas pixels outside every footprint stay black.

use image::RgbImage;
use pano_core::{Error, Result};
use pano_imgproc::pyramid::{blur, collapse, expand, gaussian_pyramid, Plane};

use crate::align::WarpedImage;
use crate::config::BlendMode;

pub fn blend(
    warped: &[WarpedImage],
    seam_masks: &[image::GrayImage],
    width: u32,
    height: u32,
    mode: BlendMode,
) -> Result<RgbImage> {
    if warped.is_empty() || warped.len() != seam_masks.len() {
        return Err(Error::BlendFailure(format!(
            "{} warped images but {} seam masks",
            warped.len(),
            seam_masks.len()
        )));
    }
    if width == 0 || height == 0 {
        return Err(Error::BlendFailure(format!(
            "degenerate canvas {width}x{height}"
        )));
    }

    match mode {
        BlendMode::MultiBand { bands } => blend_multiband(warped, seam_masks, width, height, bands),
        BlendMode::Feather { width: band } => {
            blend_feather(warped, seam_masks, width, height, band)
        }
    }
}

fn blend_multiband(
    warped: &[WarpedImage],
    seam_masks: &[image::GrayImage],
    width: u32,
    height: u32,
    bands: usize,
) -> Result<RgbImage> {
    let w = width as usize;
    let h = height as usize;

    // Deep pyramids on a small canvas degenerate to 1x1 levels; cap by size.
    let max_levels = (w.min(h) as f64).log2().floor() as usize;
    let levels = bands.clamp(1, max_levels.max(1));

    let mut num: Option<Vec<[Plane; 3]>> = None;
    let mut den: Option<Vec<Plane>> = None;

    for (wi, seam) in warped.iter().zip(seam_masks.iter()) {
        // Slightly soften the binary seam mask so even the finest band has
        // a non-degenerate transition.
        let weight = blur(&mask_plane(seam, w, h));
        let weight_pyr = gaussian_pyramid(&weight, levels);

        // Content is zero-filled outside the footprint, which would bleed
        // darkness into coarse bands near the footprint edge. Dividing each
        // Gaussian level by the coverage mask's level (normalized
        // convolution) extends the content smoothly instead.
        let valid_pyr = gaussian_pyramid(&mask_plane(&wi.mask, w, h), levels);

        let channels = rgb_planes(&wi.image, w, h);
        let lap: Vec<[Plane; 3]> = {
            let l0 = normalized_laplacian(&channels[0], &valid_pyr, levels);
            let l1 = normalized_laplacian(&channels[1], &valid_pyr, levels);
            let l2 = normalized_laplacian(&channels[2], &valid_pyr, levels);
            l0.into_iter()
                .zip(l1)
                .zip(l2)
                .map(|((a, b), c)| [a, b, c])
                .collect()
        };

        let num = num.get_or_insert_with(|| {
            lap.iter()
                .map(|l| {
                    [
                        Plane::new(l[0].width, l[0].height),
                        Plane::new(l[0].width, l[0].height),
                        Plane::new(l[0].width, l[0].height),
                    ]
                })
                .collect()
        });
        let den = den.get_or_insert_with(|| {
            weight_pyr
                .iter()
                .map(|p| Plane::new(p.width, p.height))
                .collect()
        });

        for level in 0..levels.min(lap.len()) {
            let wp = &weight_pyr[level];
            for c in 0..3 {
                for ((n, l), g) in num[level][c]
                    .data
                    .iter_mut()
                    .zip(lap[level][c].data.iter())
                    .zip(wp.data.iter())
                {
                    *n += l * g;
                }
            }
            for (d, g) in den[level].data.iter_mut().zip(wp.data.iter()) {
                *d += g;
            }
        }
    }

    let num = num.ok_or_else(|| Error::BlendFailure("no images to blend".into()))?;
    let den = den.ok_or_else(|| Error::BlendFailure("no images to blend".into()))?;

    let mut merged: Vec<[Plane; 3]> = Vec::with_capacity(num.len());
    for (level, d) in num.into_iter().zip(den.iter()) {
        let mut out = level;
        for c in 0..3 {
            for (v, g) in out[c].data.iter_mut().zip(d.data.iter()) {
                if *g > 1e-6 {
                    *v /= g;
                } else {
                    *v = 0.0;
                }
            }
        }
        merged.push(out);
    }

    let r: Vec<Plane> = merged.iter().map(|l| l[0].clone()).collect();
    let g: Vec<Plane> = merged.iter().map(|l| l[1].clone()).collect();
    let b: Vec<Plane> = merged.iter().map(|l| l[2].clone()).collect();

    Ok(planes_to_rgb(
        &collapse(&r),
        &collapse(&g),
        &collapse(&b),
        warped,
        width,
        height,
    ))
}

fn blend_feather(
    warped: &[WarpedImage],
    seam_masks: &[image::GrayImage],
    width: u32,
    height: u32,
    band: u32,
) -> Result<RgbImage> {
    let w = width as usize;
    let h = height as usize;

    let mut num = [Plane::new(w, h), Plane::new(w, h), Plane::new(w, h)];
    let mut den = Plane::new(w, h);

    for (wi, seam) in warped.iter().zip(seam_masks.iter()) {
        let mut weight = mask_plane(seam, w, h);
        // Each blur pass spreads the transition by roughly a pixel; clamp
        // the pass count so wide bands stay affordable.
        for _ in 0..band.clamp(1, 16) {
            weight = blur(&weight);
        }
        // A weight must never reach outside its own footprint, where the
        // warped image holds background instead of scene content.
        for (v, m) in weight.data.iter_mut().zip(wi.mask.as_raw().iter()) {
            if *m == 0 {
                *v = 0.0;
            }
        }

        let channels = rgb_planes(&wi.image, w, h);
        for c in 0..3 {
            for ((n, p), g) in num[c]
                .data
                .iter_mut()
                .zip(channels[c].data.iter())
                .zip(weight.data.iter())
            {
                *n += p * g;
            }
        }
        for (d, g) in den.data.iter_mut().zip(weight.data.iter()) {
            *d += g;
        }
    }

    for c in 0..3 {
        for (v, g) in num[c].data.iter_mut().zip(den.data.iter()) {
            if *g > 1e-6 {
                *v /= g;
            } else {
                *v = 0.0;
            }
        }
    }

    Ok(planes_to_rgb(&num[0], &num[1], &num[2], warped, width, height))
}

/// Laplacian pyramid of one channel with the footprint divided out of every
/// Gaussian level first, so bands near the footprint edge reflect content,
/// not the zero fill.
fn normalized_laplacian(channel: &Plane, valid_pyr: &[Plane], levels: usize) -> Vec<Plane> {
    let mut gauss = gaussian_pyramid(channel, levels);
    for (g, v) in gauss.iter_mut().zip(valid_pyr.iter()) {
        for (gv, vv) in g.data.iter_mut().zip(v.data.iter()) {
            if *vv > 1e-3 {
                *gv /= vv;
            } else {
                *gv = 0.0;
            }
        }
    }

    // Uncovered pixels take the value the next coarser level expands to, so
    // the band below is exactly zero there. Without this the zeroed fine
    // levels ring against the extended coarse levels and darken the blend
    // wherever a neighbor's weight spills past its own footprint.
    for i in (0..gauss.len().saturating_sub(1)).rev() {
        let up = expand(&gauss[i + 1], gauss[i].width, gauss[i].height);
        for ((gv, vv), uv) in gauss[i]
            .data
            .iter_mut()
            .zip(valid_pyr[i].data.iter())
            .zip(up.data.iter())
        {
            if *vv <= 1e-3 {
                *gv = *uv;
            }
        }
    }

    let mut lap = Vec::with_capacity(gauss.len());
    for i in 0..gauss.len() {
        if i + 1 < gauss.len() {
            let up = expand(&gauss[i + 1], gauss[i].width, gauss[i].height);
            let mut band = gauss[i].clone();
            for (b, u) in band.data.iter_mut().zip(up.data.iter()) {
                *b -= u;
            }
            lap.push(band);
        } else {
            lap.push(gauss[i].clone());
        }
    }
    lap
}

fn mask_plane(mask: &image::GrayImage, w: usize, h: usize) -> Plane {
    let data = mask.as_raw().iter().map(|&m| if m != 0 { 1.0 } else { 0.0 }).collect();
    Plane::from_data(w, h, data)
}

fn rgb_planes(img: &RgbImage, w: usize, h: usize) -> [Plane; 3] {
    let mut r = Plane::new(w, h);
    let mut g = Plane::new(w, h);
    let mut b = Plane::new(w, h);
    for (i, px) in img.as_raw().chunks_exact(3).enumerate() {
        r.data[i] = px[0] as f32;
        g.data[i] = px[1] as f32;
        b.data[i] = px[2] as f32;
    }
    [r, g, b]
}

/// Quantize the blended planes, forcing uncovered pixels to the documented
/// black background.
fn planes_to_rgb(
    r: &Plane,
    g: &Plane,
    b: &Plane,
    warped: &[WarpedImage],
    width: u32,
    height: u32,
) -> RgbImage {
    let mut out = RgbImage::new(width, height);
    for (i, px) in out.as_mut().chunks_exact_mut(3).enumerate() {
        let x = (i % width as usize) as u32;
        let y = (i / width as usize) as u32;
        let covered = warped.iter().any(|w| w.mask.get_pixel(x, y)[0] != 0);
        if covered {
            px[0] = r.data[i].round().clamp(0.0, 255.0) as u8;
            px[1] = g.data[i].round().clamp(0.0, 255.0) as u8;
            px[2] = b.data[i].round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seam::find_seams;
    use image::{GrayImage, Luma, Rgb};

    fn warped_rect(
        index: usize,
        canvas: (u32, u32),
        rect: (u32, u32, u32, u32),
        color: [u8; 3],
    ) -> WarpedImage {
        let mut image = RgbImage::new(canvas.0, canvas.1);
        let mut mask = GrayImage::new(canvas.0, canvas.1);
        for y in rect.1..rect.3 {
            for x in rect.0..rect.2 {
                image.put_pixel(x, y, Rgb(color));
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        WarpedImage {
            index,
            image,
            mask,
            bounds: rect,
        }
    }

    fn overlapping_pair(canvas: (u32, u32), color: [u8; 3]) -> Vec<WarpedImage> {
        // Left two thirds and right two thirds, overlapping in the middle.
        vec![
            warped_rect(0, canvas, (0, 0, canvas.0 * 2 / 3, canvas.1), color),
            warped_rect(1, canvas, (canvas.0 / 3, 0, canvas.0, canvas.1), color),
        ]
    }

    #[test]
    fn uniform_images_blend_to_uniform_panorama() {
        let canvas = (64, 32);
        let warped = overlapping_pair(canvas, [120, 60, 30]);
        let masks = find_seams(&warped, canvas.0, canvas.1).unwrap();

        for mode in [
            BlendMode::MultiBand { bands: 4 },
            BlendMode::Feather { width: 4 },
        ] {
            let out = blend(&warped, &masks, canvas.0, canvas.1, mode).unwrap();
            for y in 0..canvas.1 {
                for x in 0..canvas.0 {
                    let p = out.get_pixel(x, y);
                    assert!((p[0] as i32 - 120).abs() <= 2, "{mode:?} ({x},{y}): {p:?}");
                    assert!((p[1] as i32 - 60).abs() <= 2);
                    assert!((p[2] as i32 - 30).abs() <= 2);
                }
            }
        }
    }

    #[test]
    fn uncovered_pixels_stay_black() {
        let canvas = (50, 20);
        // Footprints leave a gap at x >= 40.
        let warped = vec![warped_rect(0, canvas, (0, 0, 40, 20), [200, 200, 200])];
        let masks = find_seams(&warped, canvas.0, canvas.1).unwrap();

        let out = blend(
            &warped,
            &masks,
            canvas.0,
            canvas.1,
            BlendMode::Feather { width: 3 },
        )
        .unwrap();
        assert_eq!(out.get_pixel(45, 10), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(10, 10), &Rgb([200, 200, 200]));
    }

    #[test]
    fn mask_count_mismatch_is_blend_failure() {
        let canvas = (30, 20);
        let warped = overlapping_pair(canvas, [10, 10, 10]);
        let err = blend(
            &warped,
            &[],
            canvas.0,
            canvas.1,
            BlendMode::Feather { width: 2 },
        )
        .unwrap_err();
        assert!(matches!(err, Error::BlendFailure(_)));
    }

    #[test]
    fn empty_input_is_blend_failure() {
        let err = blend(&[], &[], 10, 10, BlendMode::MultiBand { bands: 3 }).unwrap_err();
        assert!(matches!(err, Error::BlendFailure(_)));
    }
}
