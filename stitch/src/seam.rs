//! Seam finding: per-pixel ownership of the canvas.
//!
//! Every canvas pixel covered by at least one warped image must end up owned
//! by exactly one of them. Overlaps are resolved by a minimum-cost path
//! through the squared color difference, so the cut routes through regions
//! where the images agree instead of slicing through moving objects or
//! parallax ghosts.

use image::GrayImage;
use pano_core::{Error, Result};

use crate::align::WarpedImage;

/// Cost assigned to pixels outside the true overlap so the seam stays where
/// both images have data.
const OFF_OVERLAP_COST: f32 = 1e9;

/// Resolve ownership over the whole canvas.
///
/// Images are folded in one at a time in list order; each newcomer splits
/// every contested region with the current owner along a seam, then claims
/// all still-unowned pixels of its footprint. Returns one mask per warped
/// image; the masks partition the union footprint exactly.
pub fn find_seams(
    warped: &[WarpedImage],
    width: u32,
    height: u32,
) -> Result<Vec<GrayImage>> {
    let w = width as usize;
    let mut owner = vec![-1i32; w * height as usize];

    for k in 0..warped.len() {
        let wk = &warped[k];
        let (x0, y0, x1, y1) = wk.bounds;

        // Contested bounding box per current owner.
        let mut contested: Vec<Option<(u32, u32, u32, u32)>> = vec![None; k];
        for y in y0..y1 {
            for x in x0..x1 {
                if wk.mask.get_pixel(x, y)[0] == 0 {
                    continue;
                }
                let o = owner[y as usize * w + x as usize];
                if o >= 0 {
                    let r = &mut contested[o as usize];
                    *r = Some(match *r {
                        None => (x, y, x + 1, y + 1),
                        Some((bx0, by0, bx1, by1)) => {
                            (bx0.min(x), by0.min(y), bx1.max(x + 1), by1.max(y + 1))
                        }
                    });
                }
            }
        }

        for j in 0..k {
            if let Some(bbox) = contested[j] {
                carve_seam(&mut owner, w, warped, j, k, bbox);
            }
        }

        for y in y0..y1 {
            for x in x0..x1 {
                let idx = y as usize * w + x as usize;
                if wk.mask.get_pixel(x, y)[0] != 0 && owner[idx] < 0 {
                    owner[idx] = k as i32;
                }
            }
        }
    }

    // Coverage invariant: no covered pixel may be left unassigned.
    for (idx, &o) in owner.iter().enumerate() {
        if o >= 0 {
            continue;
        }
        let x = (idx % w) as u32;
        let y = (idx / w) as u32;
        if warped.iter().any(|wi| wi.mask.get_pixel(x, y)[0] != 0) {
            return Err(Error::BlendFailure(format!(
                "seam stage left covered pixel ({x}, {y}) unowned"
            )));
        }
    }

    let masks = (0..warped.len())
        .map(|k| {
            let mut mask = GrayImage::new(width, height);
            for (idx, &o) in owner.iter().enumerate() {
                if o == k as i32 {
                    mask.as_mut()[idx] = 255;
                }
            }
            mask
        })
        .collect();

    Ok(masks)
}

/// Split one contested region between owner `j` and newcomer `k` along a
/// minimum-cost seam, oriented across the dominant adjacency axis.
fn carve_seam(
    owner: &mut [i32],
    w: usize,
    warped: &[WarpedImage],
    j: usize,
    k: usize,
    bbox: (u32, u32, u32, u32),
) {
    let cj = footprint_center(&warped[j]);
    let ck = footprint_center(&warped[k]);
    let horizontal_adjacency = (cj.0 - ck.0).abs() >= (cj.1 - ck.1).abs();

    let (x0, y0, x1, y1) = bbox;
    let bw = (x1 - x0) as usize;
    let bh = (y1 - y0) as usize;
    if bw == 0 || bh == 0 {
        return;
    }

    // Snapshot the contested region up front; `owner` is written below.
    let mut disputed = vec![false; bw * bh];
    for y in y0..y1 {
        for x in x0..x1 {
            disputed[(y - y0) as usize * bw + (x - x0) as usize] =
                owner[y as usize * w + x as usize] == j as i32
                    && warped[k].mask.get_pixel(x, y)[0] != 0;
        }
    }
    let contested =
        |x: u32, y: u32| -> bool { disputed[(y - y0) as usize * bw + (x - x0) as usize] };

    let cost_at = |x: u32, y: u32| -> f32 {
        if contested(x, y) {
            pixel_diff(&warped[j], &warped[k], x, y)
        } else {
            OFF_OVERLAP_COST
        }
    };

    if horizontal_adjacency {
        // One seam column per row; smaller-center image keeps the left side.
        let path = min_cost_path(bh, bw, |row, col| cost_at(x0 + col as u32, y0 + row as u32));
        let (left, right) = if cj.0 <= ck.0 { (j, k) } else { (k, j) };
        for y in y0..y1 {
            let seam_x = x0 + path[(y - y0) as usize] as u32;
            for x in x0..x1 {
                if contested(x, y) {
                    let side = if x < seam_x { left } else { right };
                    owner[y as usize * w + x as usize] = side as i32;
                }
            }
        }
    } else {
        // One seam row per column; smaller-center image keeps the top side.
        let path = min_cost_path(bw, bh, |col, row| cost_at(x0 + col as u32, y0 + row as u32));
        let (top, bottom) = if cj.1 <= ck.1 { (j, k) } else { (k, j) };
        for x in x0..x1 {
            let seam_y = y0 + path[(x - x0) as usize] as u32;
            for y in y0..y1 {
                if contested(x, y) {
                    let side = if y < seam_y { top } else { bottom };
                    owner[y as usize * w + x as usize] = side as i32;
                }
            }
        }
    }
}

fn footprint_center(w: &WarpedImage) -> (f64, f64) {
    let (x0, y0, x1, y1) = w.bounds;
    ((x0 + x1) as f64 / 2.0, (y0 + y1) as f64 / 2.0)
}

fn pixel_diff(a: &WarpedImage, b: &WarpedImage, x: u32, y: u32) -> f32 {
    let pa = a.image.get_pixel(x, y);
    let pb = b.image.get_pixel(x, y);
    (0..3)
        .map(|c| {
            let d = pa[c] as f32 - pb[c] as f32;
            d * d
        })
        .sum()
}

/// Dynamic program over a `steps x lanes` grid: one lane index per step,
/// transitions limited to adjacent lanes. Returns the chosen lane per step.
fn min_cost_path(steps: usize, lanes: usize, cost: impl Fn(usize, usize) -> f32) -> Vec<usize> {
    let mut dp = vec![0.0f32; lanes];
    let mut back = vec![0u32; steps * lanes];

    for lane in 0..lanes {
        dp[lane] = cost(0, lane);
    }

    for step in 1..steps {
        let prev = dp.clone();
        for lane in 0..lanes {
            let mut best_lane = lane;
            let mut best = prev[lane];
            if lane > 0 && prev[lane - 1] < best {
                best = prev[lane - 1];
                best_lane = lane - 1;
            }
            if lane + 1 < lanes && prev[lane + 1] < best {
                best = prev[lane + 1];
                best_lane = lane + 1;
            }
            dp[lane] = cost(step, lane) + best;
            back[step * lanes + lane] = best_lane as u32;
        }
    }

    let mut lane = (0..lanes)
        .min_by(|&a, &b| dp[a].partial_cmp(&dp[b]).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or(0);

    let mut path = vec![0usize; steps];
    for step in (0..steps).rev() {
        path[step] = lane;
        if step > 0 {
            lane = back[step * lanes + lane] as usize;
        }
    }
    path
}
