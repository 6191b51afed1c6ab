//! Geometric verification: robust homography estimation between image pairs.
//!
//! A homography is fit to the surviving correspondences with seeded RANSAC,
//! then refit by least squares over the inliers. A pair is accepted only when
//! the inlier count and inlier ratio clear their thresholds, guarding against
//! accidental geometric agreement between unrelated images.

use nalgebra::{DMatrix, Matrix3, Vector3};
use pano_core::{Error, KeyPoints, Matches, Ransac, Result, RobustConfig, RobustModel};

use crate::config::StitchConfig;

/// A pair of pixel locations asserting the same scene point in two images.
#[derive(Debug, Clone, Copy)]
pub struct Correspondence {
    pub src: (f64, f64),
    pub dst: (f64, f64),
}

/// A verified edge of the image graph: homography mapping image `a`
/// coordinates into image `b` coordinates, with its supporting inliers.
#[derive(Debug, Clone)]
pub struct PairwiseTransform {
    pub a: usize,
    pub b: usize,
    pub homography: Matrix3<f64>,
    pub num_inliers: usize,
    pub confidence: f64,
    pub inliers: Vec<Correspondence>,
}

pub struct HomographyEstimator;

impl RobustModel<Correspondence> for HomographyEstimator {
    type Model = Matrix3<f64>;

    fn min_sample_size(&self) -> usize {
        4
    }

    fn estimate(&self, data: &[&Correspondence]) -> Option<Matrix3<f64>> {
        fit_homography_refs(data)
    }

    fn compute_error(&self, model: &Matrix3<f64>, data: &Correspondence) -> f64 {
        let p = Vector3::new(data.src.0, data.src.1, 1.0);
        let q = model * p;
        if q[2].abs() > 1e-10 {
            let dx = q[0] / q[2] - data.dst.0;
            let dy = q[1] / q[2] - data.dst.1;
            (dx * dx + dy * dy).sqrt()
        } else {
            f64::INFINITY
        }
    }
}

/// Deterministic per-pair RNG seed so parallel execution over pairs cannot
/// change which model each pair converges to.
pub fn pair_seed(base: u64, a: usize, b: usize) -> u64 {
    let pair = ((a as u64) << 32) | (b as u64 & 0xFFFF_FFFF);
    base ^ pair.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Robustly verify one image pair.
///
/// Fewer than 4 correspondences cannot constrain a homography; that and a
/// below-threshold consensus are reported as pair-level errors which the
/// orchestrator records without aborting the pipeline.
pub fn verify_pair(
    a: usize,
    b: usize,
    matches: &Matches,
    kps_a: &KeyPoints,
    kps_b: &KeyPoints,
    config: &StitchConfig,
) -> Result<PairwiseTransform> {
    if matches.len() < 4 {
        return Err(Error::InsufficientOverlap {
            a,
            b,
            found: matches.len(),
        });
    }

    let data: Vec<Correspondence> = matches
        .iter()
        .map(|m| Correspondence {
            src: {
                let kp = &kps_a.keypoints[m.query_idx as usize];
                (kp.x, kp.y)
            },
            dst: {
                let kp = &kps_b.keypoints[m.train_idx as usize];
                (kp.x, kp.y)
            },
        })
        .collect();

    let ransac = Ransac::new(RobustConfig {
        threshold: config.ransac_threshold,
        max_iterations: config.ransac_iterations,
        confidence: config.ransac_confidence,
        seed: pair_seed(config.seed, a, b),
    });
    let result = ransac.run(&HomographyEstimator, &data);

    let Some(mut homography) = result.model else {
        return Err(Error::VerificationFailed { a, b });
    };

    let inlier_ratio = result.num_inliers as f64 / data.len() as f64;
    if result.num_inliers < config.min_inliers || inlier_ratio < config.min_inlier_ratio {
        return Err(Error::VerificationFailed { a, b });
    }

    let inliers: Vec<Correspondence> = data
        .iter()
        .zip(result.inliers.iter())
        .filter(|(_, &keep)| keep)
        .map(|(c, _)| *c)
        .collect();

    // Least-squares refit over all inliers tightens the minimal-sample model.
    if let Some(refit) = fit_homography(&inliers) {
        homography = refit;
    }

    let Some(homography) = normalize_homography(&homography) else {
        return Err(Error::VerificationFailed { a, b });
    };

    let confidence = result.num_inliers as f64 / (8.0 + 0.3 * data.len() as f64);
    if confidence < config.min_edge_confidence {
        return Err(Error::VerificationFailed { a, b });
    }

    Ok(PairwiseTransform {
        a,
        b,
        homography,
        num_inliers: result.num_inliers,
        confidence,
        inliers,
    })
}

/// Scale so the bottom-right entry is 1 and reject degenerate matrices that
/// cannot be inverted for warping or graph traversal.
pub fn normalize_homography(h: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    if h[(2, 2)].abs() < 1e-10 {
        return None;
    }
    let h = h / h[(2, 2)];
    let det = h.determinant();
    if !det.is_finite() || det.abs() < 1e-8 || det.abs() > 1e8 {
        return None;
    }
    h.try_inverse()?;
    Some(h)
}

/// Direct linear transform over owned correspondences.
pub fn fit_homography(corrs: &[Correspondence]) -> Option<Matrix3<f64>> {
    let refs: Vec<&Correspondence> = corrs.iter().collect();
    fit_homography_refs(&refs)
}

/// Normalized DLT: both point sets are translated to their centroid and
/// scaled to mean distance sqrt(2) before solving, which keeps the linear
/// system well conditioned for pixel-scale coordinates.
fn fit_homography_refs(corrs: &[&Correspondence]) -> Option<Matrix3<f64>> {
    let n = corrs.len();
    if n < 4 {
        return None;
    }

    let (t_src, src_norm) = normalize_points(corrs.iter().map(|c| c.src))?;
    let (t_dst, dst_norm) = normalize_points(corrs.iter().map(|c| c.dst))?;

    let mut a = vec![0.0f64; n * 2 * 9];
    for i in 0..n {
        let (x1, y1) = src_norm[i];
        let (x2, y2) = dst_norm[i];
        let r1 = i * 2;
        let r2 = i * 2 + 1;
        a[r1 * 9] = -x1;
        a[r1 * 9 + 1] = -y1;
        a[r1 * 9 + 2] = -1.0;
        a[r1 * 9 + 6] = x2 * x1;
        a[r1 * 9 + 7] = x2 * y1;
        a[r1 * 9 + 8] = x2;
        a[r2 * 9 + 3] = -x1;
        a[r2 * 9 + 4] = -y1;
        a[r2 * 9 + 5] = -1.0;
        a[r2 * 9 + 6] = y2 * x1;
        a[r2 * 9 + 7] = y2 * y1;
        a[r2 * 9 + 8] = y2;
    }

    let h_norm = solve_dlt(&a, n * 2)?;

    // Undo the normalization: H = T_dst^-1 * Hn * T_src.
    let h = t_dst.try_inverse()? * h_norm * t_src;
    if h.iter().all(|v| v.is_finite()) {
        Some(h)
    } else {
        None
    }
}

/// Similarity transform sending the points to centroid 0, mean norm sqrt(2),
/// plus the transformed points.
fn normalize_points(
    points: impl Iterator<Item = (f64, f64)> + Clone,
) -> Option<(Matrix3<f64>, Vec<(f64, f64)>)> {
    let pts: Vec<(f64, f64)> = points.collect();
    let n = pts.len() as f64;

    let cx = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.1).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-10 {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normed = pts.iter().map(|p| (s * (p.0 - cx), s * (p.1 - cy))).collect();
    Some((t, normed))
}

/// Null-space solve: the homography is the singular vector of the smallest
/// singular value of the stacked constraint matrix.
fn solve_dlt(a: &[f64], n_rows: usize) -> Option<Matrix3<f64>> {
    let matrix = if n_rows < 9 {
        let mut padded = vec![0.0f64; 9 * 9];
        padded[..n_rows * 9].copy_from_slice(a);
        DMatrix::from_row_slice(9, 9, &padded)
    } else {
        DMatrix::from_row_slice(n_rows, 9, a)
    };

    let svd = matrix.svd(false, true);
    let v_t = svd.v_t?;
    let h = v_t.row(8);

    Some(Matrix3::new(
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8],
    ))
}
