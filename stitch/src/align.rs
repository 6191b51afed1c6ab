//! Global alignment: one transform per image into panorama coordinates.
//!
//! Pairwise homographies are composed along the graph's most confident paths
//! to the reference image. When the graph has redundant edges, an optional
//! refinement pass refits each image's global transform against all of its
//! neighbors jointly, trading a little work for less accumulated chain error.

use image::{GrayImage, RgbImage};
use nalgebra::Matrix3;
use pano_core::{Error, Result};
use pano_imgproc::{project_corners, transform_point, warp_perspective_rgb};
use rayon::prelude::*;

use crate::graph::GraphSelection;
use crate::homography::{fit_homography, normalize_homography, Correspondence};

/// Compose pairwise transforms into per-image global transforms.
///
/// The reference image gets the identity; every other component image gets
/// the composition along its shortest path. Exactly one transform per
/// included image, `None` for excluded ones.
pub fn global_transforms(
    selection: &GraphSelection,
    refine_sweeps: usize,
) -> Result<Vec<Option<Matrix3<f64>>>> {
    let graph = &selection.graph;
    let mut transforms: Vec<Option<Matrix3<f64>>> = vec![None; graph.num_images];
    transforms[selection.reference] = Some(Matrix3::identity());

    let pred = graph.shortest_path_tree(selection.reference);

    // Resolve nodes whose predecessor is already resolved until the whole
    // component is covered; the tree guarantees progress.
    let mut remaining: Vec<usize> = selection
        .component
        .iter()
        .copied()
        .filter(|&i| i != selection.reference)
        .collect();
    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|&u| {
            let Some((p, ei)) = pred[u] else {
                return true;
            };
            let Some(parent) = transforms[p] else {
                return true;
            };
            let edge = &graph.edges[ei];
            // Edge homography maps a -> b; orient it to map u -> parent.
            let to_parent = if edge.a == u {
                Some(edge.homography)
            } else {
                edge.homography.try_inverse()
            };
            match to_parent {
                Some(h) => {
                    transforms[u] = normalize_homography(&(parent * h));
                    transforms[u].is_none()
                }
                None => true,
            }
        });
        if remaining.len() == before {
            return Err(Error::BlendFailure(format!(
                "alignment could not resolve transforms for images {remaining:?}"
            )));
        }
    }

    for _ in 0..refine_sweeps {
        refine_once(selection, &mut transforms);
    }

    Ok(transforms)
}

/// One Gauss-Seidel sweep: refit each non-reference image's transform by
/// least squares against every neighbor's current global position.
fn refine_once(selection: &GraphSelection, transforms: &mut [Option<Matrix3<f64>>]) {
    let graph = &selection.graph;

    for &u in &selection.component {
        if u == selection.reference {
            continue;
        }

        let mut constraints: Vec<Correspondence> = Vec::new();
        for (ei, v) in graph.neighbors(u) {
            let Some(g_v) = transforms[v] else { continue };
            let edge = &graph.edges[ei];
            for c in &edge.inliers {
                // Express the correspondence as: point in u -> panorama point
                // through the neighbor's transform.
                let (p_u, p_v) = if edge.a == u { (c.src, c.dst) } else { (c.dst, c.src) };
                let target = transform_point(&g_v, p_v.0, p_v.1);
                constraints.push(Correspondence {
                    src: p_u,
                    dst: target,
                });
            }
        }

        if constraints.len() < 8 {
            continue;
        }
        if let Some(h) = fit_homography(&constraints).and_then(|h| normalize_homography(&h)) {
            transforms[u] = Some(h);
        }
    }
}

/// The panorama coordinate frame: canvas dimensions plus the translation
/// that shifts all projected footprints into non-negative pixel space.
#[derive(Debug, Clone, Copy)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub offset: Matrix3<f64>,
}

/// Bound the union of all warped footprints.
pub fn compute_canvas(
    images: &[RgbImage],
    transforms: &[Option<Matrix3<f64>>],
    max_area: u64,
) -> Result<Canvas> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for (img, t) in images.iter().zip(transforms.iter()) {
        let Some(t) = t else { continue };
        for (x, y) in project_corners(t, img.width(), img.height()) {
            if !x.is_finite() || !y.is_finite() {
                return Err(Error::BlendFailure(
                    "image corner projects to infinity".into(),
                ));
            }
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    let width = (max_x - min_x).ceil() as i64;
    let height = (max_y - min_y).ceil() as i64;
    if width <= 0 || height <= 0 {
        return Err(Error::BlendFailure(format!(
            "degenerate canvas {width}x{height}"
        )));
    }
    if width as u64 * height as u64 > max_area {
        return Err(Error::BlendFailure(format!(
            "canvas {width}x{height} exceeds the area limit {max_area}"
        )));
    }

    Ok(Canvas {
        width: width as u32,
        height: height as u32,
        offset: Matrix3::new(1.0, 0.0, -min_x, 0.0, 1.0, -min_y, 0.0, 0.0, 1.0),
    })
}

/// One component image warped into canvas space.
pub struct WarpedImage {
    /// Index into the original input sequence.
    pub index: usize,
    pub image: RgbImage,
    /// 255 where this image covers the canvas.
    pub mask: GrayImage,
    /// Footprint bounding box in canvas pixels, half-open.
    pub bounds: (u32, u32, u32, u32),
}

/// Warp every included image onto the canvas, in input order.
pub fn warp_component(
    images: &[RgbImage],
    transforms: &[Option<Matrix3<f64>>],
    canvas: &Canvas,
) -> Result<Vec<WarpedImage>> {
    let included: Vec<(usize, Matrix3<f64>)> = transforms
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.map(|t| (i, t)))
        .collect();

    included
        .par_iter()
        .map(|&(index, t)| {
            let full = canvas.offset * t;
            let map = full.try_inverse().ok_or_else(|| {
                Error::BlendFailure(format!("global transform for image {index} not invertible"))
            })?;
            let (image, mask) = warp_perspective_rgb(&images[index], &map, canvas.width, canvas.height);
            let bounds = mask_bounds(&mask).ok_or_else(|| {
                Error::BlendFailure(format!("image {index} warps to an empty footprint"))
            })?;
            Ok(WarpedImage {
                index,
                image,
                mask,
                bounds,
            })
        })
        .collect()
}

/// Half-open bounding box of the nonzero mask region.
pub fn mask_bounds(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut any = false;

    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] != 0 {
            any = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    any.then(|| (min_x, min_y, max_x + 1, max_y + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::build_graph;
    use crate::homography::PairwiseTransform;
    use image::Rgb;

    fn translation(dx: f64, dy: f64) -> Matrix3<f64> {
        Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0)
    }

    fn edge(a: usize, b: usize, h: Matrix3<f64>, confidence: f64) -> PairwiseTransform {
        PairwiseTransform {
            a,
            b,
            homography: h,
            num_inliers: 20,
            confidence,
            inliers: Vec::new(),
        }
    }

    #[test]
    fn reference_gets_identity_and_chain_composes() {
        // 0 -> 1 shifts +100, 2 -> 1 shifts -80; reference is 1.
        let sel = build_graph(
            3,
            vec![
                edge(0, 1, translation(100.0, 0.0), 2.0),
                edge(2, 1, translation(-80.0, 0.0), 2.0),
            ],
            2,
        )
        .unwrap();
        assert_eq!(sel.reference, 1);

        let transforms = global_transforms(&sel, 0).unwrap();
        let g0 = transforms[0].unwrap();
        let g1 = transforms[1].unwrap();
        let g2 = transforms[2].unwrap();

        assert_eq!(transform_point(&g1, 5.0, 5.0), (5.0, 5.0));
        assert_eq!(transform_point(&g0, 0.0, 0.0), (100.0, 0.0));
        assert_eq!(transform_point(&g2, 0.0, 0.0), (-80.0, 0.0));
    }

    #[test]
    fn chain_inverts_edge_direction_when_needed() {
        // Edge stored as 1 -> 2 but the path runs 2 -> ... -> 1.
        let sel = build_graph(
            2,
            vec![edge(0, 1, translation(60.0, -10.0), 2.0)],
            2,
        )
        .unwrap();
        assert_eq!(sel.reference, 0);

        let transforms = global_transforms(&sel, 0).unwrap();
        let g1 = transforms[1].unwrap();
        // Image 1's content sits 60 right of image 0, so mapping 1 -> 0
        // must subtract the shift.
        let (x, y) = transform_point(&g1, 60.0, 0.0);
        assert!((x - 0.0).abs() < 1e-9);
        assert!((y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn every_component_image_gets_exactly_one_transform() {
        let sel = build_graph(
            4,
            vec![
                edge(0, 1, translation(50.0, 0.0), 2.0),
                edge(1, 2, translation(50.0, 0.0), 2.0),
            ],
            2,
        )
        .unwrap();
        let transforms = global_transforms(&sel, 0).unwrap();
        assert_eq!(transforms.iter().filter(|t| t.is_some()).count(), 3);
        assert!(transforms[3].is_none());
    }

    #[test]
    fn canvas_covers_all_footprints() {
        let images = vec![
            RgbImage::from_pixel(100, 80, Rgb([10, 10, 10])),
            RgbImage::from_pixel(100, 80, Rgb([20, 20, 20])),
        ];
        let transforms = vec![
            Some(Matrix3::identity()),
            Some(translation(60.0, -12.0)),
        ];

        let canvas = compute_canvas(&images, &transforms, 1 << 26).unwrap();
        assert_eq!(canvas.width, 160);
        assert_eq!(canvas.height, 92);
        // Offset moves the topmost footprint to y = 0.
        assert_eq!(transform_point(&canvas.offset, 0.0, -12.0), (0.0, 0.0));
    }

    #[test]
    fn oversized_canvas_is_a_blend_failure() {
        let images = vec![
            RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])),
            RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])),
        ];
        let transforms = vec![
            Some(Matrix3::identity()),
            Some(translation(1e6, 1e6)),
        ];

        let err = compute_canvas(&images, &transforms, 1 << 26).unwrap_err();
        assert!(matches!(err, Error::BlendFailure(_)));
    }

    #[test]
    fn warp_component_masks_match_translations() {
        let images = vec![
            RgbImage::from_pixel(40, 30, Rgb([200, 0, 0])),
            RgbImage::from_pixel(40, 30, Rgb([0, 200, 0])),
        ];
        let transforms = vec![Some(Matrix3::identity()), Some(translation(20.0, 0.0))];
        let canvas = compute_canvas(&images, &transforms, 1 << 26).unwrap();
        let warped = warp_component(&images, &transforms, &canvas).unwrap();

        assert_eq!(warped.len(), 2);
        assert_eq!(warped[0].index, 0);
        assert_eq!(warped[0].bounds, (0, 0, 40, 30));
        assert_eq!(warped[1].bounds, (20, 0, 60, 30));
        assert_eq!(warped[1].image.get_pixel(30, 10), &Rgb([0, 200, 0]));
    }
}
