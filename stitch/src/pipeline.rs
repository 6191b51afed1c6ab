//! The orchestrator: runs the full pipeline over a set of input images.
//!
//! Stage order is extraction, matching, verification, graph construction,
//! alignment, exposure compensation, seam finding, compositing. Pair-level
//! verification failures are recorded and survived; everything else aborts
//! the run. Cancellation is checked between stages, so a cancelled run stops
//! at the next stage boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbImage;
use pano_core::{Error, KeyPoints, Matches, Result, Stage};
use pano_features::{Descriptors, Extractor, Matcher};
use pano_imgproc::rgb_to_gray;
use rayon::prelude::*;

use crate::align::{compute_canvas, global_transforms, warp_component};
use crate::blend::blend;
use crate::config::StitchConfig;
use crate::exposure::{apply_gain, estimate_gains};
use crate::graph::build_graph;
use crate::homography::{verify_pair, PairwiseTransform};
use crate::seam::find_seams;

/// Cooperative cancellation handle. Clones share the flag, so a caller can
/// keep one clone and hand another to the running stitch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A finished stitch: the blended canvas plus everything the caller needs to
/// understand what was and was not included.
#[derive(Debug)]
pub struct Panorama {
    pub image: RgbImage,
    /// Input index of the reference image; its orientation fixes the canvas.
    pub reference: usize,
    /// Input indices excluded from the panorama, sorted ascending.
    pub unstitched: Vec<usize>,
    /// Pair-level errors recorded during verification, in pair order.
    pub pair_failures: Vec<Error>,
}

/// Pipeline entry point. Construction is cheap; one stitcher may run many
/// stitches.
#[derive(Debug, Default)]
pub struct Stitcher {
    config: StitchConfig,
}

impl Stitcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StitchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    pub fn stitch(&self, images: &[RgbImage]) -> Result<Panorama> {
        self.stitch_with_cancel(images, &CancelToken::new())
    }

    pub fn stitch_with_cancel(
        &self,
        images: &[RgbImage],
        cancel: &CancelToken,
    ) -> Result<Panorama> {
        // One image cannot overlap with anything.
        if images.len() < 2 {
            log::warn!("stitch called with {} image(s)", images.len());
            return Err(Error::NoOverlap);
        }
        for (index, img) in images.iter().enumerate() {
            if img.width() == 0 || img.height() == 0 {
                return Err(Error::InvalidImage {
                    index,
                    reason: format!("zero-size image {}x{}", img.width(), img.height()),
                });
            }
        }
        log::info!("stitching {} images", images.len());

        checkpoint(cancel, Stage::Extracting)?;
        let features = self.extract(images)?;
        log::debug!(
            "extracted {} keypoints total",
            features.iter().map(|(k, _)| k.len()).sum::<usize>()
        );

        checkpoint(cancel, Stage::Matching)?;
        let pair_matches = self.match_pairs(&features);
        log::debug!("{} pairs with correspondences", pair_matches.len());

        checkpoint(cancel, Stage::Verifying)?;
        let (edges, pair_failures) = self.verify_matches(&pair_matches, &features);
        log::debug!(
            "{} verified pairs, {} rejected",
            edges.len(),
            pair_failures.len()
        );

        checkpoint(cancel, Stage::GraphBuilding)?;
        let selection = build_graph(images.len(), edges, self.config.min_component_size)?;
        if !selection.unstitched.is_empty() {
            log::warn!("images {:?} not connected to the panorama", selection.unstitched);
        }

        checkpoint(cancel, Stage::Aligning)?;
        let transforms = global_transforms(&selection, self.config.refine_sweeps)?;
        let canvas = compute_canvas(images, &transforms, self.config.max_canvas_area)?;
        log::debug!(
            "canvas {}x{}, reference image {}",
            canvas.width,
            canvas.height,
            selection.reference
        );
        let mut warped = warp_component(images, &transforms, &canvas)?;

        checkpoint(cancel, Stage::Compensating)?;
        if self.config.exposure_compensation {
            let gains = estimate_gains(&warped);
            log::debug!("exposure gains: {gains:?}");
            for (w, &g) in warped.iter_mut().zip(gains.iter()) {
                apply_gain(w, g);
            }
        }

        checkpoint(cancel, Stage::Seaming)?;
        let seam_masks = find_seams(&warped, canvas.width, canvas.height)?;

        checkpoint(cancel, Stage::Compositing)?;
        let image = blend(
            &warped,
            &seam_masks,
            canvas.width,
            canvas.height,
            self.config.blend,
        )?;

        Ok(Panorama {
            image,
            reference: selection.reference,
            unstitched: selection.unstitched,
            pair_failures,
        })
    }

    /// Per-image feature extraction, parallel over images, output in input
    /// order.
    fn extract(&self, images: &[RgbImage]) -> Result<Vec<(KeyPoints, Descriptors)>> {
        let extractor = Extractor::new()
            .with_max_features(self.config.max_features)
            .with_n_levels(self.config.pyramid_levels)
            .with_scale_factor(self.config.scale_factor)
            .with_fast_threshold(self.config.fast_threshold);

        images
            .par_iter()
            .enumerate()
            .map(|(index, img)| {
                let gray = rgb_to_gray(img);
                extractor.detect_and_describe(&gray).map_err(|e| match e {
                    Error::InvalidImage { reason, .. } => Error::InvalidImage { index, reason },
                    other => other,
                })
            })
            .collect()
    }

    /// Match every unordered pair, parallel over pairs, output in pair
    /// order. Pairs without correspondences are dropped quietly; zero
    /// matches is a valid "no overlap" signal.
    fn match_pairs(
        &self,
        features: &[(KeyPoints, Descriptors)],
    ) -> Vec<(usize, usize, Matches)> {
        let matcher = Matcher::new().with_ratio_threshold(self.config.ratio_threshold);

        let n = features.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|a| (a + 1..n).map(move |b| (a, b)))
            .collect();

        pairs
            .par_iter()
            .filter_map(|&(a, b)| {
                let matches = matcher.match_descriptors(&features[a].1, &features[b].1);
                if matches.is_empty() {
                    None
                } else {
                    Some((a, b, matches))
                }
            })
            .collect()
    }

    /// Verify every matched pair, parallel over pairs. Pair-level errors are
    /// collected instead of aborting.
    fn verify_matches(
        &self,
        pair_matches: &[(usize, usize, Matches)],
        features: &[(KeyPoints, Descriptors)],
    ) -> (Vec<PairwiseTransform>, Vec<Error>) {
        let outcomes: Vec<Result<PairwiseTransform>> = pair_matches
            .par_iter()
            .map(|(a, b, matches)| {
                verify_pair(*a, *b, matches, &features[*a].0, &features[*b].0, &self.config)
            })
            .collect();

        let mut edges = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(edge) => edges.push(edge),
                Err(e) => {
                    debug_assert!(e.is_pair_level());
                    log::debug!("pair rejected: {e}");
                    failures.push(e);
                }
            }
        }
        (edges, failures)
    }
}

fn checkpoint(cancel: &CancelToken, stage: Stage) -> Result<()> {
    if cancel.is_cancelled() {
        log::info!("cancelled while {stage}");
        return Err(Error::Cancelled(stage));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn single_image_is_no_overlap() {
        let images = vec![RgbImage::from_pixel(64, 64, Rgb([50, 50, 50]))];
        let err = Stitcher::new().stitch(&images).unwrap_err();
        assert!(matches!(err, Error::NoOverlap));
    }

    #[test]
    fn empty_input_is_no_overlap() {
        let err = Stitcher::new().stitch(&[]).unwrap_err();
        assert!(matches!(err, Error::NoOverlap));
    }

    #[test]
    fn zero_size_image_reports_its_index() {
        let images = vec![
            RgbImage::from_pixel(64, 64, Rgb([50, 50, 50])),
            RgbImage::new(0, 0),
        ];
        let err = Stitcher::new().stitch(&images).unwrap_err();
        assert!(matches!(err, Error::InvalidImage { index: 1, .. }));
    }

    #[test]
    fn pre_cancelled_token_stops_before_extraction() {
        let images = vec![
            RgbImage::from_pixel(64, 64, Rgb([50, 50, 50])),
            RgbImage::from_pixel(64, 64, Rgb([60, 60, 60])),
        ];
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = Stitcher::new()
            .stitch_with_cancel(&images, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled(Stage::Extracting)));
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let a = CancelToken::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
    }

    #[test]
    fn textureless_images_are_no_overlap_not_an_error_storm() {
        // Flat images produce zero keypoints, zero matches, zero edges.
        let images = vec![
            RgbImage::from_pixel(80, 60, Rgb([128, 128, 128])),
            RgbImage::from_pixel(80, 60, Rgb([128, 128, 128])),
        ];
        let err = Stitcher::new().stitch(&images).unwrap_err();
        assert!(matches!(err, Error::NoOverlap));
    }
}
