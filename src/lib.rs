//! Panorama stitching.
//!
//! Feeds a set of overlapping photographs through feature extraction,
//! pairwise matching, robust geometric verification, global alignment,
//! exposure compensation, seam finding, and multi-band blending, producing
//! one composite image.
//!
//! ```no_run
//! use image::RgbImage;
//!
//! # fn load() -> Vec<RgbImage> { Vec::new() }
//! let images: Vec<RgbImage> = load();
//! let pano = pano::stitch(&images)?;
//! pano.image.save("panorama.png")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use pano_core as core;
pub use pano_features as features;
pub use pano_imgproc as imgproc;
pub use pano_stitch as stitch;

pub use pano_core::{Error, Result, Stage};
pub use pano_stitch::{BlendMode, CancelToken, Panorama, StitchConfig, Stitcher};

use image::RgbImage;

/// Stitch with the default configuration.
pub fn stitch(images: &[RgbImage]) -> Result<Panorama> {
    Stitcher::new().stitch(images)
}
