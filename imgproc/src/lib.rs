//! Pixel plumbing for the stitching pipeline: color conversion, inverse-mapped
//! perspective warping with coverage masks, and image pyramids for multi-band
//! blending.

pub mod color;
pub mod pyramid;
pub mod warp;

pub use color::*;
pub use pyramid::*;
pub use warp::*;
