//! Shared vocabulary for the pano stitching pipeline.
//!
//! Keypoints, feature matches, the generic seeded RANSAC engine, and the
//! workspace-wide error type live here so the stage crates can agree on
//! data without depending on each other.

pub mod error;
pub mod keypoint;
pub mod robust;

pub use error::*;
pub use keypoint::*;
pub use robust::*;
