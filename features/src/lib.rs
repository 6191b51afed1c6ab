//! Feature extraction and matching.
//!
//! Scale/rotation-invariant keypoints (multi-scale FAST with intensity
//! centroid orientation), binary steered-BRIEF descriptors, and brute-force
//! Hamming matching with a ratio test.

pub mod descriptor;
pub mod extractor;
pub mod fast;
pub mod matcher;

pub use descriptor::*;
pub use extractor::*;
pub use fast::*;
pub use matcher::*;
