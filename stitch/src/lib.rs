//! The panorama stitching pipeline.
//!
//! Stages, in order: feature extraction, pairwise matching, geometric
//! verification, image graph construction, global alignment, exposure
//! compensation, seam finding, and compositing. The orchestrator in
//! [`pipeline`] sequences them, short-circuits on failure, and reports a
//! structured result.

pub mod align;
pub mod blend;
pub mod config;
pub mod exposure;
pub mod graph;
pub mod homography;
pub mod pipeline;
pub mod seam;

pub use config::{BlendMode, StitchConfig};
pub use pipeline::{CancelToken, Panorama, Stitcher};

pub use pano_core::{Error, Result, Stage};
