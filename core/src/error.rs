//! Workspace-wide error type.

use thiserror::Error;

/// Pipeline stage names, used for cancellation reporting and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extracting,
    Matching,
    Verifying,
    GraphBuilding,
    Aligning,
    Compensating,
    Seaming,
    Compositing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Extracting => "extracting features",
            Stage::Matching => "matching features",
            Stage::Verifying => "verifying pairs",
            Stage::GraphBuilding => "building the image graph",
            Stage::Aligning => "aligning images",
            Stage::Compensating => "compensating exposure",
            Stage::Seaming => "finding seams",
            Stage::Compositing => "compositing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// An input image cannot be processed at all.
    #[error("invalid image {index}: {reason}")]
    InvalidImage { index: usize, reason: String },

    /// A pair had too few correspondences to attempt verification.
    #[error("images {a} and {b} share only {found} correspondences")]
    InsufficientOverlap { a: usize, b: usize, found: usize },

    /// A pair's correspondences did not support a consistent homography.
    #[error("no consistent transform between images {a} and {b}")]
    VerificationFailed { a: usize, b: usize },

    /// No stitchable group of images exists.
    #[error("no group of overlapping images found")]
    NoOverlap,

    /// An internal stage invariant was violated.
    #[error("blending failed: {0}")]
    BlendFailure(String),

    /// The caller cancelled the run.
    #[error("cancelled while {0}")]
    Cancelled(Stage),
}

impl Error {
    /// Pair-level errors describe one edge of the image graph; the pipeline
    /// records them and keeps going instead of aborting.
    pub fn is_pair_level(&self) -> bool {
        matches!(
            self,
            Error::InsufficientOverlap { .. } | Error::VerificationFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_level_classification() {
        assert!(Error::InsufficientOverlap { a: 0, b: 1, found: 2 }.is_pair_level());
        assert!(Error::VerificationFailed { a: 0, b: 1 }.is_pair_level());
        assert!(!Error::NoOverlap.is_pair_level());
        assert!(!Error::Cancelled(Stage::Matching).is_pair_level());
    }

    #[test]
    fn messages_name_the_images() {
        let msg = Error::InsufficientOverlap { a: 3, b: 7, found: 1 }.to_string();
        assert!(msg.contains('3') && msg.contains('7'));
        assert_eq!(
            Error::Cancelled(Stage::Compositing).to_string(),
            "cancelled while compositing"
        );
        assert_eq!(
            Error::Cancelled(Stage::GraphBuilding).to_string(),
            "cancelled while building the image graph"
        );
    }
}
