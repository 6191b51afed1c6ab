//! Pipeline configuration with sensible defaults.

/// How warped images are merged across seams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Laplacian-pyramid blending: low frequencies merge over a wide band,
    /// high frequencies over a narrow one.
    MultiBand { bands: usize },
    /// Single-band feathering over a transition band of the given width.
    Feather { width: u32 },
}

#[derive(Debug, Clone)]
pub struct StitchConfig {
    /// FAST corner contrast threshold.
    pub fast_threshold: u8,
    /// Keypoint budget per image, strongest responses kept.
    pub max_features: usize,
    /// Detection pyramid depth and per-level scale step.
    pub pyramid_levels: usize,
    pub scale_factor: f32,
    /// Lowe ratio: best match must be this much closer than the second best.
    pub ratio_threshold: f32,
    /// RANSAC inlier distance tolerance in pixels.
    pub ransac_threshold: f64,
    /// RANSAC iteration cap; bounds the sampling nondeterminism.
    pub ransac_iterations: usize,
    /// RANSAC early-exit inlier fraction.
    pub ransac_confidence: f64,
    /// Base seed for all random sampling; per-pair seeds derive from it.
    pub seed: u64,
    /// Minimum inlier count to accept a pairwise homography
    /// (4x the minimal sample by default).
    pub min_inliers: usize,
    /// Minimum inlier fraction of the total correspondences for a pair.
    pub min_inlier_ratio: f64,
    /// Minimum edge confidence, `inliers / (8 + 0.3 * matches)`.
    pub min_edge_confidence: f64,
    /// Smallest connected component worth stitching.
    pub min_component_size: usize,
    /// Joint alignment refinement sweeps; 0 keeps the pure
    /// shortest-path composition.
    pub refine_sweeps: usize,
    pub exposure_compensation: bool,
    pub blend: BlendMode,
    /// Guard against degenerate homographies exploding the canvas.
    pub max_canvas_area: u64,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            max_features: 1500,
            pyramid_levels: 4,
            scale_factor: 1.3,
            ratio_threshold: 0.75,
            ransac_threshold: 3.0,
            ransac_iterations: 1000,
            ransac_confidence: 0.995,
            seed: 0,
            min_inliers: 16,
            min_inlier_ratio: 0.25,
            min_edge_confidence: 1.0,
            min_component_size: 2,
            refine_sweeps: 2,
            exposure_compensation: true,
            blend: BlendMode::MultiBand { bands: 5 },
            max_canvas_area: 1 << 26,
        }
    }
}

impl StitchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_fast_threshold(mut self, threshold: u8) -> Self {
        self.fast_threshold = threshold;
        self
    }

    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = n;
        self
    }

    pub fn with_ratio_threshold(mut self, ratio: f32) -> Self {
        self.ratio_threshold = ratio;
        self
    }

    pub fn with_ransac_threshold(mut self, threshold: f64) -> Self {
        self.ransac_threshold = threshold;
        self
    }

    pub fn with_ransac_iterations(mut self, iterations: usize) -> Self {
        self.ransac_iterations = iterations;
        self
    }

    pub fn with_min_inliers(mut self, n: usize) -> Self {
        self.min_inliers = n;
        self
    }

    pub fn with_refine_sweeps(mut self, sweeps: usize) -> Self {
        self.refine_sweeps = sweeps;
        self
    }

    pub fn with_exposure_compensation(mut self, enabled: bool) -> Self {
        self.exposure_compensation = enabled;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}
