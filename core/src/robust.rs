//! Generic seeded RANSAC engine.
//!
//! Robust model estimation in the presence of outliers: repeatedly sample a
//! minimal subset, fit a candidate model, score it by inlier count, and keep
//! the best model found within the iteration budget. The random sampling is
//! driven by an explicit seed from the configuration so identical inputs
//! produce identical results.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Configuration for robust estimation.
#[derive(Debug, Clone)]
pub struct RobustConfig {
    /// Inlier distance tolerance, in the error metric of the model.
    pub threshold: f64,
    /// Hard cap on sampling iterations.
    pub max_iterations: usize,
    /// Early-exit inlier fraction: stop once this fraction of the data
    /// agrees with the best model.
    pub confidence: f64,
    /// RNG seed. Callers that run many estimations derive a distinct seed
    /// per task from one base seed.
    pub seed: u64,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            max_iterations: 1000,
            confidence: 0.99,
            seed: 0,
        }
    }
}

impl RobustConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Result of robust estimation.
#[derive(Debug, Clone)]
pub struct RobustResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    /// Mean inlier error, infinite when no model was found.
    pub residual: f64,
}

impl<M> RobustResult<M> {
    fn empty(n: usize) -> Self {
        Self {
            model: None,
            inliers: vec![false; n],
            num_inliers: 0,
            residual: f64::INFINITY,
        }
    }
}

/// Trait for models that can be estimated robustly.
pub trait RobustModel<D> {
    type Model: Clone;

    /// Minimum number of data points required to estimate the model.
    fn min_sample_size(&self) -> usize;

    /// Estimate a model from a minimal sample.
    fn estimate(&self, data: &[&D]) -> Option<Self::Model>;

    /// Error of a single data point against the model.
    fn compute_error(&self, model: &Self::Model, data: &D) -> f64;
}

/// Generic RANSAC engine.
pub struct Ransac {
    config: RobustConfig,
}

impl Ransac {
    pub fn new(config: RobustConfig) -> Self {
        Self { config }
    }

    pub fn run<D, M: RobustModel<D>>(&self, estimator: &M, data: &[D]) -> RobustResult<M::Model> {
        let n = data.len();
        let k = estimator.min_sample_size();

        if n < k {
            return RobustResult::empty(n);
        }

        let mut best = RobustResult::empty(n);
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut indices: Vec<usize> = (0..n).collect();

        for _ in 0..self.config.max_iterations {
            indices.shuffle(&mut rng);
            let sample: Vec<&D> = indices[..k].iter().map(|&i| &data[i]).collect();

            let Some(model) = estimator.estimate(&sample) else {
                continue;
            };

            let mut inliers = vec![false; n];
            let mut num_inliers = 0;
            let mut total_error = 0.0;

            for (j, d) in data.iter().enumerate() {
                let err = estimator.compute_error(&model, d);
                if err < self.config.threshold {
                    inliers[j] = true;
                    num_inliers += 1;
                    total_error += err;
                }
            }

            let residual = if num_inliers > 0 {
                total_error / num_inliers as f64
            } else {
                f64::INFINITY
            };

            if num_inliers > best.num_inliers
                || (num_inliers == best.num_inliers && residual < best.residual)
            {
                best.num_inliers = num_inliers;
                best.inliers = inliers;
                best.model = Some(model);
                best.residual = residual;

                if num_inliers as f64 > n as f64 * self.config.confidence {
                    break;
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1D line-through-origin model: y = a * x, estimated from one point.
    struct SlopeEstimator;

    impl RobustModel<(f64, f64)> for SlopeEstimator {
        type Model = f64;

        fn min_sample_size(&self) -> usize {
            1
        }

        fn estimate(&self, data: &[&(f64, f64)]) -> Option<f64> {
            let (x, y) = *data[0];
            if x.abs() < 1e-12 {
                None
            } else {
                Some(y / x)
            }
        }

        fn compute_error(&self, model: &f64, data: &(f64, f64)) -> f64 {
            (data.1 - model * data.0).abs()
        }
    }

    #[test]
    fn finds_dominant_slope_among_outliers() {
        let mut data: Vec<(f64, f64)> = (1..=20).map(|i| (i as f64, 2.0 * i as f64)).collect();
        data.extend((1..=6).map(|i| (i as f64, -30.0 * i as f64)));

        let ransac = Ransac::new(RobustConfig {
            threshold: 0.5,
            max_iterations: 100,
            confidence: 0.99,
            seed: 7,
        });
        let result = ransac.run(&SlopeEstimator, &data);

        let slope = result.model.expect("model");
        assert!((slope - 2.0).abs() < 1e-9);
        assert_eq!(result.num_inliers, 20);
    }

    #[test]
    fn identical_seed_gives_identical_result() {
        let data: Vec<(f64, f64)> = (1..=10)
            .map(|i| (i as f64, 3.0 * i as f64 + if i % 3 == 0 { 5.0 } else { 0.0 }))
            .collect();

        let config = RobustConfig {
            threshold: 0.1,
            max_iterations: 50,
            confidence: 0.99,
            seed: 42,
        };
        let a = Ransac::new(config.clone()).run(&SlopeEstimator, &data);
        let b = Ransac::new(config).run(&SlopeEstimator, &data);

        assert_eq!(a.num_inliers, b.num_inliers);
        assert_eq!(a.inliers, b.inliers);
        assert_eq!(a.model, b.model);
    }

    #[test]
    fn too_few_points_yields_no_model() {
        let ransac = Ransac::new(RobustConfig::default());
        let result = ransac.run(&SlopeEstimator, &[]);
        assert!(result.model.is_none());
        assert_eq!(result.num_inliers, 0);
    }
}
