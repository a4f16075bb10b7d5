//! Parametric value functions.
//!
//! A [`FunctionApproximator`] maps an input (a state, or a `(state, action)`
//! pair) to a scalar estimate and can be nudged toward a target value. The
//! linear reference implementation computes `w · φ(x)` for a feature
//! extractor `φ` supplied at construction.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::gpi::error::{GpiError, Result};

/// Range of the random initial weights.
const INIT_WEIGHT_RANGE: f64 = 0.1;

/// A differentiable scalar model over inputs of type `X`.
pub trait FunctionApproximator<X> {
    /// Estimate the value of `x`.
    fn predict(&self, x: &X) -> f64;

    /// Gradient of the estimate with respect to the weights at `x`.
    fn gradient(&self, x: &X) -> Vec<f64>;

    /// Move the estimate at `x` toward `target`:
    /// `w += step_size * (target - predict(x)) * gradient(x)`.
    fn update(&mut self, x: &X, target: f64, step_size: f64);

    /// Current weight vector.
    fn weights(&self) -> &[f64];

    /// Replace the weight vector.
    ///
    /// # Errors
    /// [`GpiError::InvalidArgument`] if the length differs from the current one.
    fn set_weights(&mut self, weights: Vec<f64>) -> Result<()>;
}

type FeatureFn<X> = Box<dyn Fn(&X) -> Vec<f64> + Send + Sync>;

/// Linear model `w · φ(x)` over a fixed-length feature vector.
pub struct LinearFunctionApproximator<X> {
    weights: Vec<f64>,
    features: FeatureFn<X>,
}

impl<X> LinearFunctionApproximator<X> {
    /// Create a model with all weights zero.
    pub fn new<F>(num_features: usize, features: F) -> Self
    where
        F: Fn(&X) -> Vec<f64> + Send + Sync + 'static,
    {
        Self {
            weights: vec![0.0; num_features],
            features: Box::new(features),
        }
    }

    /// Create a model with weights drawn uniformly from a small range around 0.
    pub fn with_random_weights<F>(num_features: usize, seed: u64, features: F) -> Self
    where
        F: Fn(&X) -> Vec<f64> + Send + Sync + 'static,
    {
        let mut rng = StdRng::seed_from_u64(seed);
        let weights = (0..num_features)
            .map(|_| rng.gen_range(-INIT_WEIGHT_RANGE..INIT_WEIGHT_RANGE))
            .collect();
        Self {
            weights,
            features: Box::new(features),
        }
    }

    /// Number of features (and weights).
    pub fn num_features(&self) -> usize {
        self.weights.len()
    }

    /// Extract the feature vector of `x`.
    pub fn features(&self, x: &X) -> Vec<f64> {
        (self.features)(x)
    }
}

impl<X> FunctionApproximator<X> for LinearFunctionApproximator<X> {
    fn predict(&self, x: &X) -> f64 {
        self.features(x)
            .iter()
            .zip(&self.weights)
            .map(|(f, w)| f * w)
            .sum()
    }

    // Linear in the weights, so the gradient is the feature vector itself.
    fn gradient(&self, x: &X) -> Vec<f64> {
        self.features(x)
    }

    fn update(&mut self, x: &X, target: f64, step_size: f64) {
        let phi = self.features(x);
        let prediction: f64 = phi.iter().zip(&self.weights).map(|(f, w)| f * w).sum();
        let delta = step_size * (target - prediction);
        for (w, f) in self.weights.iter_mut().zip(&phi) {
            *w += delta * f;
        }
    }

    fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn set_weights(&mut self, weights: Vec<f64>) -> Result<()> {
        if weights.len() != self.weights.len() {
            return Err(GpiError::InvalidArgument(format!(
                "expected {} weights, got {}",
                self.weights.len(),
                weights.len()
            )));
        }
        self.weights = weights;
        Ok(())
    }
}

impl<X> fmt::Debug for LinearFunctionApproximator<X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearFunctionApproximator")
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

/// One-hot feature vector with a 1 at `index`.
///
/// A linear model over one-hot features behaves exactly like a lookup table.
pub fn one_hot(index: usize, len: usize) -> Vec<f64> {
    let mut phi = vec![0.0; len];
    if index < len {
        phi[index] = 1.0;
    }
    phi
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    fn poly(x: &f64) -> Vec<f64> {
        vec![1.0, *x, x * x]
    }

    #[test]
    fn test_predict_is_dot_product() {
        let mut fa = LinearFunctionApproximator::new(3, poly);
        assert_eq!(fa.predict(&2.0), 0.0);

        fa.set_weights(vec![1.0, 2.0, 3.0]).unwrap();
        assert_float_eq!(fa.predict(&2.0), 1.0 + 4.0 + 12.0, abs <= 1e-12);
        assert_eq!(fa.gradient(&2.0), vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_update_moves_toward_target() {
        let mut fa = LinearFunctionApproximator::new(3, poly);
        let x = 1.5;
        let before = (fa.predict(&x) - 10.0).abs();
        fa.update(&x, 10.0, 0.05);
        let after = (fa.predict(&x) - 10.0).abs();
        assert!(after < before, "error should shrink: {} -> {}", before, after);

        // One-hot features with step 1 reach the target in a single update.
        let mut table = LinearFunctionApproximator::new(4, |i: &usize| one_hot(*i, 4));
        table.update(&2, -7.0, 1.0);
        assert_float_eq!(table.predict(&2), -7.0, abs <= 1e-12);
        assert_eq!(table.predict(&1), 0.0);
    }

    #[test]
    fn test_random_weights_are_small() {
        let fa = LinearFunctionApproximator::with_random_weights(50, 42, poly);
        assert_eq!(fa.num_features(), 50);
        assert!(fa.weights().iter().all(|w| w.abs() < INIT_WEIGHT_RANGE));
        assert!(fa.weights().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_set_weights_size_mismatch() {
        let mut fa = LinearFunctionApproximator::new(3, poly);
        let err = fa.set_weights(vec![0.0; 2]).unwrap_err();
        assert!(matches!(err, GpiError::InvalidArgument(_)));
        assert_eq!(fa.weights(), &[0.0, 0.0, 0.0]);
    }
}
