//! The per-family kernel interface

use crate::core::{Result, SVMError, SparseVector};

/// One kernel family with its hyperparameters bound
///
/// The precomputed kernel does not implement this; it indexes a Gram row
/// instead of combining two feature vectors.
pub trait Kernel: Send + Sync {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64;

    /// K(x, y) given ‖x‖² and ‖y‖², which the evaluator caches per row
    fn compute_with_norms(
        &self,
        x: &SparseVector,
        y: &SparseVector,
        _x_norm_sq: f64,
        _y_norm_sq: f64,
    ) -> f64 {
        self.compute(x, y)
    }
}

/// Accept `gamma` as a kernel width: positive and finite
pub(crate) fn checked_gamma(gamma: f64) -> Result<f64> {
    if gamma > 0.0 && gamma.is_finite() {
        Ok(gamma)
    } else {
        Err(SVMError::InvalidParameter(format!(
            "gamma must be positive, got {gamma}"
        )))
    }
}
