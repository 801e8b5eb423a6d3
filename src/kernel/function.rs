//! Tagged dispatch over the supported kernel families

use crate::core::{KernelType, Result, SVMError, SparseVector, SvmParams};
use crate::kernel::{
    Kernel, LinearKernel, PolynomialKernel, PrecomputedKernel, RBFKernel, SigmoidKernel,
};

/// A fully parameterised kernel, selected by [`KernelType`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelFunction {
    Linear(LinearKernel),
    Polynomial(PolynomialKernel),
    Rbf(RBFKernel),
    Sigmoid(SigmoidKernel),
    Precomputed(PrecomputedKernel),
}

impl KernelFunction {
    /// Build the kernel for a dataset with `n_features` columns
    ///
    /// For the precomputed kernel `n_features` is the width of the Gram
    /// matrix, i.e. the number of training rows.
    pub fn from_params(params: &SvmParams, n_features: usize) -> Result<Self> {
        let gamma = params.resolved_gamma(n_features);
        Ok(match params.kernel {
            KernelType::Linear => KernelFunction::Linear(LinearKernel::new()),
            KernelType::Polynomial => KernelFunction::Polynomial(PolynomialKernel::new(
                params.degree,
                gamma,
                params.coef0,
            )?),
            KernelType::Rbf => KernelFunction::Rbf(RBFKernel::new(gamma)?),
            KernelType::Sigmoid => {
                KernelFunction::Sigmoid(SigmoidKernel::new(gamma, params.coef0)?)
            }
            KernelType::Precomputed => {
                KernelFunction::Precomputed(PrecomputedKernel::new(n_features))
            }
        })
    }

    pub fn kernel_type(&self) -> KernelType {
        match self {
            KernelFunction::Linear(_) => KernelType::Linear,
            KernelFunction::Polynomial(_) => KernelType::Polynomial,
            KernelFunction::Rbf(_) => KernelType::Rbf,
            KernelFunction::Sigmoid(_) => KernelType::Sigmoid,
            KernelFunction::Precomputed(_) => KernelType::Precomputed,
        }
    }

    /// Whether evaluation benefits from cached squared norms
    pub fn needs_norms(&self) -> bool {
        matches!(self, KernelFunction::Rbf(_))
    }

    /// Evaluate K(x, y)
    ///
    /// `y_id` is the training row position of `y`; only the precomputed
    /// kernel reads it. A non-finite result is an error so that a solver
    /// never iterates on a poisoned gradient.
    pub fn evaluate(
        &self,
        x: &SparseVector,
        x_norm_sq: f64,
        y: &SparseVector,
        y_norm_sq: f64,
        y_id: usize,
    ) -> Result<f64> {
        let value = match self {
            KernelFunction::Linear(k) => k.compute(x, y),
            KernelFunction::Polynomial(k) => k.compute(x, y),
            KernelFunction::Rbf(k) => k.compute_with_norms(x, y, x_norm_sq, y_norm_sq),
            KernelFunction::Sigmoid(k) => k.compute(x, y),
            KernelFunction::Precomputed(k) => k.lookup(x, y_id)?,
        };
        if !value.is_finite() {
            return Err(SVMError::KernelEvaluation(format!(
                "{} kernel produced a non-finite value",
                self.kernel_type()
            )));
        }
        Ok(value)
    }
}
