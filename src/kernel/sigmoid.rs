//! Sigmoid (Tanh) Kernel Implementation
//!
//! K(x, y) = tanh(γ * <x, y> + r)
//!
//! The kernel is bounded in [-1, 1] and is not positive semi-definite for all
//! parameter values, so the solver must tolerate a non-positive curvature
//! along the working pair.

use crate::core::{Result, SparseVector};
use crate::kernel::traits::{checked_gamma, Kernel};

/// Sigmoid (Hyperbolic Tangent) kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmoidKernel {
    /// Scaling parameter for the dot product (must be positive)
    pub gamma: f64,
    /// Bias/offset parameter (can be positive, negative, or zero)
    pub coef0: f64,
}

impl SigmoidKernel {
    /// Creates a new Sigmoid kernel; `gamma` must be positive and finite
    ///
    /// # Examples
    /// ```
    /// use svm_engine::kernel::SigmoidKernel;
    ///
    /// let kernel = SigmoidKernel::new(0.1, -1.0).unwrap();
    /// assert_eq!(kernel.gamma, 0.1);
    /// assert_eq!(kernel.coef0, -1.0);
    /// ```
    pub fn new(gamma: f64, coef0: f64) -> Result<Self> {
        Ok(Self {
            gamma: checked_gamma(gamma)?,
            coef0,
        })
    }
}

impl Kernel for SigmoidKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        (self.gamma * x.dot(y) + self.coef0).tanh()
    }
}
