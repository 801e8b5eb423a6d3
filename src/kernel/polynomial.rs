//! Polynomial Kernel Implementation
//!
//! The polynomial kernel is defined as:
//! K(x, y) = (γ * <x, y> + r)^d
//!
//! Where:
//! - γ (gamma): scaling factor for the dot product
//! - r (coef0): independent term in the polynomial
//! - d (degree): degree of the polynomial

use crate::core::{Result, SparseVector};
use crate::kernel::traits::{checked_gamma, Kernel};

/// Polynomial kernel with configurable degree, gamma, and coefficient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolynomialKernel {
    /// Scaling factor for the dot product
    pub gamma: f64,
    /// Independent term in the polynomial
    pub coef0: f64,
    /// Degree of the polynomial
    pub degree: u32,
}

impl PolynomialKernel {
    /// Creates a new polynomial kernel with the specified parameters
    ///
    /// # Examples
    /// ```
    /// use svm_engine::kernel::PolynomialKernel;
    ///
    /// // Quadratic kernel: (x·y + 1)²
    /// let quad_kernel = PolynomialKernel::new(2, 1.0, 1.0).unwrap();
    /// assert_eq!(quad_kernel.degree, 2);
    /// assert!(PolynomialKernel::new(2, 0.0, 1.0).is_err());
    /// ```
    pub fn new(degree: u32, gamma: f64, coef0: f64) -> Result<Self> {
        Ok(Self {
            gamma: checked_gamma(gamma)?,
            coef0,
            degree,
        })
    }
}

impl Kernel for PolynomialKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        let base = self.gamma * x.dot(y) + self.coef0;
        powi(base, self.degree)
    }
}

/// Integer power by repeated squaring
///
/// Unlike `f64::powi` this takes the full `u32` range of degrees.
pub(crate) fn powi(base: f64, degree: u32) -> f64 {
    let mut result = 1.0;
    let mut square = base;
    let mut d = degree;
    while d > 0 {
        if d & 1 == 1 {
            result *= square;
        }
        square *= square;
        d >>= 1;
    }
    result
}
