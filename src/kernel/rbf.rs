//! Gaussian kernel: K(x, y) = exp(-γ‖x − y‖²)

use crate::core::{Result, SparseVector};
use crate::kernel::traits::checked_gamma;
use crate::kernel::Kernel;

/// Gaussian (RBF) kernel
///
/// Training evaluates it through [`Kernel::compute_with_norms`], so each
/// entry costs one sparse dot product once the row norms are cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RBFKernel {
    gamma: f64,
}

impl RBFKernel {
    /// Fails with `InvalidParameter` unless `gamma` is positive and finite
    pub fn new(gamma: f64) -> Result<Self> {
        Ok(Self {
            gamma: checked_gamma(gamma)?,
        })
    }

    /// γ = 1 / n_features
    pub fn with_auto_gamma(n_features: usize) -> Self {
        Self {
            gamma: 1.0 / n_features.max(1) as f64,
        }
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl Kernel for RBFKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        (-self.gamma * distance_sq(x, y)).exp()
    }

    fn compute_with_norms(
        &self,
        x: &SparseVector,
        y: &SparseVector,
        x_norm_sq: f64,
        y_norm_sq: f64,
    ) -> f64 {
        // rounding can push the expansion slightly below zero
        let d = (x_norm_sq + y_norm_sq - 2.0 * x.dot(y)).max(0.0);
        (-self.gamma * d).exp()
    }
}

/// ‖x − y‖² by a merge over both index lists
fn distance_sq(x: &SparseVector, y: &SparseVector) -> f64 {
    let (mut a, mut b) = (
        x.indices.iter().zip(&x.values).peekable(),
        y.indices.iter().zip(&y.values).peekable(),
    );
    let mut sum = 0.0;
    loop {
        let diff = match (a.peek(), b.peek()) {
            (Some(&(i, &u)), Some(&(j, &v))) => match i.cmp(j) {
                std::cmp::Ordering::Equal => {
                    a.next();
                    b.next();
                    u - v
                }
                std::cmp::Ordering::Less => {
                    a.next();
                    u
                }
                std::cmp::Ordering::Greater => {
                    b.next();
                    v
                }
            },
            (Some(&(_, &u)), None) => {
                a.next();
                u
            }
            (None, Some(&(_, &v))) => {
                b.next();
                v
            }
            (None, None) => break,
        };
        sum += diff * diff;
    }
    sum
}
