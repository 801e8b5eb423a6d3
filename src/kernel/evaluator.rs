//! Kernel evaluation over a fixed set of training rows

use crate::core::{Result, SparseVector};
use crate::kernel::KernelFunction;

/// Evaluates kernel values between rows of one subproblem
///
/// Rows are borrowed from the training set; `ids` keeps each row's position
/// in the full training set, which is what the precomputed kernel indexes.
#[derive(Debug, Clone)]
pub struct KernelEvaluator<'a> {
    kernel: KernelFunction,
    rows: Vec<&'a SparseVector>,
    ids: Vec<usize>,
    norms: Vec<f64>,
}

impl<'a> KernelEvaluator<'a> {
    pub fn new(kernel: KernelFunction, rows: Vec<&'a SparseVector>, ids: Vec<usize>) -> Self {
        debug_assert_eq!(rows.len(), ids.len());
        let norms = if kernel.needs_norms() {
            rows.iter().map(|r| r.norm_squared()).collect()
        } else {
            vec![0.0; rows.len()]
        };
        Self {
            kernel,
            rows,
            ids,
            norms,
        }
    }

    /// Evaluator over every row of a training set, in order
    pub fn over_all(kernel: KernelFunction, rows: &'a [SparseVector]) -> Self {
        Self::new(kernel, rows.iter().collect(), (0..rows.len()).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn kernel(&self) -> &KernelFunction {
        &self.kernel
    }

    /// K(row i, row j)
    pub fn evaluate(&self, i: usize, j: usize) -> Result<f64> {
        self.kernel.evaluate(
            self.rows[i],
            self.norms[i],
            self.rows[j],
            self.norms[j],
            self.ids[j],
        )
    }

    /// Fill `out` with K(row i, row j) for every row j
    pub fn fill_row(&self, i: usize, out: &mut Vec<f64>) -> Result<()> {
        out.clear();
        for j in 0..self.rows.len() {
            out.push(self.evaluate(i, j)?);
        }
        Ok(())
    }

    /// K(x, row j) for a vector outside the row set
    pub fn evaluate_external(&self, x: &SparseVector, x_norm_sq: f64, j: usize) -> Result<f64> {
        self.kernel
            .evaluate(x, x_norm_sq, self.rows[j], self.norms[j], self.ids[j])
    }
}
