//! Precomputed kernel: values come from a caller-supplied Gram matrix
//!
//! Training rows are rows of the square Gram matrix, so K(i, j) is column
//! `j` of training row `i`. At prediction time each input row holds the
//! kernel values against every training row and the model looks up the
//! columns of its support vectors.

use crate::core::{Result, SVMError, SparseVector};

/// Column lookup into rows of a Gram matrix of width `n_columns`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecomputedKernel {
    n_columns: usize,
}

impl PrecomputedKernel {
    pub fn new(n_columns: usize) -> Self {
        Self { n_columns }
    }

    /// Width of the Gram matrix (number of training rows)
    pub fn n_columns(&self) -> usize {
        self.n_columns
    }

    /// Read column `column` of a Gram matrix row
    pub fn lookup(&self, row: &SparseVector, column: usize) -> Result<f64> {
        if column >= self.n_columns {
            return Err(SVMError::KernelEvaluation(format!(
                "precomputed kernel column {column} is outside a Gram matrix of width {}",
                self.n_columns
            )));
        }
        Ok(row.get(column))
    }
}
