//! Row-major dense feature matrix

use crate::core::{Dataset, Result, SVMError, SparseVector};

/// Dense matrix of 64-bit floats stored row by row
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix {
    n_rows: usize,
    n_cols: usize,
    data: Vec<f64>,
}

impl DenseMatrix {
    /// Wrap a flat row-major buffer of `n_rows * n_cols` values
    pub fn new(n_rows: usize, n_cols: usize, data: Vec<f64>) -> Result<Self> {
        let expected = n_rows.checked_mul(n_cols).ok_or_else(|| {
            SVMError::InvalidDataset(format!("{n_rows} x {n_cols} matrix is too large"))
        })?;
        if data.len() != expected {
            return Err(SVMError::DimensionMismatch {
                expected,
                actual: data.len(),
            });
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(SVMError::InvalidDataset(format!(
                "non-finite value at row {}, column {}",
                pos / n_cols.max(1),
                pos % n_cols.max(1)
            )));
        }
        Ok(Self {
            n_rows,
            n_cols,
            data,
        })
    }

    /// Build from nested rows, which must all have the same length
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, Vec::len);
        if let Some(row) = rows.iter().find(|r| r.len() != n_cols) {
            return Err(SVMError::DimensionMismatch {
                expected: n_cols,
                actual: row.len(),
            });
        }
        Self::new(rows.len(), n_cols, rows.concat())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Borrow one row
    pub fn row_slice(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

impl Dataset for DenseMatrix {
    fn len(&self) -> usize {
        self.n_rows
    }

    fn dim(&self) -> usize {
        self.n_cols
    }

    fn row(&self, i: usize) -> SparseVector {
        SparseVector::from_dense(self.row_slice(i))
    }
}
