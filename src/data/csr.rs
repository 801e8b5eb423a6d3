//! Compressed sparse row feature matrix

use crate::core::{Dataset, Result, SVMError, SparseVector};

/// CSR matrix: `row_ptr[i]..row_ptr[i + 1]` delimits row `i` in
/// `col_idx` / `values`; column indices are 0-based and strictly
/// increasing within a row
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
    n_cols: usize,
}

impl CsrMatrix {
    /// Validate and wrap a CSR triple
    ///
    /// When `n_cols` is `None` the column count is the largest index plus one.
    pub fn new(
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<f64>,
        n_cols: Option<usize>,
    ) -> Result<Self> {
        if row_ptr.first() != Some(&0) {
            return Err(SVMError::InvalidDataset(
                "row pointer array must start with 0".to_string(),
            ));
        }
        if col_idx.len() != values.len() {
            return Err(SVMError::InvalidDataset(format!(
                "{} column indices but {} values",
                col_idx.len(),
                values.len()
            )));
        }
        if row_ptr.last() != Some(&values.len()) {
            return Err(SVMError::InvalidDataset(format!(
                "last row pointer must equal the number of stored values ({})",
                values.len()
            )));
        }
        for (row, w) in row_ptr.windows(2).enumerate() {
            if w[0] > w[1] || w[1] > values.len() {
                return Err(SVMError::InvalidDataset(format!(
                    "row pointers out of order at row {row}"
                )));
            }
            let cols = &col_idx[w[0]..w[1]];
            if cols.windows(2).any(|c| c[0] >= c[1]) {
                return Err(SVMError::InvalidDataset(format!(
                    "column indices of row {row} are not strictly increasing"
                )));
            }
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(SVMError::InvalidDataset(format!(
                "non-finite value at stored position {pos}"
            )));
        }

        let inferred = col_idx.iter().max().map_or(0, |&m| m + 1);
        let n_cols = match n_cols {
            Some(n) if n < inferred => {
                return Err(SVMError::DimensionMismatch {
                    expected: n,
                    actual: inferred,
                })
            }
            Some(n) => n,
            None => inferred,
        };

        Ok(Self {
            row_ptr,
            col_idx,
            values,
            n_cols,
        })
    }

    /// Pack sparse rows into CSR form
    pub fn from_rows(rows: &[SparseVector], n_cols: usize) -> Self {
        let mut row_ptr = Vec::with_capacity(rows.len() + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for row in rows {
            col_idx.extend_from_slice(&row.indices);
            values.extend_from_slice(&row.values);
            row_ptr.push(values.len());
        }
        let inferred = col_idx.iter().max().map_or(0, |&m| m + 1);
        Self {
            row_ptr,
            col_idx,
            values,
            n_cols: n_cols.max(inferred),
        }
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }
}

impl Dataset for CsrMatrix {
    fn len(&self) -> usize {
        self.n_rows()
    }

    fn dim(&self) -> usize {
        self.n_cols
    }

    fn row(&self, i: usize) -> SparseVector {
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        SparseVector {
            indices: self.col_idx[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csr_rows() {
        // [[1, 0, 2], [0, 0, 0], [0, 3, 0]]
        let m = CsrMatrix::new(vec![0, 2, 2, 3], vec![0, 2, 1], vec![1.0, 2.0, 3.0], None)
            .unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.dim(), 3);
        assert_eq!(m.nnz(), 3);
        assert!(m.row(1).is_empty());
        assert_eq!(m.row(2).indices, vec![1]);
        assert_eq!(m.row(0).values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_csr_explicit_columns() {
        let m = CsrMatrix::new(vec![0, 1], vec![1], vec![5.0], Some(10)).unwrap();
        assert_eq!(m.dim(), 10);

        let too_small = CsrMatrix::new(vec![0, 1], vec![4], vec![5.0], Some(2));
        assert!(matches!(too_small, Err(SVMError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_csr_rejects_malformed() {
        // unsorted indices within a row
        assert!(CsrMatrix::new(vec![0, 2], vec![2, 1], vec![1.0, 1.0], None).is_err());
        // duplicate index
        assert!(CsrMatrix::new(vec![0, 2], vec![1, 1], vec![1.0, 1.0], None).is_err());
        // row_ptr not ending at nnz
        assert!(CsrMatrix::new(vec![0, 1], vec![0, 1], vec![1.0, 1.0], None).is_err());
        // decreasing row_ptr
        assert!(CsrMatrix::new(vec![0, 2, 1, 2], vec![0, 1], vec![1.0, 1.0], None).is_err());
        // missing leading zero
        assert!(CsrMatrix::new(vec![], vec![], vec![], None).is_err());
    }

    #[test]
    fn test_from_rows_round_trip() {
        let rows = vec![
            SparseVector::new(vec![0, 3], vec![1.0, 2.0]),
            SparseVector::empty(),
            SparseVector::new(vec![1], vec![4.0]),
        ];
        let m = CsrMatrix::from_rows(&rows, 2);
        assert_eq!(m.row_ptr(), &[0, 2, 2, 3]);
        assert_eq!(m.col_idx(), &[0, 3, 1]);
        assert_eq!(m.n_cols(), 4);
        assert_eq!(m.rows(), rows);
    }
}
