//! Core traits for the SVM engine

use crate::core::SparseVector;

/// Row-oriented access to a feature matrix, dense or sparse
pub trait Dataset: Send + Sync {
    /// Number of rows
    fn len(&self) -> usize;

    /// Number of feature columns
    fn dim(&self) -> usize;

    /// Get a single row as a sparse vector
    ///
    /// # Panics
    /// Panics if index >= len()
    fn row(&self, i: usize) -> SparseVector;

    /// Materialize every row
    fn rows(&self) -> Vec<SparseVector> {
        (0..self.len()).map(|i| self.row(i)).collect()
    }

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
