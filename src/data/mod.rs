//! Typed feature matrices accepted by training and prediction
//!
//! Both containers validate their layout once on construction; the engine
//! only ever sees rows as [`SparseVector`](crate::core::SparseVector)s.

pub mod csr;
pub mod dense;

pub use self::csr::*;
pub use self::dense::*;

use crate::core::{Result, SVMError};

/// Check a label slice against the number of rows it describes
pub fn validate_labels(labels: &[f64], n_rows: usize) -> Result<()> {
    if labels.len() != n_rows {
        return Err(SVMError::InvalidDataset(format!(
            "{n_rows} feature rows but {} labels",
            labels.len()
        )));
    }
    if let Some(&bad) = labels.iter().find(|v| !v.is_finite()) {
        return Err(SVMError::InvalidLabel(bad));
    }
    Ok(())
}
