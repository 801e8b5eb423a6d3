//! SVM solver implementations
//!
//! This module implements the Sequential Minimal Optimization (SMO) algorithm
//! with first- and second-order working set selection and optional
//! shrinking, plus the drivers that map each SVM formulation onto it.

pub mod formulation;
pub mod qmatrix;
pub mod selection;
pub mod shrinking;
pub mod smo;

pub use self::formulation::*;
pub use self::qmatrix::*;
pub use self::selection::*;
pub use self::shrinking::*;
pub use self::smo::*;
