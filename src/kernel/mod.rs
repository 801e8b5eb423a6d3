//! Kernel functions for SVM
//!
//! Each kernel family lives in its own file and implements [`Kernel`].
//! [`KernelFunction`] selects one at runtime and [`KernelEvaluator`]
//! applies it to the rows of a training subproblem.

pub mod evaluator;
pub mod function;
pub mod linear;
pub mod polynomial;
pub mod precomputed;
pub mod rbf;
pub mod sigmoid;
pub mod traits;

pub use self::evaluator::*;
pub use self::function::*;
pub use self::linear::*;
pub use self::polynomial::*;
pub use self::precomputed::*;
pub use self::rbf::*;
pub use self::sigmoid::*;
pub use self::traits::*;
