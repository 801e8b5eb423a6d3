//! SMO-based Support Vector Machine engine
//!
//! Training follows the decomposition approach of LIBSVM: every dual
//! problem is solved by Sequential Minimal Optimization with first- or
//! second-order working set selection and optional shrinking. Multi-class
//! problems are split one-vs-one and solved in parallel.
//!
//! * [`api`] is the typed entry point (`SVM` builder, `TrainedModel`).
//! * [`binding`] exposes the same engine through flat buffers for host
//!   language wrappers.

pub mod api;
pub mod binding;
pub mod cache;
pub mod core;
pub mod data;
pub mod kernel;
pub mod model;
pub mod optimizer;
pub mod persistence;
pub mod predict;
pub mod solver;

// Re-export main types for convenience
pub use crate::api::{ModelInfo, TrainedModel, SVM};
pub use crate::binding::ModelHandle;
pub use crate::cache::{CacheStats, KernelCache};
pub use crate::core::error::{ErrorKind, Result, SVMError};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::data::{CsrMatrix, DenseMatrix};
pub use crate::kernel::{Kernel, KernelFunction};
pub use crate::model::{FittedModel, KernelSpec};
pub use crate::optimizer::{SVMOptimizer, TrainingOutcome, TrainingReport};
pub use crate::predict::Predictor;

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
