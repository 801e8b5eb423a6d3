//! Fitted model produced by the orchestrator
//!
//! Support vectors are stored grouped by class in class order. Dual
//! coefficients follow the one-vs-one layout: for the pair (i, j) the
//! coefficients of class i's support vectors live in row `j - 1` and those
//! of class j's support vectors in row `i`. Regression and one-class models
//! have a single coefficient row and a single rho.

use crate::core::{KernelType, Result, SparseVector, SvmParams, SvmType};
use crate::data::CsrMatrix;
use crate::kernel::KernelFunction;

/// Kernel family plus the resolved parameters it was trained with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelSpec {
    pub kernel: KernelType,
    pub degree: u32,
    /// Resolved gamma (never "auto")
    pub gamma: f64,
    pub coef0: f64,
}

impl KernelSpec {
    pub fn from_params(params: &SvmParams, n_features: usize) -> Self {
        Self {
            kernel: params.kernel,
            degree: params.degree,
            gamma: params.resolved_gamma(n_features),
            coef0: params.coef0,
        }
    }

    /// Build the kernel for a model over `n_features` columns
    pub fn function(&self, n_features: usize) -> Result<KernelFunction> {
        let params = SvmParams {
            kernel: self.kernel,
            degree: self.degree,
            gamma: Some(self.gamma),
            coef0: self.coef0,
            ..Default::default()
        };
        KernelFunction::from_params(&params, n_features)
    }
}

/// A trained SVM: support vectors, dual coefficients, offsets and the
/// optional calibration parameters
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub(crate) svm_type: SvmType,
    pub(crate) kernel: KernelSpec,
    pub(crate) n_features: usize,
    /// Class labels in class order; empty for regression and one-class
    pub(crate) labels: Vec<i32>,
    /// Support vectors per class; empty for regression and one-class
    pub(crate) n_sv_per_class: Vec<usize>,
    pub(crate) support_vectors: Vec<SparseVector>,
    /// Training-row position of each support vector, when known
    pub(crate) sv_indices: Vec<usize>,
    /// `(n_classes - 1)` rows of `n_sv` coefficients
    pub(crate) sv_coef: Vec<Vec<f64>>,
    pub(crate) rho: Vec<f64>,
    pub(crate) prob_a: Vec<f64>,
    pub(crate) prob_b: Vec<f64>,
}

impl FittedModel {
    pub fn svm_type(&self) -> SvmType {
        self.svm_type
    }

    pub fn kernel_spec(&self) -> KernelSpec {
        self.kernel
    }

    /// Number of feature columns (Gram matrix width for precomputed kernels)
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of classes; 2 for regression and one-class models
    pub fn n_classes(&self) -> usize {
        if self.svm_type.is_classification() {
            self.labels.len()
        } else {
            2
        }
    }

    /// Number of binary decision functions
    pub fn n_binary_models(&self) -> usize {
        self.rho.len()
    }

    pub fn n_sv(&self) -> usize {
        self.support_vectors.len()
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn n_support_per_class(&self) -> &[usize] {
        &self.n_sv_per_class
    }

    pub fn support_vectors(&self) -> &[SparseVector] {
        &self.support_vectors
    }

    /// Support vectors packed as CSR
    pub fn support_vectors_csr(&self) -> CsrMatrix {
        CsrMatrix::from_rows(&self.support_vectors, self.n_features)
    }

    /// Training-row positions of the support vectors
    ///
    /// Always known for precomputed kernels. Models of other kernels loaded
    /// from a file do not record them.
    pub fn support_indices(&self) -> Option<&[usize]> {
        if self.sv_indices.len() == self.support_vectors.len() {
            Some(&self.sv_indices)
        } else {
            None
        }
    }

    pub fn dual_coef(&self) -> &[Vec<f64>] {
        &self.sv_coef
    }

    /// Dual coefficients flattened row-major, `(n_classes - 1) × n_sv`
    pub fn dual_coef_flat(&self) -> Vec<f64> {
        self.sv_coef.concat()
    }

    /// Raw offsets: decision value = Σ coef K − rho
    pub fn rho(&self) -> &[f64] {
        &self.rho
    }

    /// Intercepts in the `Σ coef K + b` convention, i.e. `−rho`
    pub fn intercepts(&self) -> Vec<f64> {
        self.rho.iter().map(|r| -r).collect()
    }

    pub fn has_probability(&self) -> bool {
        !self.prob_a.is_empty()
    }

    pub fn prob_a(&self) -> &[f64] {
        &self.prob_a
    }

    pub fn prob_b(&self) -> &[f64] {
        &self.prob_b
    }

    /// Laplace scale of the residuals of a calibrated regression model
    pub fn svr_probability_sigma(&self) -> Option<f64> {
        if self.svm_type.is_regression() {
            self.prob_a.first().copied()
        } else {
            None
        }
    }

    /// Offset of each class's first support vector
    pub(crate) fn class_starts(&self) -> Vec<usize> {
        let mut starts = Vec::with_capacity(self.n_sv_per_class.len());
        let mut offset = 0;
        for &n in &self.n_sv_per_class {
            starts.push(offset);
            offset += n;
        }
        starts
    }

    pub(crate) fn kernel_function(&self) -> Result<KernelFunction> {
        self.kernel.function(self.n_features)
    }
}
