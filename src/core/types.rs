//! Core type definitions for the SVM engine

use crate::core::{Result, SVMError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Sparse vector representation with sorted indices
#[derive(Clone, Debug, PartialEq)]
pub struct SparseVector {
    /// Sorted indices of non-zero elements
    pub indices: Vec<usize>,
    /// Values corresponding to indices
    pub values: Vec<f64>,
}

impl SparseVector {
    /// Create a new sparse vector, ensuring indices are sorted
    pub fn new(indices: Vec<usize>, values: Vec<f64>) -> Self {
        assert_eq!(
            indices.len(),
            values.len(),
            "Indices and values must have same length"
        );

        let mut pairs: Vec<_> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(idx, _)| idx);

        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self { indices, values }
    }

    /// Build from parts that must already be strictly increasing
    pub fn try_from_sorted(indices: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(SVMError::InvalidDataset(format!(
                "{} indices but {} values",
                indices.len(),
                values.len()
            )));
        }
        if let Some(w) = indices.windows(2).find(|w| w[0] >= w[1]) {
            return Err(SVMError::InvalidDataset(format!(
                "sparse indices must be strictly increasing, found {} followed by {}",
                w[0], w[1]
            )));
        }
        Ok(Self { indices, values })
    }

    /// Convert a dense row, dropping exact zeros
    pub fn from_dense(row: &[f64]) -> Self {
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for (i, &v) in row.iter().enumerate() {
            if v != 0.0 {
                indices.push(i);
                values.push(v);
            }
        }
        Self { indices, values }
    }

    /// Create an empty sparse vector
    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Get the value at a specific index (0 if not present)
    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    /// Dot product by merging the two sorted index lists
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let mut result = 0.0;
        let mut i = 0;
        let mut j = 0;

        while i < self.indices.len() && j < other.indices.len() {
            let x_idx = self.indices[i];
            let y_idx = other.indices[j];

            if x_idx == y_idx {
                result += self.values[i] * other.values[j];
                i += 1;
                j += 1;
            } else if x_idx < y_idx {
                i += 1;
            } else {
                j += 1;
            }
        }

        result
    }

    /// Compute squared L2 norm
    pub fn norm_squared(&self) -> f64 {
        self.values.iter().map(|&v| v * v).sum()
    }

    /// Largest stored index, if any
    pub fn max_index(&self) -> Option<usize> {
        self.indices.last().copied()
    }

    /// Number of non-zero elements
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Check if vector is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Expand into a dense row of length `dim`
    pub fn to_dense(&self, dim: usize) -> Vec<f64> {
        let mut row = vec![0.0; dim];
        for (&i, &v) in self.indices.iter().zip(&self.values) {
            if i < dim {
                row[i] = v;
            }
        }
        row
    }
}

/// SVM formulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SvmType {
    CSvc,
    NuSvc,
    OneClass,
    EpsilonSvr,
    NuSvr,
}

impl SvmType {
    pub const ALL: [SvmType; 5] = [
        SvmType::CSvc,
        SvmType::NuSvc,
        SvmType::OneClass,
        SvmType::EpsilonSvr,
        SvmType::NuSvr,
    ];

    /// Numeric code used at the binding boundary
    pub fn from_code(code: i32) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| SVMError::InvalidParameter(format!("unknown svm type code {code}")))
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_classification(self) -> bool {
        matches!(self, SvmType::CSvc | SvmType::NuSvc)
    }

    pub fn is_regression(self) -> bool {
        matches!(self, SvmType::EpsilonSvr | SvmType::NuSvr)
    }

    pub fn name(self) -> &'static str {
        match self {
            SvmType::CSvc => "c_svc",
            SvmType::NuSvc => "nu_svc",
            SvmType::OneClass => "one_class",
            SvmType::EpsilonSvr => "epsilon_svr",
            SvmType::NuSvr => "nu_svr",
        }
    }
}

impl fmt::Display for SvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SvmType {
    type Err = SVMError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| SVMError::InvalidParameter(format!("unknown svm type: {s}")))
    }
}

/// Kernel function family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelType {
    Linear,
    Polynomial,
    Rbf,
    Sigmoid,
    Precomputed,
}

impl KernelType {
    pub const ALL: [KernelType; 5] = [
        KernelType::Linear,
        KernelType::Polynomial,
        KernelType::Rbf,
        KernelType::Sigmoid,
        KernelType::Precomputed,
    ];

    pub fn from_code(code: i32) -> Result<Self> {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| SVMError::InvalidParameter(format!("unknown kernel code {code}")))
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            KernelType::Linear => "linear",
            KernelType::Polynomial => "polynomial",
            KernelType::Rbf => "rbf",
            KernelType::Sigmoid => "sigmoid",
            KernelType::Precomputed => "precomputed",
        }
    }

    pub fn uses_gamma(self) -> bool {
        matches!(
            self,
            KernelType::Polynomial | KernelType::Rbf | KernelType::Sigmoid
        )
    }

    pub fn uses_coef0(self) -> bool {
        matches!(self, KernelType::Polynomial | KernelType::Sigmoid)
    }
}

impl fmt::Display for KernelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KernelType {
    type Err = SVMError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| SVMError::InvalidParameter(format!("unknown kernel: {s}")))
    }
}

/// Working set selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingSetStrategy {
    /// First-order rule: the pair with the largest KKT violation
    #[default]
    MaximalViolatingPair,
    /// Second-order rule: i by violation, j by largest objective decrease
    SecondOrder,
}

/// Lifecycle of one QP solver run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Initializing,
    Iterating,
    Converged,
    MaxIterReached,
    Failed,
}

/// How a successful solver run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    /// Iteration cap hit; the returned solution is usable but not optimal
    MaxIterReached,
}

impl SolveStatus {
    /// Combine statuses so that any capped run marks the whole fit
    pub fn merge(self, other: SolveStatus) -> SolveStatus {
        if self == SolveStatus::MaxIterReached || other == SolveStatus::MaxIterReached {
            SolveStatus::MaxIterReached
        } else {
            SolveStatus::Converged
        }
    }
}

/// Result of one QP solver run
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Lagrange multipliers, in the subproblem's variable order
    pub alpha: Vec<f64>,
    /// Offset of the decision function (decision = sum - rho)
    pub rho: f64,
    /// Extra multiplier of the Nu variant, zero otherwise
    pub r: f64,
    /// Final objective value
    pub objective_value: f64,
    /// Upper bound of positive / negative variables after rescaling
    pub upper_bound_p: f64,
    pub upper_bound_n: f64,
    /// Number of iterations performed
    pub iterations: usize,
    pub status: SolveStatus,
}

/// Hyperparameter set for one fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmParams {
    pub kernel: KernelType,
    /// Degree of the polynomial kernel
    pub degree: u32,
    /// Kernel coefficient; `None` means `1 / n_features`
    pub gamma: Option<f64>,
    pub coef0: f64,
    /// Regularization parameter (C-SVC, epsilon-SVR, nu-SVR)
    pub c: f64,
    /// Nu parameter (nu-SVC, one-class, nu-SVR)
    pub nu: f64,
    /// Width of the insensitive tube (epsilon-SVR)
    pub epsilon: f64,
    /// Stopping tolerance on the maximal violation
    pub tol: f64,
    pub probability: bool,
    /// Per-class multipliers of C, keyed by class label
    pub class_weight: BTreeMap<i32, f64>,
    pub shrinking: bool,
    /// Iteration cap per subproblem; `None` means unlimited
    pub max_iter: Option<usize>,
    /// Worker threads; `None` means one per core
    pub n_jobs: Option<usize>,
    /// Kernel cache budget in MB; `None` means the default budget
    pub max_mem_size: Option<usize>,
    /// Seed for calibration fold shuffling
    pub random_state: u64,
    pub working_set: WorkingSetStrategy,
    /// Report per-subproblem progress at info level instead of debug
    pub verbose: bool,
}

/// Default kernel cache budget in MB
pub const DEFAULT_MAX_MEM_MB: usize = 100;

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            kernel: KernelType::Rbf,
            degree: 3,
            gamma: None,
            coef0: 0.0,
            c: 1.0,
            nu: 0.5,
            epsilon: 0.1,
            tol: 0.001,
            probability: false,
            class_weight: BTreeMap::new(),
            shrinking: false,
            max_iter: None,
            n_jobs: None,
            max_mem_size: None,
            random_state: 0,
            working_set: WorkingSetStrategy::MaximalViolatingPair,
            verbose: false,
        }
    }
}

impl SvmParams {
    /// Parse a hyperparameter set from JSON; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SVMError::SerializationError(e.to_string()))
    }

    /// Load a hyperparameter set from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SVMError::SerializationError(e.to_string()))
    }

    /// Gamma actually used for a dataset with `n_features` columns
    pub fn resolved_gamma(&self, n_features: usize) -> f64 {
        match self.gamma {
            Some(g) => g,
            None if n_features > 0 => 1.0 / n_features as f64,
            None => 1.0,
        }
    }

    /// Kernel cache budget in bytes
    pub fn memory_budget_bytes(&self) -> Result<usize> {
        let mb = self.max_mem_size.unwrap_or(DEFAULT_MAX_MEM_MB);
        mb.checked_mul(1024 * 1024).ok_or_else(|| {
            SVMError::ResourceExhausted(format!("memory budget of {mb} MB is not addressable"))
        })
    }

    /// Check the hyperparameters against the formulation they will train
    pub fn validate(&self, svm_type: SvmType) -> Result<()> {
        if !(self.tol > 0.0) || !self.tol.is_finite() {
            return Err(SVMError::InvalidParameter(format!(
                "tolerance must be positive, got {}",
                self.tol
            )));
        }
        if let Some(g) = self.gamma {
            if self.kernel.uses_gamma() && (!(g > 0.0) || !g.is_finite()) {
                return Err(SVMError::InvalidParameter(format!(
                    "gamma must be positive, got {g}"
                )));
            }
        }
        if !self.coef0.is_finite() {
            return Err(SVMError::InvalidParameter("coef0 must be finite".to_string()));
        }
        if matches!(
            svm_type,
            SvmType::CSvc | SvmType::EpsilonSvr | SvmType::NuSvr
        ) && (!(self.c > 0.0) || !self.c.is_finite())
        {
            return Err(SVMError::InvalidParameter(format!(
                "C must be positive, got {}",
                self.c
            )));
        }
        if matches!(
            svm_type,
            SvmType::NuSvc | SvmType::OneClass | SvmType::NuSvr
        ) && !(self.nu > 0.0 && self.nu <= 1.0)
        {
            return Err(SVMError::InvalidParameter(format!(
                "nu must be in (0, 1], got {}",
                self.nu
            )));
        }
        if svm_type == SvmType::EpsilonSvr && (!(self.epsilon >= 0.0) || !self.epsilon.is_finite()) {
            return Err(SVMError::InvalidParameter(format!(
                "epsilon must be non-negative, got {}",
                self.epsilon
            )));
        }
        if !self.class_weight.is_empty() && svm_type != SvmType::CSvc {
            return Err(SVMError::InvalidParameter(format!(
                "class weights are only supported by c_svc, not {svm_type}"
            )));
        }
        if let Some((label, w)) = self
            .class_weight
            .iter()
            .find(|(_, w)| !(**w >= 0.0) || !w.is_finite())
        {
            return Err(SVMError::InvalidParameter(format!(
                "weight of class {label} must be non-negative, got {w}"
            )));
        }
        if self.probability && svm_type == SvmType::OneClass {
            return Err(SVMError::InvalidParameter(
                "probability estimates are not available for one_class".to_string(),
            ));
        }
        if self.n_jobs == Some(0) {
            return Err(SVMError::InvalidParameter(
                "n_jobs must be at least 1".to_string(),
            ));
        }
        self.memory_budget_bytes()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_vector_creation() {
        let sv = SparseVector::new(vec![2, 0, 4], vec![2.0, 1.0, 3.0]);

        assert_eq!(sv.indices, vec![0, 2, 4]);
        assert_eq!(sv.values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_sparse_vector_get() {
        let sv = SparseVector::new(vec![1, 3, 5], vec![1.0, 2.0, 3.0]);

        assert_eq!(sv.get(0), 0.0);
        assert_eq!(sv.get(1), 1.0);
        assert_eq!(sv.get(3), 2.0);
        assert_eq!(sv.get(5), 3.0);
        assert_eq!(sv.get(6), 0.0);
    }

    #[test]
    fn test_sparse_vector_from_dense_drops_zeros() {
        let sv = SparseVector::from_dense(&[0.0, 1.5, 0.0, -2.0]);
        assert_eq!(sv.indices, vec![1, 3]);
        assert_eq!(sv.values, vec![1.5, -2.0]);
        assert_eq!(sv.to_dense(4), vec![0.0, 1.5, 0.0, -2.0]);
        assert_eq!(sv.max_index(), Some(3));
    }

    #[test]
    fn test_try_from_sorted_rejects_unsorted() {
        assert!(SparseVector::try_from_sorted(vec![0, 2], vec![1.0, 2.0]).is_ok());
        assert!(matches!(
            SparseVector::try_from_sorted(vec![2, 2], vec![1.0, 2.0]),
            Err(SVMError::InvalidDataset(_))
        ));
        assert!(matches!(
            SparseVector::try_from_sorted(vec![3, 1], vec![1.0, 2.0]),
            Err(SVMError::InvalidDataset(_))
        ));
        assert!(SparseVector::try_from_sorted(vec![0], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_sparse_dot() {
        let x = SparseVector::new(vec![0, 2, 5], vec![1.0, 3.0, 2.0]);
        let y = SparseVector::new(vec![2, 3, 5], vec![2.0, 1.0, 4.0]);
        assert_eq!(x.dot(&y), 14.0);
        assert_eq!(x.dot(&SparseVector::empty()), 0.0);
        assert_eq!(x.norm_squared(), 14.0);
    }

    #[test]
    #[should_panic(expected = "Indices and values must have same length")]
    fn test_sparse_vector_length_mismatch() {
        SparseVector::new(vec![0, 1], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_type_names_round_trip() {
        for t in SvmType::ALL {
            assert_eq!(t.name().parse::<SvmType>().unwrap(), t);
            assert_eq!(SvmType::from_code(t.code()).unwrap(), t);
        }
        for k in KernelType::ALL {
            assert_eq!(k.to_string().parse::<KernelType>().unwrap(), k);
            assert_eq!(KernelType::from_code(k.code()).unwrap(), k);
        }
        assert!("laplacian".parse::<KernelType>().is_err());
        assert!(KernelType::from_code(7).is_err());
        assert!(SvmType::from_code(-1).is_err());
    }

    #[test]
    fn test_params_default() {
        let params = SvmParams::default();
        assert_eq!(params.kernel, KernelType::Rbf);
        assert_eq!(params.degree, 3);
        assert_eq!(params.c, 1.0);
        assert_eq!(params.tol, 0.001);
        assert!(params.gamma.is_none());
        assert_eq!(params.resolved_gamma(4), 0.25);
        assert_eq!(params.memory_budget_bytes().unwrap(), 100 * 1024 * 1024);
        assert!(params.validate(SvmType::CSvc).is_ok());
    }

    #[test]
    fn test_params_validation() {
        let bad_c = SvmParams {
            c: 0.0,
            ..Default::default()
        };
        assert!(bad_c.validate(SvmType::CSvc).is_err());
        // C is ignored by nu_svc
        assert!(bad_c.validate(SvmType::NuSvc).is_ok());

        let bad_nu = SvmParams {
            nu: 1.5,
            ..Default::default()
        };
        assert!(bad_nu.validate(SvmType::OneClass).is_err());

        let mut weighted = SvmParams::default();
        weighted.class_weight.insert(1, 2.0);
        assert!(weighted.validate(SvmType::CSvc).is_ok());
        assert!(weighted.validate(SvmType::EpsilonSvr).is_err());

        let prob = SvmParams {
            probability: true,
            ..Default::default()
        };
        assert!(prob.validate(SvmType::OneClass).is_err());

        let huge = SvmParams {
            max_mem_size: Some(usize::MAX),
            ..Default::default()
        };
        assert!(matches!(
            huge.validate(SvmType::CSvc),
            Err(SVMError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_params_from_json() {
        let params = SvmParams::from_json_str(
            r#"{"kernel": "polynomial", "degree": 2, "c": 10.0, "class_weight": {"1": 2.5}}"#,
        )
        .unwrap();
        assert_eq!(params.kernel, KernelType::Polynomial);
        assert_eq!(params.degree, 2);
        assert_eq!(params.c, 10.0);
        assert_eq!(params.class_weight.get(&1), Some(&2.5));
        // unspecified fields keep their defaults
        assert_eq!(params.nu, 0.5);

        let text = params.to_json_string().unwrap();
        assert_eq!(SvmParams::from_json_str(&text).unwrap(), params);

        assert!(SvmParams::from_json_str(r#"{"kernel": "laplacian"}"#).is_err());
    }

    #[test]
    fn test_status_merge() {
        assert_eq!(
            SolveStatus::Converged.merge(SolveStatus::Converged),
            SolveStatus::Converged
        );
        assert_eq!(
            SolveStatus::Converged.merge(SolveStatus::MaxIterReached),
            SolveStatus::MaxIterReached
        );
    }
}
