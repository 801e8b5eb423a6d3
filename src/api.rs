//! High-level API for Support Vector Machine operations
//!
//! This module provides a typed interface for training, prediction,
//! evaluation and persistence.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use svm_engine::api::SVM;
//! use svm_engine::core::KernelType;
//! use svm_engine::data::DenseMatrix;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let x = DenseMatrix::from_rows(&[
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.2],
//!     vec![3.0, 3.0],
//!     vec![3.2, 2.9],
//! ])?;
//! let y = [0.0, 0.0, 1.0, 1.0];
//!
//! let model = SVM::new()
//!     .with_kernel(KernelType::Rbf)
//!     .with_c(10.0)
//!     .fit(&x, &y)?;
//!
//! println!("Accuracy: {:.2}%", model.accuracy(&x, &y)? * 100.0);
//! model.save("model.txt")?;
//! # Ok(())
//! # }
//! ```

use crate::core::{
    Dataset, KernelType, Result, SVMError, SparseVector, SvmParams, SvmType, WorkingSetStrategy,
};
use crate::model::FittedModel;
use crate::optimizer::{SVMOptimizer, TrainingReport};
use crate::persistence;
use crate::predict::Predictor;
use std::collections::BTreeMap;
use std::path::Path;

/// High-level SVM interface with builder pattern
#[derive(Debug, Clone)]
pub struct SVM {
    svm_type: SvmType,
    params: SvmParams,
}

impl SVM {
    /// C-SVC with default parameters
    pub fn new() -> Self {
        Self::with_type(SvmType::CSvc)
    }

    /// Default parameters for formulation `svm_type`
    pub fn with_type(svm_type: SvmType) -> Self {
        Self {
            svm_type,
            params: SvmParams::default(),
        }
    }

    pub fn nu_classifier() -> Self {
        Self::with_type(SvmType::NuSvc)
    }

    pub fn one_class() -> Self {
        Self::with_type(SvmType::OneClass)
    }

    pub fn epsilon_regressor() -> Self {
        Self::with_type(SvmType::EpsilonSvr)
    }

    pub fn nu_regressor() -> Self {
        Self::with_type(SvmType::NuSvr)
    }

    /// Replace the whole hyperparameter set
    pub fn with_params(mut self, params: SvmParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelType) -> Self {
        self.params.kernel = kernel;
        self
    }

    /// Set regularization parameter C
    pub fn with_c(mut self, c: f64) -> Self {
        self.params.c = c;
        self
    }

    pub fn with_nu(mut self, nu: f64) -> Self {
        self.params.nu = nu;
        self
    }

    /// Width of the epsilon-insensitive tube
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.params.epsilon = epsilon;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.params.gamma = Some(gamma);
        self
    }

    /// Use `1 / n_features` as gamma
    pub fn with_auto_gamma(mut self) -> Self {
        self.params.gamma = None;
        self
    }

    pub fn with_degree(mut self, degree: u32) -> Self {
        self.params.degree = degree;
        self
    }

    pub fn with_coef0(mut self, coef0: f64) -> Self {
        self.params.coef0 = coef0;
        self
    }

    /// Set convergence tolerance
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.params.tol = tol;
        self
    }

    pub fn with_probability(mut self, probability: bool) -> Self {
        self.params.probability = probability;
        self
    }

    /// Multiply C by `weight` for class `label`
    pub fn with_class_weight(mut self, label: i32, weight: f64) -> Self {
        self.params.class_weight.insert(label, weight);
        self
    }

    pub fn with_class_weights(mut self, weights: BTreeMap<i32, f64>) -> Self {
        self.params.class_weight = weights;
        self
    }

    pub fn with_shrinking(mut self, shrinking: bool) -> Self {
        self.params.shrinking = shrinking;
        self
    }

    /// Cap the iterations of every subproblem
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.params.max_iter = Some(max_iter);
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.params.n_jobs = Some(n_jobs);
        self
    }

    /// Set kernel cache size in MB
    pub fn with_max_mem_size(mut self, megabytes: usize) -> Self {
        self.params.max_mem_size = Some(megabytes);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.params.random_state = seed;
        self
    }

    pub fn with_working_set(mut self, strategy: WorkingSetStrategy) -> Self {
        self.params.working_set = strategy;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.params.verbose = verbose;
        self
    }

    pub fn svm_type(&self) -> SvmType {
        self.svm_type
    }

    pub fn params(&self) -> &SvmParams {
        &self.params
    }

    /// Train on a dataset
    ///
    /// `y` holds class labels, regression targets, or is ignored for
    /// one-class models.
    pub fn fit<D: Dataset>(&self, x: &D, y: &[f64]) -> Result<TrainedModel> {
        let optimizer = SVMOptimizer::new(self.svm_type, self.params.clone())?;
        let outcome = optimizer.fit(x, y)?;
        Ok(TrainedModel {
            model: outcome.model,
            report: Some(outcome.report),
        })
    }
}

impl Default for SVM {
    fn default() -> Self {
        Self::new()
    }
}

/// Trained SVM model with high-level prediction interface
#[derive(Debug, Clone)]
pub struct TrainedModel {
    model: FittedModel,
    report: Option<TrainingReport>,
}

impl TrainedModel {
    /// Wrap a model obtained elsewhere, e.g. from a file
    pub fn from_model(model: FittedModel) -> Self {
        Self {
            model,
            report: None,
        }
    }

    /// Load a model saved with [`TrainedModel::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_model(persistence::load_model(path)?))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persistence::save_model(&self.model, path)
    }

    /// Predict a single row
    pub fn predict_row(&self, x: &SparseVector) -> Result<f64> {
        Predictor::new(&self.model)?.predict_row(x)
    }

    /// Labels, regression values or one-class flags, one per row
    pub fn predict<D: Dataset>(&self, x: &D) -> Result<Vec<f64>> {
        Predictor::new(&self.model)?.predict_batch(x)
    }

    /// Class probabilities per row, in the order of [`FittedModel::labels`]
    pub fn predict_proba<D: Dataset>(&self, x: &D) -> Result<Vec<Vec<f64>>> {
        let (_, probabilities) = Predictor::new(&self.model)?.predict_probability_batch(x)?;
        Ok(probabilities)
    }

    /// Decision values per row, one per binary model
    pub fn decision_function<D: Dataset>(&self, x: &D) -> Result<Vec<Vec<f64>>> {
        Predictor::new(&self.model)?.decision_values_batch(x)
    }

    /// Fraction of rows whose prediction equals the reference label
    pub fn accuracy<D: Dataset>(&self, x: &D, y: &[f64]) -> Result<f64> {
        if y.len() != x.len() {
            return Err(SVMError::DimensionMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        if y.is_empty() {
            return Err(SVMError::EmptyDataset);
        }
        let predictions = self.predict(x)?;
        let correct = predictions
            .iter()
            .zip(y)
            .filter(|(p, actual)| p == actual)
            .count();
        Ok(correct as f64 / y.len() as f64)
    }

    /// Mean squared error of a regression model
    pub fn mean_squared_error<D: Dataset>(&self, x: &D, y: &[f64]) -> Result<f64> {
        if y.len() != x.len() {
            return Err(SVMError::DimensionMismatch {
                expected: x.len(),
                actual: y.len(),
            });
        }
        if y.is_empty() {
            return Err(SVMError::EmptyDataset);
        }
        let predictions = self.predict(x)?;
        let sum: f64 = predictions.iter().zip(y).map(|(p, t)| (p - t).powi(2)).sum();
        Ok(sum / y.len() as f64)
    }

    /// Laplace scale of a calibrated regression model
    pub fn svr_probability_sigma(&self) -> Option<f64> {
        self.model.svr_probability_sigma()
    }

    /// Get model information
    pub fn info(&self) -> ModelInfo {
        let model = &self.model;
        ModelInfo {
            svm_type: model.svm_type(),
            kernel: model.kernel_spec().kernel,
            n_features: model.n_features(),
            n_classes: model.n_classes(),
            labels: model.labels().to_vec(),
            n_support_vectors: model.n_sv(),
            n_support_per_class: model.n_support_per_class().to_vec(),
            intercepts: model.intercepts(),
            has_probability: model.has_probability(),
        }
    }

    /// Training summary; `None` for loaded models
    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    /// Get the underlying fitted model
    pub fn inner(&self) -> &FittedModel {
        &self.model
    }

    pub fn into_inner(self) -> FittedModel {
        self.model
    }
}

/// Model information
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub svm_type: SvmType,
    pub kernel: KernelType,
    pub n_features: usize,
    pub n_classes: usize,
    pub labels: Vec<i32>,
    pub n_support_vectors: usize,
    pub n_support_per_class: Vec<usize>,
    /// `−rho` of every binary model
    pub intercepts: Vec<f64>,
    pub has_probability: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SolveStatus;
    use crate::data::DenseMatrix;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    fn blobs() -> (DenseMatrix, Vec<f64>) {
        let x = DenseMatrix::from_rows(&[
            vec![0.0, 0.0],
            vec![0.3, 0.1],
            vec![0.1, 0.4],
            vec![3.0, 3.0],
            vec![3.2, 2.8],
            vec![2.9, 3.3],
        ])
        .unwrap();
        (x, vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0])
    }

    #[test]
    fn test_svm_builder_pattern() {
        let svm = SVM::nu_classifier()
            .with_kernel(KernelType::Polynomial)
            .with_nu(0.3)
            .with_degree(2)
            .with_gamma(0.5)
            .with_class_weight(1, 2.0)
            .with_max_iter(5000)
            .with_n_jobs(2);

        assert_eq!(svm.svm_type(), SvmType::NuSvc);
        assert_eq!(svm.params().nu, 0.3);
        assert_eq!(svm.params().degree, 2);
        assert_eq!(svm.params().gamma, Some(0.5));
        assert_eq!(svm.params().class_weight.get(&1), Some(&2.0));
        assert_eq!(svm.params().max_iter, Some(5000));
        assert_eq!(svm.with_auto_gamma().params().gamma, None);
    }

    #[test]
    fn test_fit_and_predict() {
        let (x, y) = blobs();
        let model = SVM::new().with_kernel(KernelType::Linear).fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        assert_relative_eq!(model.accuracy(&x, &y).unwrap(), 1.0);

        let info = model.info();
        assert_eq!(info.n_classes, 2);
        assert_eq!(info.labels, vec![0, 1]);
        assert_eq!(info.intercepts.len(), 1);
        assert!(info.n_support_vectors > 0);
        assert_eq!(model.report().map(|r| r.status), Some(SolveStatus::Converged));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let (x, y) = blobs();
        let err = SVM::new().with_c(-1.0).fit(&x, &y).unwrap_err();
        assert!(matches!(err, SVMError::InvalidParameter(_)));

        let err = SVM::one_class().with_probability(true).fit(&x, &y).unwrap_err();
        assert!(matches!(err, SVMError::InvalidParameter(_)));
    }

    #[test]
    fn test_accuracy_length_mismatch() {
        let (x, y) = blobs();
        let model = SVM::new().fit(&x, &y).unwrap();
        assert!(matches!(
            model.accuracy(&x, &y[..3]),
            Err(SVMError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let (x, y) = blobs();
        let model = SVM::new().with_gamma(0.5).fit(&x, &y).unwrap();
        let file = NamedTempFile::new().unwrap();
        model.save(file.path()).unwrap();

        let loaded = TrainedModel::load(file.path()).unwrap();
        assert!(loaded.report().is_none());
        assert_eq!(loaded.info(), model.info());
        assert_eq!(
            loaded.decision_function(&x).unwrap(),
            model.decision_function(&x).unwrap()
        );
    }

    #[test]
    fn test_regression_helpers() {
        let x = DenseMatrix::from_rows(&[vec![0.0], vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        let y = vec![0.0, 2.0, 4.0, 6.0];
        let model = SVM::epsilon_regressor()
            .with_kernel(KernelType::Linear)
            .with_c(100.0)
            .with_epsilon(0.01)
            .fit(&x, &y)
            .unwrap();

        assert!(model.mean_squared_error(&x, &y).unwrap() < 0.01);
        assert!(model.decision_function(&x).is_err());
        assert_eq!(model.svr_probability_sigma(), None);
    }
}
