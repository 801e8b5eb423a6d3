//! Flat-array boundary layer
//!
//! Host-language wrappers exchange plain buffers with the engine: row-major
//! dense matrices, CSR triples, flat result arrays and integer status flags.
//! Everything here converts those buffers into the typed containers of the
//! crate, calls the engine and flattens the results again. A
//! [`ModelHandle`] owns at most one fitted model at a time.

use crate::core::{Dataset, KernelType, Result, SVMError, SvmParams, SvmType};
use crate::data::{CsrMatrix, DenseMatrix};
use crate::model::FittedModel;
use crate::optimizer::{SVMOptimizer, TrainingOutcome, TrainingReport};
use crate::persistence;
use crate::predict::Predictor;
use log::{error, info, warn};
use std::path::Path;

/// Status flag of a successful fit
pub const SUCCESS: i32 = 1;
/// Status flag of a failed fit
pub const FAILURE: i32 = -1;

/// A model slot plus the state the boundary keeps between calls
#[derive(Debug)]
pub struct ModelHandle {
    svm_type: SvmType,
    model: Option<FittedModel>,
    report: Option<TrainingReport>,
    probabilities: Option<Vec<f64>>,
    last_error: Option<SVMError>,
}

impl ModelHandle {
    pub fn new(svm_type: SvmType) -> Self {
        Self {
            svm_type,
            model: None,
            report: None,
            probabilities: None,
            last_error: None,
        }
    }

    pub fn svm_type(&self) -> SvmType {
        self.svm_type
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&FittedModel> {
        self.model.as_ref()
    }

    /// Summary of the last successful fit
    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    /// Error of the last failed fit
    pub fn last_error(&self) -> Option<&SVMError> {
        self.last_error.as_ref()
    }

    fn fitted(&self) -> Result<&FittedModel> {
        self.model.as_ref().ok_or(SVMError::ModelNotTrained)
    }

    pub fn n_sv(&self) -> Result<usize> {
        Ok(self.fitted()?.n_sv())
    }

    pub fn n_classes(&self) -> Result<usize> {
        Ok(self.fitted()?.n_classes())
    }

    pub fn n_binary_models(&self) -> Result<usize> {
        Ok(self.fitted()?.n_binary_models())
    }

    pub fn n_features(&self) -> Result<usize> {
        Ok(self.fitted()?.n_features())
    }
}

/// `create_model`: an empty handle for SVM kind `svm_kind` (0..=4)
pub fn create_model(svm_kind: i32) -> Result<ModelHandle> {
    Ok(ModelHandle::new(SvmType::from_code(svm_kind)?))
}

/// Hyperparameters as primitive values, with the usual sentinels
///
/// `gamma <= 0` selects `1 / n_features`; `max_iter`, `n_jobs` and
/// `max_mem_size` of `-1` select unlimited, all cores and the default
/// budget respectively.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatParams {
    pub kernel: i32,
    pub degree: i32,
    pub gamma: f64,
    pub coef0: f64,
    pub c: f64,
    pub nu: f64,
    pub epsilon: f64,
    pub tol: f64,
    pub probability: bool,
    pub weight_labels: Vec<i32>,
    pub weights: Vec<f64>,
    pub shrinking: bool,
    pub verbose: bool,
    pub max_iter: i32,
    pub n_jobs: i32,
    pub max_mem_size: i32,
    pub random_state: u64,
}

impl Default for FlatParams {
    fn default() -> Self {
        Self {
            kernel: KernelType::Rbf.code(),
            degree: 3,
            gamma: 0.0,
            coef0: 0.0,
            c: 1.0,
            nu: 0.5,
            epsilon: 0.1,
            tol: 0.001,
            probability: false,
            weight_labels: Vec::new(),
            weights: Vec::new(),
            shrinking: false,
            verbose: false,
            max_iter: -1,
            n_jobs: -1,
            max_mem_size: -1,
            random_state: 0,
        }
    }
}

fn optional_count(name: &str, value: i32) -> Result<Option<usize>> {
    match value {
        -1 => Ok(None),
        v if v >= 0 => Ok(Some(v as usize)),
        v => Err(SVMError::InvalidParameter(format!(
            "{name} must be -1 or non-negative, got {v}"
        ))),
    }
}

impl FlatParams {
    pub fn to_params(&self) -> Result<SvmParams> {
        if self.weight_labels.len() != self.weights.len() {
            return Err(SVMError::InvalidParameter(format!(
                "{} weight labels but {} weights",
                self.weight_labels.len(),
                self.weights.len()
            )));
        }
        let degree = u32::try_from(self.degree).map_err(|_| {
            SVMError::InvalidParameter(format!("degree must be non-negative, got {}", self.degree))
        })?;
        Ok(SvmParams {
            kernel: KernelType::from_code(self.kernel)?,
            degree,
            gamma: (self.gamma > 0.0).then_some(self.gamma),
            coef0: self.coef0,
            c: self.c,
            nu: self.nu,
            epsilon: self.epsilon,
            tol: self.tol,
            probability: self.probability,
            class_weight: self
                .weight_labels
                .iter()
                .copied()
                .zip(self.weights.iter().copied())
                .collect(),
            shrinking: self.shrinking,
            max_iter: optional_count("max_iter", self.max_iter)?,
            n_jobs: optional_count("n_jobs", self.n_jobs)?,
            max_mem_size: optional_count("max_mem_size", self.max_mem_size)?,
            random_state: self.random_state,
            working_set: Default::default(),
            verbose: self.verbose,
        })
    }
}

/// Outcome of `train_dense` / `train_sparse`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainSummary {
    pub n_features: usize,
    pub n_classes: usize,
    /// [`SUCCESS`] or [`FAILURE`]; a fit that hit `max_iter` still succeeds
    pub success: i32,
}

fn finish_training(
    handle: &mut ModelHandle,
    outcome: Result<TrainingOutcome>,
) -> TrainSummary {
    match outcome {
        Ok(outcome) => {
            let summary = TrainSummary {
                n_features: outcome.model.n_features(),
                n_classes: outcome.model.n_classes(),
                success: SUCCESS,
            };
            handle.model = Some(outcome.model);
            handle.report = Some(outcome.report);
            summary
        }
        Err(e) => {
            error!("Training failed: {e}");
            handle.last_error = Some(e);
            TrainSummary {
                n_features: 0,
                n_classes: 0,
                success: FAILURE,
            }
        }
    }
}

fn reset_for_training(handle: &mut ModelHandle) {
    if handle.model.take().is_some() {
        info!("Discarding the previous model before refitting");
    }
    handle.report = None;
    handle.probabilities = None;
    handle.last_error = None;
}

/// `train_dense`: fit on a row-major `samples × features` matrix
pub fn train_dense(
    handle: &mut ModelHandle,
    samples: usize,
    features: usize,
    data: &[f64],
    labels: &[f64],
    params: &SvmParams,
) -> TrainSummary {
    reset_for_training(handle);
    let outcome = DenseMatrix::new(samples, features, data.to_vec()).and_then(|x| {
        SVMOptimizer::new(handle.svm_type, params.clone())?.fit(&x, labels)
    });
    finish_training(handle, outcome)
}

/// `train_sparse`: fit on a CSR matrix of `row_count × n_cols`
///
/// `n_cols` is the feature count of the model even when trailing columns
/// hold no stored values, so automatic gamma matches a dense fit.
pub fn train_sparse(
    handle: &mut ModelHandle,
    row_count: usize,
    n_cols: usize,
    values: &[f64],
    row_ptr: &[usize],
    col_idx: &[usize],
    labels: &[f64],
    params: &SvmParams,
) -> TrainSummary {
    reset_for_training(handle);
    let outcome = csr(row_count, n_cols, values, row_ptr, col_idx).and_then(|x| {
        SVMOptimizer::new(handle.svm_type, params.clone())?.fit(&x, labels)
    });
    finish_training(handle, outcome)
}

fn csr(
    row_count: usize,
    n_cols: usize,
    values: &[f64],
    row_ptr: &[usize],
    col_idx: &[usize],
) -> Result<CsrMatrix> {
    let x = CsrMatrix::new(
        row_ptr.to_vec(),
        col_idx.to_vec(),
        values.to_vec(),
        Some(n_cols),
    )?;
    if x.n_rows() != row_count {
        return Err(SVMError::DimensionMismatch {
            expected: row_count,
            actual: x.n_rows(),
        });
    }
    Ok(x)
}

/// Columns past the model's feature count are accepted, as they are for sparse rows
fn dense_for_model(
    model: &FittedModel,
    samples: usize,
    features: usize,
    data: &[f64],
) -> Result<DenseMatrix> {
    if features < model.n_features() {
        return Err(SVMError::DimensionMismatch {
            expected: model.n_features(),
            actual: features,
        });
    }
    DenseMatrix::new(samples, features, data.to_vec())
}

/// `get_support_vectors`: CSR triple `(row_ptr, col_idx, values)`
pub fn get_support_vectors(handle: &ModelHandle) -> Result<(Vec<usize>, Vec<usize>, Vec<f64>)> {
    let csr = handle.fitted()?.support_vectors_csr();
    Ok((
        csr.row_ptr().to_vec(),
        csr.col_idx().to_vec(),
        csr.values().to_vec(),
    ))
}

fn expect_size(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        warn!("{what}: caller expects {actual}, model has {expected}");
        return Err(SVMError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// `get_dual_coefficients`: row-major `(n_classes − 1) × n_sv`
pub fn get_dual_coefficients(handle: &ModelHandle, n_classes: usize, n_sv: usize) -> Result<Vec<f64>> {
    let model = handle.fitted()?;
    expect_size("n_classes", model.n_classes(), n_classes)?;
    expect_size("n_sv", model.n_sv(), n_sv)?;
    Ok(model.dual_coef_flat())
}

/// `get_intercepts`: the `rho` of every binary model
pub fn get_intercepts(handle: &ModelHandle, count: usize) -> Result<Vec<f64>> {
    let model = handle.fitted()?;
    expect_size("intercept count", model.n_binary_models(), count)?;
    Ok(model.rho().to_vec())
}

/// `get_support_counts_per_class`
///
/// Regression and one-class models have no classes and report zeros.
pub fn get_support_counts_per_class(handle: &ModelHandle, n_classes: usize) -> Result<Vec<usize>> {
    let model = handle.fitted()?;
    expect_size("n_classes", model.n_classes(), n_classes)?;
    if model.svm_type().is_classification() {
        Ok(model.n_support_per_class().to_vec())
    } else {
        Ok(vec![0; n_classes])
    }
}

/// Predict with a model, recording class probabilities when it is calibrated
fn predict_into<D: Dataset>(handle: &mut ModelHandle, x: &D) -> Result<Vec<f64>> {
    handle.probabilities = None;
    let model = handle.fitted()?;
    let predictor = Predictor::new(model)?;
    if model.svm_type().is_classification() && model.has_probability() {
        let (labels, probabilities) = predictor.predict_probability_batch(x)?;
        handle.probabilities = Some(probabilities.concat());
        Ok(labels)
    } else {
        predictor.predict_batch(x)
    }
}

/// `predict_dense`: one label (or value) per row
pub fn predict_dense(
    handle: &mut ModelHandle,
    samples: usize,
    features: usize,
    data: &[f64],
) -> Result<Vec<f64>> {
    let x = dense_for_model(handle.fitted()?, samples, features, data)?;
    predict_into(handle, &x)
}

/// `predict_sparse`: one label (or value) per CSR row
pub fn predict_sparse(
    handle: &mut ModelHandle,
    row_count: usize,
    n_cols: usize,
    values: &[f64],
    row_ptr: &[usize],
    col_idx: &[usize],
) -> Result<Vec<f64>> {
    let x = csr(row_count, n_cols, values, row_ptr, col_idx)?;
    predict_into(handle, &x)
}

/// `predict_probabilities`: `samples × n_classes` from the last prediction
pub fn predict_probabilities(handle: &ModelHandle) -> Result<Vec<f64>> {
    let model = handle.fitted()?;
    if !model.has_probability() || !model.svm_type().is_classification() {
        return Err(SVMError::ProbabilityNotFitted);
    }
    handle.probabilities.clone().ok_or_else(|| {
        SVMError::InvalidParameter("no prediction has been made with this model".to_string())
    })
}

/// `decision_values_dense`: `samples × n_binary_models`, row-major
pub fn decision_values_dense(
    handle: &ModelHandle,
    samples: usize,
    features: usize,
    data: &[f64],
) -> Result<Vec<f64>> {
    let model = handle.fitted()?;
    let x = dense_for_model(model, samples, features, data)?;
    Ok(Predictor::new(model)?.decision_values_batch(&x)?.concat())
}

/// `decision_values_sparse`: `row_count × n_binary_models`, row-major
pub fn decision_values_sparse(
    handle: &ModelHandle,
    row_count: usize,
    n_cols: usize,
    values: &[f64],
    row_ptr: &[usize],
    col_idx: &[usize],
) -> Result<Vec<f64>> {
    let model = handle.fitted()?;
    let x = csr(row_count, n_cols, values, row_ptr, col_idx)?;
    Ok(Predictor::new(model)?.decision_values_batch(&x)?.concat())
}

/// `save_model`
pub fn save_model<P: AsRef<Path>>(handle: &ModelHandle, path: P) -> Result<()> {
    persistence::save_model(handle.fitted()?, path)
}

/// `load_model`: replaces the handle's model only when loading succeeds
pub fn load_model<P: AsRef<Path>>(handle: &mut ModelHandle, path: P) -> Result<()> {
    let model = persistence::load_model(path)?;
    handle.svm_type = model.svm_type();
    handle.model = Some(model);
    handle.report = None;
    handle.probabilities = None;
    Ok(())
}
