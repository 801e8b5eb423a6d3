//! Prediction engine
//!
//! A [`Predictor`] borrows a [`FittedModel`] and evaluates it on new rows:
//! decision values per binary model, one-vs-one voting, calibrated class
//! probabilities, regression values and one-class inlier flags.

use crate::core::{Dataset, Result, SVMError, SparseVector, SvmType, KernelType};
use crate::kernel::KernelFunction;
use crate::model::FittedModel;
use crate::optimizer::probability::{multiclass_probability, sigmoid_predict, MIN_PROB};
use log::debug;
use rayon::prelude::*;

/// Evaluates a fitted model on new rows
#[derive(Debug, Clone)]
pub struct Predictor<'m> {
    model: &'m FittedModel,
    kernel: KernelFunction,
    sv_norms: Vec<f64>,
    sv_ids: Vec<usize>,
    starts: Vec<usize>,
}

impl<'m> Predictor<'m> {
    pub fn new(model: &'m FittedModel) -> Result<Self> {
        let kernel = model.kernel_function()?;
        let sv_norms = if kernel.needs_norms() {
            model
                .support_vectors()
                .iter()
                .map(SparseVector::norm_squared)
                .collect()
        } else {
            vec![0.0; model.n_sv()]
        };
        let sv_ids = match model.support_indices() {
            Some(ids) => ids.to_vec(),
            None if model.kernel_spec().kernel == KernelType::Precomputed => {
                return Err(SVMError::InvalidDataset(
                    "precomputed model does not record its support vector rows".to_string(),
                ))
            }
            None => vec![0; model.n_sv()],
        };
        Ok(Self {
            model,
            kernel,
            sv_norms,
            sv_ids,
            starts: model.class_starts(),
        })
    }

    pub fn model(&self) -> &FittedModel {
        self.model
    }

    fn kernel_values(&self, x: &SparseVector) -> Result<Vec<f64>> {
        let x_norm = if self.kernel.needs_norms() {
            x.norm_squared()
        } else {
            0.0
        };
        self.model
            .support_vectors()
            .iter()
            .zip(&self.sv_norms)
            .zip(&self.sv_ids)
            .map(|((sv, &sv_norm), &id)| self.kernel.evaluate(x, x_norm, sv, sv_norm, id))
            .collect()
    }

    /// Decision values of every binary model, for any formulation
    fn raw_decision_values(&self, x: &SparseVector) -> Result<Vec<f64>> {
        let kvalue = self.kernel_values(x)?;
        let model = self.model;

        if !model.svm_type().is_classification() {
            let sum: f64 = model.dual_coef()[0]
                .iter()
                .zip(&kvalue)
                .map(|(c, k)| c * k)
                .sum();
            return Ok(vec![sum - model.rho()[0]]);
        }

        let counts = model.n_support_per_class();
        let coef = model.dual_coef();
        let k = counts.len();
        let mut values = Vec::with_capacity(model.n_binary_models());
        let mut p = 0;
        for i in 0..k {
            for j in i + 1..k {
                let range_i = self.starts[i]..self.starts[i] + counts[i];
                let range_j = self.starts[j]..self.starts[j] + counts[j];
                let sum_i: f64 = range_i.map(|s| coef[j - 1][s] * kvalue[s]).sum();
                let sum_j: f64 = range_j.map(|s| coef[i][s] * kvalue[s]).sum();
                values.push(sum_i + sum_j - model.rho()[p]);
                p += 1;
            }
        }
        Ok(values)
    }

    /// Decision values of one row, one per binary model
    ///
    /// Refused for regression models, whose single decision value is the
    /// prediction itself.
    pub fn decision_values(&self, x: &SparseVector) -> Result<Vec<f64>> {
        if self.model.svm_type().is_regression() {
            return Err(SVMError::InvalidParameter(format!(
                "decision values are not available for {} models",
                self.model.svm_type()
            )));
        }
        self.raw_decision_values(x)
    }

    /// Predicted label, regression value or one-class flag (+1 / −1)
    pub fn predict_row(&self, x: &SparseVector) -> Result<f64> {
        let values = self.raw_decision_values(x)?;
        Ok(match self.model.svm_type() {
            SvmType::EpsilonSvr | SvmType::NuSvr => values[0],
            SvmType::OneClass => {
                if values[0] > 0.0 {
                    1.0
                } else {
                    -1.0
                }
            }
            SvmType::CSvc | SvmType::NuSvc => {
                let winner = vote(&values, self.model.labels().len());
                self.model.labels()[winner] as f64
            }
        })
    }

    /// Class probabilities (in class order) and the most probable label
    pub fn predict_probability_row(&self, x: &SparseVector) -> Result<(f64, Vec<f64>)> {
        let model = self.model;
        if !model.svm_type().is_classification() {
            return Err(SVMError::InvalidParameter(format!(
                "class probabilities are not available for {} models",
                model.svm_type()
            )));
        }
        if !model.has_probability() {
            return Err(SVMError::ProbabilityNotFitted);
        }

        let values = self.raw_decision_values(x)?;
        let k = model.labels().len();
        let mut pairwise = vec![vec![0.0; k]; k];
        let mut p = 0;
        for i in 0..k {
            for j in i + 1..k {
                let r = sigmoid_predict(values[p], model.prob_a()[p], model.prob_b()[p])
                    .clamp(MIN_PROB, 1.0 - MIN_PROB);
                pairwise[i][j] = r;
                pairwise[j][i] = 1.0 - r;
                p += 1;
            }
        }

        let probabilities = if k == 2 {
            vec![pairwise[0][1], pairwise[1][0]]
        } else {
            multiclass_probability(&pairwise)
        };
        let best = argmax(&probabilities);
        Ok((model.labels()[best] as f64, probabilities))
    }

    /// Decision values of every row, in input order
    pub fn decision_values_batch<D: Dataset>(&self, x: &D) -> Result<Vec<Vec<f64>>> {
        debug!("Decision values for {} rows", x.len());
        (0..x.len())
            .into_par_iter()
            .map(|i| self.decision_values(&x.row(i)))
            .collect()
    }

    /// Predictions for every row, in input order
    pub fn predict_batch<D: Dataset>(&self, x: &D) -> Result<Vec<f64>> {
        debug!(
            "Predicting {} rows against {} support vectors",
            x.len(),
            self.model.n_sv()
        );
        (0..x.len())
            .into_par_iter()
            .map(|i| self.predict_row(&x.row(i)))
            .collect()
    }

    /// Labels and class probabilities for every row, in input order
    pub fn predict_probability_batch<D: Dataset>(&self, x: &D) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
        let rows = (0..x.len())
            .into_par_iter()
            .map(|i| self.predict_probability_row(&x.row(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(rows.into_iter().unzip())
    }
}

/// One-vs-one voting over `n_classes`; ties go to the lowest class index
pub fn vote(decision_values: &[f64], n_classes: usize) -> usize {
    let mut votes = vec![0usize; n_classes];
    let mut p = 0;
    for i in 0..n_classes {
        for j in i + 1..n_classes {
            if decision_values[p] > 0.0 {
                votes[i] += 1;
            } else {
                votes[j] += 1;
            }
            p += 1;
        }
    }
    let mut best = 0;
    for (class, &count) in votes.iter().enumerate() {
        if count > votes[best] {
            best = class;
        }
    }
    best
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
