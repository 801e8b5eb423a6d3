//! Multi-class and multi-problem orchestration
//!
//! This module turns one fit request into the binary subproblems the solver
//! understands (one-vs-one pairs for classification, a single problem for
//! regression and one-class), runs them on a rayon pool and assembles the
//! results into a [`FittedModel`].

pub mod probability;

use crate::cache::{CacheStats, KernelCache};
use crate::core::{Dataset, KernelType, Result, SVMError, SolveStatus, SparseVector, SvmParams, SvmType};
use crate::data::validate_labels;
use crate::kernel::{KernelEvaluator, KernelFunction};
use crate::model::{FittedModel, KernelSpec};
use crate::solver::{check_nu_feasible, train_one, DecisionFunction};
use log::{debug, info, log, warn, Level};
use rayon::prelude::*;

/// Rows of one binary (or single) problem, relabelled for the solver
///
/// Rows are borrowed from the training set; `ids` keeps their positions in
/// it so that support vectors can be traced back after the solve.
#[derive(Debug, Clone)]
pub(crate) struct Subproblem<'a> {
    pub(crate) rows: Vec<&'a SparseVector>,
    pub(crate) ids: Vec<usize>,
    pub(crate) y: Vec<f64>,
    pub(crate) c_pos: f64,
    pub(crate) c_neg: f64,
}

impl<'a> Subproblem<'a> {
    /// Class `first` labelled +1 followed by class `second` labelled −1
    fn pair(
        rows: &'a [SparseVector],
        first: &[usize],
        second: &[usize],
        c_pos: f64,
        c_neg: f64,
    ) -> Self {
        let ids: Vec<usize> = first.iter().chain(second).copied().collect();
        let y = std::iter::repeat(1.0)
            .take(first.len())
            .chain(std::iter::repeat(-1.0).take(second.len()))
            .collect();
        Self {
            rows: ids.iter().map(|&i| &rows[i]).collect(),
            ids,
            y,
            c_pos,
            c_neg,
        }
    }

    /// Every row of the training set with its own target
    fn whole(rows: &'a [SparseVector], y: Vec<f64>, c: f64) -> Self {
        Self {
            rows: rows.iter().collect(),
            ids: (0..rows.len()).collect(),
            y,
            c_pos: c,
            c_neg: c,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The rows at `positions`, in that order
    pub(crate) fn select(&self, positions: &[usize]) -> Subproblem<'a> {
        Subproblem {
            rows: positions.iter().map(|&p| self.rows[p]).collect(),
            ids: positions.iter().map(|&p| self.ids[p]).collect(),
            y: positions.iter().map(|&p| self.y[p]).collect(),
            c_pos: self.c_pos,
            c_neg: self.c_neg,
        }
    }

    pub(crate) fn evaluator(&self, kernel: KernelFunction) -> KernelEvaluator<'a> {
        KernelEvaluator::new(kernel, self.rows.clone(), self.ids.clone())
    }
}

/// Everything a subproblem solve needs besides its rows
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrainContext<'a> {
    pub(crate) svm_type: SvmType,
    pub(crate) params: &'a SvmParams,
    pub(crate) kernel: KernelFunction,
    pub(crate) cache: &'a KernelCache,
}

/// Summary of one fit
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// `MaxIterReached` when any subproblem hit the iteration cap
    pub status: SolveStatus,
    pub n_subproblems: usize,
    pub total_iterations: usize,
    pub cache: CacheStats,
}

impl TrainingReport {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// A fitted model together with how the fit went
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: FittedModel,
    pub report: TrainingReport,
}

/// Classes in first-seen order and the rows of each
#[derive(Debug, Clone, PartialEq)]
struct ClassGroups {
    labels: Vec<i32>,
    members: Vec<Vec<usize>>,
}

fn group_classes(y: &[f64]) -> Result<ClassGroups> {
    let mut labels: Vec<i32> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();
    for (row, &value) in y.iter().enumerate() {
        if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
            return Err(SVMError::InvalidLabel(value));
        }
        let label = value as i32;
        match labels.iter().position(|&l| l == label) {
            Some(k) => members[k].push(row),
            None => {
                labels.push(label);
                members.push(vec![row]);
            }
        }
    }
    if labels.len() < 2 {
        return Err(SVMError::InvalidDataset(format!(
            "classification needs at least two classes, got {}",
            labels.len()
        )));
    }
    Ok(ClassGroups { labels, members })
}

/// Result of one classification pair
struct PairSolution {
    decision: DecisionFunction,
    sigmoid: Option<(f64, f64)>,
}

/// Fits SVM models of one formulation with one hyperparameter set
#[derive(Debug, Clone)]
pub struct SVMOptimizer {
    svm_type: SvmType,
    params: SvmParams,
}

impl SVMOptimizer {
    /// Create an optimizer; the hyperparameters are validated here
    pub fn new(svm_type: SvmType, params: SvmParams) -> Result<Self> {
        params.validate(svm_type)?;
        Ok(Self { svm_type, params })
    }

    pub fn svm_type(&self) -> SvmType {
        self.svm_type
    }

    pub fn params(&self) -> &SvmParams {
        &self.params
    }

    /// Train on `x` with labels (or regression targets) `y`
    ///
    /// One-class fitting ignores `y`. With a precomputed kernel `x` must be
    /// the square Gram matrix of the training rows.
    pub fn fit<D: Dataset>(&self, x: &D, y: &[f64]) -> Result<TrainingOutcome> {
        let n = x.len();
        if n == 0 {
            return Err(SVMError::EmptyDataset);
        }
        if self.svm_type != SvmType::OneClass {
            validate_labels(y, n)?;
        }
        let n_features = x.dim();
        if self.params.kernel == KernelType::Precomputed && n_features != n {
            return Err(SVMError::DimensionMismatch {
                expected: n,
                actual: n_features,
            });
        }

        let kernel = KernelFunction::from_params(&self.params, n_features)?;
        let cache = KernelCache::with_memory_limit(self.params.memory_budget_bytes()?);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.params.n_jobs.unwrap_or(0))
            .build()
            .map_err(|e| SVMError::ResourceExhausted(format!("worker pool: {e}")))?;

        info!(
            "Fitting {} ({} kernel) on {} rows with {} features",
            self.svm_type, self.params.kernel, n, n_features
        );

        let rows = x.rows();
        let ctx = TrainContext {
            svm_type: self.svm_type,
            params: &self.params,
            kernel,
            cache: &cache,
        };
        let spec = KernelSpec::from_params(&self.params, n_features);

        let (model, statuses) = if self.svm_type.is_classification() {
            let groups = group_classes(y)?;
            pool.install(|| self.fit_classifier(&rows, &groups, &ctx, spec, n_features))?
        } else {
            pool.install(|| self.fit_single(&rows, y, &ctx, spec, n_features))?
        };

        let status = statuses
            .iter()
            .fold(SolveStatus::Converged, |acc, (s, _)| acc.merge(*s));
        let report = TrainingReport {
            status,
            n_subproblems: statuses.len(),
            total_iterations: statuses.iter().map(|(_, it)| it).sum(),
            cache: cache.stats(),
        };
        if status == SolveStatus::MaxIterReached {
            warn!("Fit finished but at least one subproblem reached max_iter");
        }
        debug!(
            "Kernel cache: {} hits, {} misses, {} evictions, hit rate {:.3}",
            report.cache.hits,
            report.cache.misses,
            report.cache.evictions,
            report.cache.hit_rate()
        );
        info!(
            "Fit done: {} classes, {} support vectors, {} iterations",
            model.n_classes(),
            model.n_sv(),
            report.total_iterations
        );
        Ok(TrainingOutcome { model, report })
    }

    fn subproblem_level(&self) -> Level {
        if self.params.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }

    /// One-vs-one decomposition over `groups`
    fn fit_classifier(
        &self,
        rows: &[SparseVector],
        groups: &ClassGroups,
        ctx: &TrainContext<'_>,
        spec: KernelSpec,
        n_features: usize,
    ) -> Result<(FittedModel, Vec<(SolveStatus, usize)>)> {
        let k = groups.labels.len();

        if let Some(unknown) = self
            .params
            .class_weight
            .keys()
            .find(|label| !groups.labels.contains(label))
        {
            return Err(SVMError::InvalidParameter(format!(
                "class_weight refers to unknown class {unknown}"
            )));
        }
        let class_c: Vec<f64> = groups
            .labels
            .iter()
            .map(|label| self.params.c * self.params.class_weight.get(label).copied().unwrap_or(1.0))
            .collect();

        let pairs: Vec<(usize, usize)> = (0..k)
            .flat_map(|i| (i + 1..k).map(move |j| (i, j)))
            .collect();
        if self.svm_type == SvmType::NuSvc {
            for &(i, j) in &pairs {
                check_nu_feasible(
                    self.params.nu,
                    groups.members[i].len(),
                    groups.members[j].len(),
                )?;
            }
        }

        let level = self.subproblem_level();
        let solutions = pairs
            .par_iter()
            .enumerate()
            .map(|(p, &(i, j))| -> Result<PairSolution> {
                let sub = Subproblem::pair(
                    rows,
                    &groups.members[i],
                    &groups.members[j],
                    class_c[i],
                    class_c[j],
                );
                let decision = train_one(
                    ctx.svm_type,
                    sub.evaluator(ctx.kernel),
                    &sub.y,
                    ctx.params,
                    sub.c_pos,
                    sub.c_neg,
                    ctx.cache,
                )?;
                log!(
                    level,
                    "Subproblem {p} ({} vs {}): {} iterations, rho = {}, nSV = {}",
                    groups.labels[i],
                    groups.labels[j],
                    decision.iterations,
                    decision.rho,
                    decision.n_support()
                );
                let sigmoid = if self.params.probability {
                    let seed = self.params.random_state.wrapping_add(p as u64);
                    Some(probability::binary_svc_probability(&sub, ctx, seed)?)
                } else {
                    None
                };
                Ok(PairSolution { decision, sigmoid })
            })
            .collect::<Result<Vec<_>>>()?;

        let model = assemble_classifier(
            self.svm_type,
            rows,
            groups,
            &pairs,
            &solutions,
            spec,
            n_features,
        );
        let statuses = solutions
            .iter()
            .map(|s| (s.decision.status, s.decision.iterations))
            .collect();
        Ok((model, statuses))
    }

    /// Regression and one-class: one problem over every row
    fn fit_single(
        &self,
        rows: &[SparseVector],
        y: &[f64],
        ctx: &TrainContext<'_>,
        spec: KernelSpec,
        n_features: usize,
    ) -> Result<(FittedModel, Vec<(SolveStatus, usize)>)> {
        let targets = if self.svm_type == SvmType::OneClass {
            vec![1.0; rows.len()]
        } else {
            y.to_vec()
        };
        let sub = Subproblem::whole(rows, targets, self.params.c);
        let decision = train_one(
            ctx.svm_type,
            sub.evaluator(ctx.kernel),
            &sub.y,
            ctx.params,
            sub.c_pos,
            sub.c_neg,
            ctx.cache,
        )?;
        log!(
            self.subproblem_level(),
            "{}: {} iterations, rho = {}, nSV = {}",
            self.svm_type,
            decision.iterations,
            decision.rho,
            decision.n_support()
        );

        let prob_a = if self.params.probability && self.svm_type.is_regression() {
            vec![probability::svr_probability(&sub, ctx, self.params.random_state)?]
        } else {
            Vec::new()
        };

        let precomputed = spec.kernel == KernelType::Precomputed;
        let mut support_vectors = Vec::new();
        let mut sv_indices = Vec::new();
        let mut coef = Vec::new();
        for (row, &c) in decision.coef.iter().enumerate() {
            if c != 0.0 {
                support_vectors.push(stored_row(&rows[row], precomputed));
                sv_indices.push(row);
                coef.push(c);
            }
        }

        let model = FittedModel {
            svm_type: self.svm_type,
            kernel: spec,
            n_features,
            labels: Vec::new(),
            n_sv_per_class: Vec::new(),
            support_vectors,
            sv_indices,
            sv_coef: vec![coef],
            rho: vec![decision.rho],
            prob_a,
            prob_b: Vec::new(),
        };
        Ok((model, vec![(decision.status, decision.iterations)]))
    }
}

/// Precomputed models keep only the training position of a support vector
fn stored_row(row: &SparseVector, precomputed: bool) -> SparseVector {
    if precomputed {
        SparseVector::empty()
    } else {
        row.clone()
    }
}

/// Merge the pairwise solutions into one model
///
/// A training row is a support vector when any pair gives it a non-zero
/// coefficient; it is stored once, grouped with its class.
fn assemble_classifier(
    svm_type: SvmType,
    rows: &[SparseVector],
    groups: &ClassGroups,
    pairs: &[(usize, usize)],
    solutions: &[PairSolution],
    spec: KernelSpec,
    n_features: usize,
) -> FittedModel {
    let k = groups.labels.len();

    let mut nonzero = vec![false; rows.len()];
    for (&(i, j), solution) in pairs.iter().zip(solutions) {
        let ids = groups.members[i].iter().chain(&groups.members[j]);
        for (&row, &c) in ids.zip(&solution.decision.coef) {
            if c != 0.0 {
                nonzero[row] = true;
            }
        }
    }

    let precomputed = spec.kernel == KernelType::Precomputed;
    let mut position: Vec<Option<usize>> = vec![None; rows.len()];
    let mut support_vectors = Vec::new();
    let mut sv_indices = Vec::new();
    let mut n_sv_per_class = Vec::with_capacity(k);
    for members in &groups.members {
        let mut count = 0;
        for &row in members.iter().filter(|&&row| nonzero[row]) {
            position[row] = Some(support_vectors.len());
            support_vectors.push(stored_row(&rows[row], precomputed));
            sv_indices.push(row);
            count += 1;
        }
        n_sv_per_class.push(count);
    }

    let mut sv_coef = vec![vec![0.0; support_vectors.len()]; k - 1];
    for (&(i, j), solution) in pairs.iter().zip(solutions) {
        let n_i = groups.members[i].len();
        let ids = groups.members[i].iter().chain(&groups.members[j]);
        for (t, (&row, &c)) in ids.zip(&solution.decision.coef).enumerate() {
            if let Some(pos) = position[row] {
                let coef_row = if t < n_i { j - 1 } else { i };
                sv_coef[coef_row][pos] = c;
            }
        }
    }

    let (prob_a, prob_b) = solutions
        .iter()
        .filter_map(|s| s.sigmoid)
        .unzip();

    FittedModel {
        svm_type,
        kernel: spec,
        n_features,
        labels: groups.labels.clone(),
        n_sv_per_class,
        support_vectors,
        sv_indices,
        sv_coef,
        rho: solutions.iter().map(|s| s.decision.rho).collect(),
        prob_a,
        prob_b,
    }
}
