//! Sequential Minimal Optimization (SMO) solver implementation
//!
//! Solves the dual problem
//!
//! ```text
//! min  ½ αᵀQα + pᵀα
//! s.t. yᵀα = Δ,  0 ≤ α_i ≤ C_i
//! ```
//!
//! two variables at a time. The gradient `G = Qα + p` is maintained
//! incrementally; `Ḡ` holds the contribution of variables at their upper
//! bound so the gradient of shrunk variables can be rebuilt cheaply.
//!
//! The Nu variant adds one equality constraint per class and always picks
//! both variables of a pair from the same class.

use crate::core::{
    OptimizationResult, Result, SVMError, SolveStatus, SolverState, SvmParams, WorkingSetStrategy,
};
use crate::solver::qmatrix::QMatrix;
use crate::solver::selection::{select_working_set, TAU};
use crate::solver::shrinking::ShrinkingStrategy;
use log::{trace, warn};

/// Which dual problem family is being solved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverVariant {
    /// One equality constraint `yᵀα = Δ`
    Standard,
    /// Per-class equality constraints (nu-SVC, nu-SVR)
    Nu,
}

/// Solver settings derived from the hyperparameters of a fit
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Stopping tolerance on the maximal violation
    pub tol: f64,
    /// Iteration cap; `None` runs until convergence
    pub max_iter: Option<usize>,
    pub shrinking: bool,
    pub working_set: WorkingSetStrategy,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tol: 1e-3,
            max_iter: None,
            shrinking: false,
            working_set: WorkingSetStrategy::MaximalViolatingPair,
        }
    }
}

impl SolverConfig {
    pub fn from_params(params: &SvmParams) -> Self {
        Self {
            tol: params.tol,
            max_iter: params.max_iter,
            shrinking: params.shrinking,
            working_set: params.working_set,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AlphaStatus {
    LowerBound,
    UpperBound,
    Free,
}

/// Dual-variable state of one solver run
///
/// Owned by a single [`SMOSolver::solve`] call and discarded once the
/// coefficients have been extracted.
#[derive(Debug, Clone)]
pub struct DualState {
    pub(crate) alpha: Vec<f64>,
    pub(crate) gradient: Vec<f64>,
    pub(crate) gradient_bar: Vec<f64>,
    pub(crate) p: Vec<f64>,
    pub(crate) y: Vec<f64>,
    pub(crate) upper_bound: Vec<f64>,
    pub(crate) status: Vec<AlphaStatus>,
    /// Variables still being optimised, ascending
    pub(crate) active_set: Vec<usize>,
    pub(crate) active: Vec<bool>,
}

impl DualState {
    /// Start from `alpha` with the gradient set to `p`
    ///
    /// The kernel part of the gradient is added by the solver.
    pub fn new(alpha: Vec<f64>, p: Vec<f64>, y: Vec<f64>, upper_bound: Vec<f64>) -> Self {
        let l = alpha.len();
        let mut state = Self {
            gradient: p.clone(),
            gradient_bar: vec![0.0; l],
            status: vec![AlphaStatus::Free; l],
            active_set: (0..l).collect(),
            active: vec![true; l],
            alpha,
            p,
            y,
            upper_bound,
        };
        for i in 0..l {
            state.update_status(i);
        }
        state
    }

    pub fn len(&self) -> usize {
        self.alpha.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.is_empty()
    }

    fn update_status(&mut self, i: usize) {
        self.status[i] = if self.alpha[i] >= self.upper_bound[i] {
            AlphaStatus::UpperBound
        } else if self.alpha[i] <= 0.0 {
            AlphaStatus::LowerBound
        } else {
            AlphaStatus::Free
        };
    }

    pub fn is_upper_bound(&self, i: usize) -> bool {
        self.status[i] == AlphaStatus::UpperBound
    }

    pub fn is_lower_bound(&self, i: usize) -> bool {
        self.status[i] == AlphaStatus::LowerBound
    }

    pub fn is_free(&self, i: usize) -> bool {
        self.status[i] == AlphaStatus::Free
    }

    /// `t` may move in the direction that increases `y_t α_t`
    pub fn in_up_set(&self, t: usize) -> bool {
        if self.y[t] > 0.0 {
            !self.is_upper_bound(t)
        } else {
            !self.is_lower_bound(t)
        }
    }

    /// `t` may move in the direction that decreases `y_t α_t`
    pub fn in_low_set(&self, t: usize) -> bool {
        if self.y[t] > 0.0 {
            !self.is_lower_bound(t)
        } else {
            !self.is_upper_bound(t)
        }
    }

    pub fn is_shrunk(&self) -> bool {
        self.active_set.len() < self.len()
    }

    fn deactivate(&mut self, removed: &[usize]) {
        if removed.is_empty() {
            return;
        }
        for &t in removed {
            self.active[t] = false;
        }
        let active = &self.active;
        self.active_set.retain(|&t| active[t]);
    }

    fn reactivate_all(&mut self) {
        self.active.iter_mut().for_each(|a| *a = true);
        self.active_set = (0..self.len()).collect();
    }
}

/// SMO solver for SVM optimization
///
/// One instance solves one subproblem; [`state`](SMOSolver::state) reports
/// where the last run ended.
#[derive(Debug)]
pub struct SMOSolver {
    config: SolverConfig,
    variant: SolverVariant,
    state: SolverState,
}

impl SMOSolver {
    pub fn new(config: SolverConfig, variant: SolverVariant) -> Self {
        Self {
            config,
            variant,
            state: SolverState::Initializing,
        }
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    fn transition(&mut self, next: SolverState) {
        trace!("SMO solver {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Solve the dual problem
    ///
    /// `alpha` is the feasible starting point, `p` the linear term, `y` the
    /// ±1 signs and `upper_bound` the box bound of each variable.
    pub fn solve<Q: QMatrix>(
        &mut self,
        q: &Q,
        p: &[f64],
        y: &[f64],
        alpha: Vec<f64>,
        upper_bound: Vec<f64>,
    ) -> Result<OptimizationResult> {
        self.state = SolverState::Initializing;
        let l = q.len();
        if l == 0 {
            self.transition(SolverState::Failed);
            return Err(SVMError::EmptyDataset);
        }
        if p.len() != l || y.len() != l || alpha.len() != l || upper_bound.len() != l {
            self.transition(SolverState::Failed);
            return Err(SVMError::DimensionMismatch {
                expected: l,
                actual: p.len().min(y.len()).min(alpha.len()).min(upper_bound.len()),
            });
        }

        let mut dual = DualState::new(alpha, p.to_vec(), y.to_vec(), upper_bound);
        match self.optimize(q, &mut dual) {
            Ok(result) => {
                self.transition(match result.status {
                    SolveStatus::Converged => SolverState::Converged,
                    SolveStatus::MaxIterReached => SolverState::MaxIterReached,
                });
                Ok(result)
            }
            Err(e) => {
                self.transition(SolverState::Failed);
                Err(e)
            }
        }
    }

    fn optimize<Q: QMatrix>(&mut self, q: &Q, dual: &mut DualState) -> Result<OptimizationResult> {
        let l = dual.len();

        // Kernel part of the initial gradient
        for i in 0..l {
            if dual.is_lower_bound(i) {
                continue;
            }
            let q_i = q.get_q(i)?;
            let alpha_i = dual.alpha[i];
            for (g, &q_ij) in dual.gradient.iter_mut().zip(q_i.iter()) {
                *g += alpha_i * q_ij;
            }
            if dual.is_upper_bound(i) {
                let c_i = dual.upper_bound[i];
                for (g, &q_ij) in dual.gradient_bar.iter_mut().zip(q_i.iter()) {
                    *g += c_i * q_ij;
                }
            }
        }
        check_finite(&dual.gradient)?;

        self.transition(SolverState::Iterating);
        let mut shrinking = self.config.shrinking.then(|| ShrinkingStrategy::new(l));
        let mut iterations = 0usize;

        let status = loop {
            if self.config.max_iter.is_some_and(|cap| iterations >= cap) {
                break SolveStatus::MaxIterReached;
            }

            if let Some(strategy) = shrinking.as_mut() {
                if strategy.tick() {
                    self.shrink(strategy, dual, q)?;
                }
            }

            let (i, j) = match self.select(dual, q)? {
                Some(pair) => pair,
                None => {
                    if !dual.is_shrunk() {
                        break SolveStatus::Converged;
                    }
                    // optimal on the active set; verify on the full problem
                    self.reconstruct_gradient(dual, q)?;
                    dual.reactivate_all();
                    match self.select(dual, q)? {
                        Some(pair) => {
                            if let Some(strategy) = shrinking.as_mut() {
                                strategy.force_next();
                            }
                            pair
                        }
                        None => break SolveStatus::Converged,
                    }
                }
            };

            iterations += 1;
            self.update_pair(dual, q, i, j)?;
        };

        if dual.is_shrunk() {
            self.reconstruct_gradient(dual, q)?;
            dual.reactivate_all();
        }

        if status == SolveStatus::MaxIterReached {
            warn!(
                "SMO stopped after reaching max_iter ({iterations} iterations); \
                 the solution may not be optimal"
            );
        }

        let (rho, r) = match self.variant {
            SolverVariant::Standard => (calculate_rho(dual), 0.0),
            SolverVariant::Nu => calculate_rho_nu(dual),
        };
        let objective_value = dual
            .alpha
            .iter()
            .zip(dual.gradient.iter().zip(&dual.p))
            .map(|(a, (g, p))| a * (g + p))
            .sum::<f64>()
            / 2.0;

        let bound_for = |sign: f64| {
            dual.y
                .iter()
                .zip(&dual.upper_bound)
                .filter(|(y, _)| **y * sign > 0.0)
                .map(|(_, c)| *c)
                .fold(0.0, f64::max)
        };

        Ok(OptimizationResult {
            upper_bound_p: bound_for(1.0),
            upper_bound_n: bound_for(-1.0),
            alpha: dual.alpha.clone(),
            rho,
            r,
            objective_value,
            iterations,
            status,
        })
    }

    fn select<Q: QMatrix>(&self, dual: &DualState, q: &Q) -> Result<Option<(usize, usize)>> {
        select_working_set(
            dual,
            q,
            self.config.working_set,
            self.variant,
            self.config.tol,
        )
    }

    /// Analytic minimisation over the pair (i, j), then gradient update
    fn update_pair<Q: QMatrix>(
        &self,
        dual: &mut DualState,
        q: &Q,
        i: usize,
        j: usize,
    ) -> Result<()> {
        let q_i = q.get_q(i)?;
        let q_j = q.get_q(j)?;
        let qd = q.diagonal();

        let c_i = dual.upper_bound[i];
        let c_j = dual.upper_bound[j];
        let old_alpha_i = dual.alpha[i];
        let old_alpha_j = dual.alpha[j];
        let (mut alpha_i, mut alpha_j) = (old_alpha_i, old_alpha_j);

        if dual.y[i] != dual.y[j] {
            let mut quad_coef = qd[i] + qd[j] + 2.0 * q_i[j];
            if quad_coef <= 0.0 {
                quad_coef = TAU;
            }
            let delta = (-dual.gradient[i] - dual.gradient[j]) / quad_coef;
            let diff = alpha_i - alpha_j;
            alpha_i += delta;
            alpha_j += delta;

            if diff > 0.0 {
                if alpha_j < 0.0 {
                    alpha_j = 0.0;
                    alpha_i = diff;
                }
            } else if alpha_i < 0.0 {
                alpha_i = 0.0;
                alpha_j = -diff;
            }
            if diff > c_i - c_j {
                if alpha_i > c_i {
                    alpha_i = c_i;
                    alpha_j = c_i - diff;
                }
            } else if alpha_j > c_j {
                alpha_j = c_j;
                alpha_i = c_j + diff;
            }
        } else {
            let mut quad_coef = qd[i] + qd[j] - 2.0 * q_i[j];
            if quad_coef <= 0.0 {
                quad_coef = TAU;
            }
            let delta = (dual.gradient[i] - dual.gradient[j]) / quad_coef;
            let sum = alpha_i + alpha_j;
            alpha_i -= delta;
            alpha_j += delta;

            if sum > c_i {
                if alpha_i > c_i {
                    alpha_i = c_i;
                    alpha_j = sum - c_i;
                }
            } else if alpha_j < 0.0 {
                alpha_j = 0.0;
                alpha_i = sum;
            }
            if sum > c_j {
                if alpha_j > c_j {
                    alpha_j = c_j;
                    alpha_i = sum - c_j;
                }
            } else if alpha_i < 0.0 {
                alpha_i = 0.0;
                alpha_j = sum;
            }
        }

        if !(alpha_i.is_finite() && alpha_j.is_finite()) {
            return Err(SVMError::KernelEvaluation(format!(
                "dual update of pair ({i}, {j}) is not finite"
            )));
        }

        dual.alpha[i] = alpha_i;
        dual.alpha[j] = alpha_j;
        let delta_i = alpha_i - old_alpha_i;
        let delta_j = alpha_j - old_alpha_j;
        for &k in &dual.active_set {
            dual.gradient[k] += q_i[k] * delta_i + q_j[k] * delta_j;
        }

        let was_upper_i = dual.is_upper_bound(i);
        let was_upper_j = dual.is_upper_bound(j);
        dual.update_status(i);
        dual.update_status(j);
        update_gradient_bar(dual, &q_i, was_upper_i, i, c_i);
        update_gradient_bar(dual, &q_j, was_upper_j, j, c_j);
        Ok(())
    }

    fn shrink<Q: QMatrix>(
        &self,
        strategy: &mut ShrinkingStrategy,
        dual: &mut DualState,
        q: &Q,
    ) -> Result<()> {
        let plan = strategy.plan(dual, self.variant, self.config.tol);
        if plan.unshrink {
            self.reconstruct_gradient(dual, q)?;
            dual.reactivate_all();
        }
        let removed = plan.shrinkable(dual);
        trace!(
            "Shrinking {} of {} active variables",
            removed.len(),
            dual.active_set.len()
        );
        dual.deactivate(&removed);
        Ok(())
    }

    /// Rebuild the gradient of inactive variables from `Ḡ` and the free ones
    fn reconstruct_gradient<Q: QMatrix>(&self, dual: &mut DualState, q: &Q) -> Result<()> {
        if !dual.is_shrunk() {
            return Ok(());
        }
        let inactive: Vec<usize> = (0..dual.len()).filter(|&j| !dual.active[j]).collect();
        for &j in &inactive {
            dual.gradient[j] = dual.gradient_bar[j] + dual.p[j];
        }
        let free: Vec<usize> = dual
            .active_set
            .iter()
            .copied()
            .filter(|&i| dual.is_free(i))
            .collect();
        for i in free {
            let q_i = q.get_q(i)?;
            let alpha_i = dual.alpha[i];
            for &j in &inactive {
                dual.gradient[j] += alpha_i * q_i[j];
            }
        }
        Ok(())
    }
}

fn update_gradient_bar(dual: &mut DualState, q_row: &[f64], was_upper: bool, i: usize, c: f64) {
    let is_upper = dual.is_upper_bound(i);
    if was_upper == is_upper {
        return;
    }
    let c = if is_upper { c } else { -c };
    for (g, &q_ij) in dual.gradient_bar.iter_mut().zip(q_row) {
        *g += c * q_ij;
    }
}

fn check_finite(gradient: &[f64]) -> Result<()> {
    match gradient.iter().position(|g| !g.is_finite()) {
        Some(pos) => Err(SVMError::KernelEvaluation(format!(
            "gradient of variable {pos} is not finite"
        ))),
        None => Ok(()),
    }
}

fn midpoint(ub: f64, lb: f64) -> f64 {
    match (ub.is_finite(), lb.is_finite()) {
        (true, true) => (ub + lb) / 2.0,
        (true, false) => ub,
        (false, true) => lb,
        (false, false) => 0.0,
    }
}

/// Offset from free variables, or the middle of the feasible interval
fn calculate_rho(dual: &DualState) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut sum_free = 0.0;
    let mut n_free = 0usize;

    for i in 0..dual.len() {
        let y_g = dual.y[i] * dual.gradient[i];
        let positive = dual.y[i] > 0.0;
        if dual.is_upper_bound(i) {
            if positive {
                lb = lb.max(y_g);
            } else {
                ub = ub.min(y_g);
            }
        } else if dual.is_lower_bound(i) {
            if positive {
                ub = ub.min(y_g);
            } else {
                lb = lb.max(y_g);
            }
        } else {
            n_free += 1;
            sum_free += y_g;
        }
    }

    if n_free > 0 {
        sum_free / n_free as f64
    } else {
        midpoint(ub, lb)
    }
}

/// Returns `(rho, r)` from the two per-class offsets
fn calculate_rho_nu(dual: &DualState) -> (f64, f64) {
    let mut bounds = [(f64::INFINITY, f64::NEG_INFINITY); 2];
    let mut sums = [(0.0, 0usize); 2];

    for i in 0..dual.len() {
        let class = usize::from(dual.y[i] < 0.0);
        let g = dual.gradient[i];
        if dual.is_upper_bound(i) {
            bounds[class].1 = bounds[class].1.max(g);
        } else if dual.is_lower_bound(i) {
            bounds[class].0 = bounds[class].0.min(g);
        } else {
            sums[class].0 += g;
            sums[class].1 += 1;
        }
    }

    let offset = |class: usize| {
        let (sum, n) = sums[class];
        if n > 0 {
            sum / n as f64
        } else {
            midpoint(bounds[class].0, bounds[class].1)
        }
    };
    let r1 = offset(0);
    let r2 = offset(1);
    ((r1 - r2) / 2.0, (r1 + r2) / 2.0)
}
