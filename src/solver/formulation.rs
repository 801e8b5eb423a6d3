//! Per-formulation drivers
//!
//! Each function builds the dual problem of one SVM formulation over a
//! [`KernelEvaluator`], runs the SMO solver on it and turns the multipliers
//! into signed decision-function coefficients (one per evaluator row).

use crate::cache::KernelCache;
use crate::core::{Result, SVMError, SolveStatus, SvmParams, SvmType};
use crate::kernel::KernelEvaluator;
use crate::solver::qmatrix::{OneClassQ, SvcQ, SvrQ};
use crate::solver::smo::{SMOSolver, SolverConfig, SolverVariant};
use log::trace;

/// Decision function of one subproblem: `f(x) = Σ coef_i K(x_i, x) − rho`
#[derive(Debug, Clone)]
pub struct DecisionFunction {
    pub coef: Vec<f64>,
    pub rho: f64,
    pub objective_value: f64,
    pub iterations: usize,
    pub status: SolveStatus,
}

impl DecisionFunction {
    /// Rows with a non-zero coefficient
    pub fn n_support(&self) -> usize {
        self.coef.iter().filter(|c| **c != 0.0).count()
    }
}

/// Train one subproblem of formulation `svm_type`
///
/// `y` holds ±1 labels for classification, targets for regression and is
/// ignored for one-class. `c_pos` / `c_neg` are the (class-weighted) box
/// bounds of the positive and negative class; regression uses `c_pos`.
pub fn train_one(
    svm_type: SvmType,
    evaluator: KernelEvaluator<'_>,
    y: &[f64],
    params: &SvmParams,
    c_pos: f64,
    c_neg: f64,
    cache: &KernelCache,
) -> Result<DecisionFunction> {
    let config = SolverConfig::from_params(params);
    let solution = match svm_type {
        SvmType::CSvc => solve_c_svc(evaluator, y, c_pos, c_neg, &config, cache),
        SvmType::NuSvc => solve_nu_svc(evaluator, y, params.nu, &config, cache),
        SvmType::OneClass => solve_one_class(evaluator, params.nu, &config, cache),
        SvmType::EpsilonSvr => {
            solve_epsilon_svr(evaluator, y, c_pos, params.epsilon, &config, cache)
        }
        SvmType::NuSvr => solve_nu_svr(evaluator, y, c_pos, params.nu, &config, cache),
    }?;
    trace!(
        "{svm_type}: obj = {}, rho = {}, nSV = {}",
        solution.objective_value,
        solution.rho,
        solution.n_support()
    );
    Ok(solution)
}

/// C-SVC: `p = −1`, `α₀ = 0`, coefficients `α_i y_i`
pub fn solve_c_svc(
    evaluator: KernelEvaluator<'_>,
    y: &[f64],
    c_pos: f64,
    c_neg: f64,
    config: &SolverConfig,
    cache: &KernelCache,
) -> Result<DecisionFunction> {
    let l = evaluator.len();
    let q = SvcQ::new(evaluator, y, cache)?;
    let upper: Vec<f64> = y
        .iter()
        .map(|&yi| if yi > 0.0 { c_pos } else { c_neg })
        .collect();

    let mut solver = SMOSolver::new(config.clone(), SolverVariant::Standard);
    let result = solver.solve(&q, &vec![-1.0; l], y, vec![0.0; l], upper)?;

    Ok(DecisionFunction {
        coef: result.alpha.iter().zip(y).map(|(a, yi)| a * yi).collect(),
        rho: result.rho,
        objective_value: result.objective_value,
        iterations: result.iterations,
        status: result.status,
    })
}

/// Fail when no α with per-class sums ν·l/2 fits in the unit box
pub fn check_nu_feasible(nu: f64, n_pos: usize, n_neg: usize) -> Result<()> {
    if nu * (n_pos + n_neg) as f64 / 2.0 > n_pos.min(n_neg) as f64 {
        return Err(SVMError::InvalidParameter(format!(
            "specified nu {nu} is infeasible for classes of size {n_pos} and {n_neg}"
        )));
    }
    Ok(())
}

/// nu-SVC: Nu variant with unit box; results rescaled by `1/r`
pub fn solve_nu_svc(
    evaluator: KernelEvaluator<'_>,
    y: &[f64],
    nu: f64,
    config: &SolverConfig,
    cache: &KernelCache,
) -> Result<DecisionFunction> {
    let l = evaluator.len();
    let n_pos = y.iter().filter(|v| **v > 0.0).count();
    check_nu_feasible(nu, n_pos, l - n_pos)?;

    let mut sum_pos = nu * l as f64 / 2.0;
    let mut sum_neg = sum_pos;
    let alpha: Vec<f64> = y
        .iter()
        .map(|&yi| {
            let remaining = if yi > 0.0 { &mut sum_pos } else { &mut sum_neg };
            let a = remaining.min(1.0);
            *remaining -= a;
            a
        })
        .collect();

    let q = SvcQ::new(evaluator, y, cache)?;
    let mut solver = SMOSolver::new(config.clone(), SolverVariant::Nu);
    let result = solver.solve(&q, &vec![0.0; l], y, alpha, vec![1.0; l])?;

    let r = result.r;
    if !(r.is_finite() && r != 0.0) {
        return Err(SVMError::KernelEvaluation(format!(
            "nu-SVC margin scale r = {r} cannot be used to rescale the solution"
        )));
    }
    trace!("nu-SVC: C = {}", 1.0 / r);

    Ok(DecisionFunction {
        coef: result.alpha.iter().zip(y).map(|(a, yi)| a * yi / r).collect(),
        rho: result.rho / r,
        objective_value: result.objective_value / (r * r),
        iterations: result.iterations,
        status: result.status,
    })
}

/// One-class: `Q = K`, `p = 0`, the first `⌊ν·l⌋` multipliers start at 1
pub fn solve_one_class(
    evaluator: KernelEvaluator<'_>,
    nu: f64,
    config: &SolverConfig,
    cache: &KernelCache,
) -> Result<DecisionFunction> {
    let l = evaluator.len();
    let total = nu * l as f64;
    let n_full = (total.floor() as usize).min(l);
    let mut alpha = vec![0.0; l];
    alpha[..n_full].iter_mut().for_each(|a| *a = 1.0);
    if n_full < l {
        alpha[n_full] = total - n_full as f64;
    }

    let q = OneClassQ::new(evaluator, cache)?;
    let mut solver = SMOSolver::new(config.clone(), SolverVariant::Standard);
    let result = solver.solve(&q, &vec![0.0; l], &vec![1.0; l], alpha, vec![1.0; l])?;

    Ok(DecisionFunction {
        coef: result.alpha,
        rho: result.rho,
        objective_value: result.objective_value,
        iterations: result.iterations,
        status: result.status,
    })
}

/// Signs of the 2l regression variables
fn svr_signs(l: usize) -> Vec<f64> {
    let mut y = vec![1.0; 2 * l];
    y[l..].iter_mut().for_each(|v| *v = -1.0);
    y
}

fn svr_coefficients(alpha: &[f64], l: usize) -> Vec<f64> {
    (0..l).map(|i| alpha[i] - alpha[i + l]).collect()
}

/// epsilon-SVR: `p = ε − y` for α⁺ and `ε + y` for α⁻
pub fn solve_epsilon_svr(
    evaluator: KernelEvaluator<'_>,
    targets: &[f64],
    c: f64,
    epsilon: f64,
    config: &SolverConfig,
    cache: &KernelCache,
) -> Result<DecisionFunction> {
    let l = evaluator.len();
    let p: Vec<f64> = targets
        .iter()
        .map(|t| epsilon - t)
        .chain(targets.iter().map(|t| epsilon + t))
        .collect();

    let q = SvrQ::new(evaluator, cache)?;
    let mut solver = SMOSolver::new(config.clone(), SolverVariant::Standard);
    let result = solver.solve(&q, &p, &svr_signs(l), vec![0.0; 2 * l], vec![c; 2 * l])?;

    Ok(DecisionFunction {
        coef: svr_coefficients(&result.alpha, l),
        rho: result.rho,
        objective_value: result.objective_value,
        iterations: result.iterations,
        status: result.status,
    })
}

/// nu-SVR: Nu variant over 2l variables, `p = −y` / `+y`
pub fn solve_nu_svr(
    evaluator: KernelEvaluator<'_>,
    targets: &[f64],
    c: f64,
    nu: f64,
    config: &SolverConfig,
    cache: &KernelCache,
) -> Result<DecisionFunction> {
    let l = evaluator.len();
    let mut remaining = c * nu * l as f64 / 2.0;
    let mut alpha = vec![0.0; 2 * l];
    for i in 0..l {
        let a = remaining.min(c);
        alpha[i] = a;
        alpha[i + l] = a;
        remaining -= a;
    }
    let p: Vec<f64> = targets
        .iter()
        .map(|t| -t)
        .chain(targets.iter().copied())
        .collect();

    let q = SvrQ::new(evaluator, cache)?;
    let mut solver = SMOSolver::new(config.clone(), SolverVariant::Nu);
    let result = solver.solve(&q, &p, &svr_signs(l), alpha, vec![c; 2 * l])?;
    trace!("nu-SVR: epsilon = {}", -result.r);

    Ok(DecisionFunction {
        coef: svr_coefficients(&result.alpha, l),
        rho: result.rho,
        objective_value: result.objective_value,
        iterations: result.iterations,
        status: result.status,
    })
}
