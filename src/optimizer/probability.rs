//! Probability calibration
//!
//! Classification models map each pairwise decision value through a Platt
//! sigmoid fitted on cross-validated decision values, then couple the
//! pairwise probabilities into one distribution over classes. Regression
//! models record the scale of a Laplace distribution fitted to
//! cross-validated residuals.

use crate::core::{ErrorKind, Result};
use crate::optimizer::{Subproblem, TrainContext};
use crate::solver::train_one;
use log::warn;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

/// Folds of the internal cross-validation
pub const CV_FOLDS: usize = 5;

/// Pairwise probabilities are kept inside `[MIN_PROB, 1 - MIN_PROB]`
pub const MIN_PROB: f64 = 1e-7;

const NEWTON_MAX_ITER: usize = 100;
const NEWTON_MIN_STEP: f64 = 1e-10;
const NEWTON_SIGMA: f64 = 1e-12;
const NEWTON_EPS: f64 = 1e-5;

/// Fit `P(y = 1 | f) = 1 / (1 + exp(A f + B))` by Newton's method with
/// backtracking, on smoothed targets
///
/// Returns `(A, B)`.
pub fn sigmoid_train(dec_values: &[f64], labels: &[f64]) -> (f64, f64) {
    let prior1 = labels.iter().filter(|y| **y > 0.0).count() as f64;
    let prior0 = labels.len() as f64 - prior1;

    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = labels
        .iter()
        .map(|&y| if y > 0.0 { hi_target } else { lo_target })
        .collect();

    let objective = |a: f64, b: f64| -> f64 {
        dec_values
            .iter()
            .zip(&targets)
            .map(|(&f, &t)| {
                let f_apb = f * a + b;
                if f_apb >= 0.0 {
                    t * f_apb + (-f_apb).exp().ln_1p()
                } else {
                    (t - 1.0) * f_apb + f_apb.exp().ln_1p()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    let mut iter = 0;
    while iter < NEWTON_MAX_ITER {
        // Gradient and Hessian (H' = H + sigma I)
        let mut h11 = NEWTON_SIGMA;
        let mut h22 = NEWTON_SIGMA;
        let mut h21 = 0.0;
        let mut g1 = 0.0;
        let mut g2 = 0.0;
        for (&f, &t) in dec_values.iter().zip(&targets) {
            let f_apb = f * a + b;
            let (p, q) = if f_apb >= 0.0 {
                let e = (-f_apb).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = f_apb.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }

        if g1.abs() < NEWTON_EPS && g2.abs() < NEWTON_EPS {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let d_a = -(h22 * g1 - h21 * g2) / det;
        let d_b = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * d_a + g2 * d_b;

        let mut step = 1.0;
        while step >= NEWTON_MIN_STEP {
            let new_a = a + step * d_a;
            let new_b = b + step * d_b;
            let new_f = objective(new_a, new_b);
            if new_f < fval + 0.0001 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }

        if step < NEWTON_MIN_STEP {
            warn!("Platt scaling: line search failed");
            break;
        }
        iter += 1;
    }

    if iter >= NEWTON_MAX_ITER {
        warn!("Platt scaling: reached maximal iterations");
    }
    (a, b)
}

/// Probability of the positive class for decision value `f`
pub fn sigmoid_predict(f: f64, a: f64, b: f64) -> f64 {
    let f_apb = f * a + b;
    // 1 - p may lose precision when p is close to 1
    if f_apb >= 0.0 {
        let e = (-f_apb).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + f_apb.exp())
    }
}

/// Couple pairwise probabilities `r[i][j] ≈ P(i | i or j)` into class
/// probabilities (second method of Wu, Lin and Weng)
pub fn multiclass_probability(r: &[Vec<f64>]) -> Vec<f64> {
    let k = r.len();
    if k == 0 {
        return Vec::new();
    }
    let max_iter = k.max(100);
    let eps = 0.005 / k as f64;

    let mut q = vec![vec![0.0; k]; k];
    for t in 0..k {
        for j in 0..t {
            q[t][t] += r[j][t] * r[j][t];
            q[t][j] = q[j][t];
        }
        for j in t + 1..k {
            q[t][t] += r[j][t] * r[j][t];
            q[t][j] = -r[j][t] * r[t][j];
        }
    }

    let mut p = vec![1.0 / k as f64; k];
    let mut qp = vec![0.0; k];
    let mut iter = 0;
    while iter < max_iter {
        // stopping condition, recompute Qp and pQp for numerical accuracy
        let mut p_qp = 0.0;
        for t in 0..k {
            qp[t] = (0..k).map(|j| q[t][j] * p[j]).sum();
            p_qp += p[t] * qp[t];
        }
        let max_error = qp
            .iter()
            .map(|v| (v - p_qp).abs())
            .fold(0.0, f64::max);
        if max_error < eps {
            break;
        }

        for t in 0..k {
            let diff = (-qp[t] + p_qp) / q[t][t];
            p[t] += diff;
            p_qp = (p_qp + diff * (diff * q[t][t] + 2.0 * qp[t])) / (1.0 + diff) / (1.0 + diff);
            for j in 0..k {
                qp[j] = (qp[j] + diff * q[t][j]) / (1.0 + diff);
                p[j] /= 1.0 + diff;
            }
        }
        iter += 1;
    }
    if iter >= max_iter {
        warn!("Pairwise coupling exceeded {max_iter} iterations");
    }
    p
}

/// Seeded shuffle of `0..l`
pub fn fold_permutation(l: usize, seed: u64) -> Vec<usize> {
    let mut perm: Vec<usize> = (0..l).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    perm.shuffle(&mut rng);
    perm
}

/// Out-of-fold decision values for every row of `sub`
pub(crate) fn cross_validation_decisions(
    sub: &Subproblem<'_>,
    ctx: &TrainContext<'_>,
    seed: u64,
) -> Result<Vec<f64>> {
    let l = sub.len();
    let perm = fold_permutation(l, seed);

    let folds = (0..CV_FOLDS)
        .into_par_iter()
        .map(|fold| -> Result<Vec<(usize, f64)>> {
            let begin = fold * l / CV_FOLDS;
            let end = (fold + 1) * l / CV_FOLDS;
            let held_out = &perm[begin..end];
            if held_out.is_empty() {
                return Ok(Vec::new());
            }
            let train: Vec<usize> = perm[..begin].iter().chain(&perm[end..]).copied().collect();
            let values = fold_decisions(sub, ctx, &train, held_out)?;
            Ok(held_out.iter().copied().zip(values).collect())
        })
        .collect::<Result<Vec<_>>>()?;

    let mut dec_values = vec![0.0; l];
    for (row, value) in folds.into_iter().flatten() {
        dec_values[row] = value;
    }
    Ok(dec_values)
}

fn fold_decisions(
    sub: &Subproblem<'_>,
    ctx: &TrainContext<'_>,
    train: &[usize],
    held_out: &[usize],
) -> Result<Vec<f64>> {
    let train_sub = sub.select(train);

    if ctx.svm_type.is_classification() {
        let n_pos = train_sub.y.iter().filter(|y| **y > 0.0).count();
        let n_neg = train_sub.len() - n_pos;
        let constant = match (n_pos, n_neg) {
            (0, 0) => Some(0.0),
            (_, 0) => Some(1.0),
            (0, _) => Some(-1.0),
            _ => None,
        };
        if let Some(value) = constant {
            return Ok(vec![value; held_out.len()]);
        }
    } else if train_sub.is_empty() {
        warn!("Calibration fold has no training rows; using zero predictions");
        return Ok(vec![0.0; held_out.len()]);
    }

    let evaluator = train_sub.evaluator(ctx.kernel);
    let fold_model = match train_one(
        ctx.svm_type,
        evaluator.clone(),
        &train_sub.y,
        ctx.params,
        train_sub.c_pos,
        train_sub.c_neg,
        ctx.cache,
    ) {
        Ok(model) => model,
        Err(e) if e.kind() == ErrorKind::Configuration => {
            warn!("Skipping calibration fold: {e}");
            return Ok(vec![0.0; held_out.len()]);
        }
        Err(e) => return Err(e),
    };

    held_out
        .iter()
        .map(|&row| {
            let x = sub.rows[row];
            let x_norm = x.norm_squared();
            let mut sum = -fold_model.rho;
            for (t, &coef) in fold_model.coef.iter().enumerate() {
                if coef != 0.0 {
                    sum += coef * evaluator.evaluate_external(x, x_norm, t)?;
                }
            }
            Ok(sum)
        })
        .collect()
}

/// Platt parameters `(A, B)` of one binary subproblem
pub(crate) fn binary_svc_probability(
    sub: &Subproblem<'_>,
    ctx: &TrainContext<'_>,
    seed: u64,
) -> Result<(f64, f64)> {
    let dec_values = cross_validation_decisions(sub, ctx, seed)?;
    Ok(sigmoid_train(&dec_values, &sub.y))
}

/// Laplace scale of the cross-validated residuals, ignoring outliers
/// beyond five standard deviations
pub(crate) fn svr_probability(
    sub: &Subproblem<'_>,
    ctx: &TrainContext<'_>,
    seed: u64,
) -> Result<f64> {
    let predictions = cross_validation_decisions(sub, ctx, seed)?;
    Ok(laplace_scale(&sub.y, &predictions))
}

pub(crate) fn laplace_scale(targets: &[f64], predictions: &[f64]) -> f64 {
    let residuals: Vec<f64> = targets
        .iter()
        .zip(predictions)
        .map(|(y, p)| y - p)
        .collect();
    if residuals.is_empty() {
        return 0.0;
    }
    let mae = residuals.iter().map(|r| r.abs()).sum::<f64>() / residuals.len() as f64;
    let std = (2.0 * mae * mae).sqrt();

    let kept: Vec<f64> = residuals
        .iter()
        .map(|r| r.abs())
        .filter(|r| *r <= 5.0 * std)
        .collect();
    if kept.is_empty() {
        return mae;
    }
    let sigma = kept.iter().sum::<f64>() / kept.len() as f64;
    log::info!(
        "Prob. model for test data: target value = predicted value + z, \
         z: Laplace distribution e^(-|z|/sigma)/(2sigma), sigma = {sigma}"
    );
    sigma
}
