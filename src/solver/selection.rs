//! Working set selection
//!
//! With `I_up = {t | y_t = +1, α_t < C_t} ∪ {t | y_t = −1, α_t > 0}` and
//! `I_low = {t | y_t = +1, α_t > 0} ∪ {t | y_t = −1, α_t < C_t}`, the
//! current point is optimal within `tol` when
//! `max_{I_up} −y_t G_t + max_{I_low} y_t G_t < tol`.
//!
//! Indices are scanned in ascending order with strict comparisons, so the
//! lowest index wins every tie.

use crate::core::{Result, WorkingSetStrategy};
use crate::solver::qmatrix::QMatrix;
use crate::solver::smo::{DualState, SolverVariant};

/// Stand-in for a non-positive curvature along the working pair
pub const TAU: f64 = 1e-12;

/// Pick the next pair to optimise, or `None` when no pair violates the
/// optimality conditions by at least `tol`
pub fn select_working_set<Q: QMatrix>(
    state: &DualState,
    q: &Q,
    strategy: WorkingSetStrategy,
    variant: SolverVariant,
    tol: f64,
) -> Result<Option<(usize, usize)>> {
    match variant {
        SolverVariant::Standard => select_standard(state, q, strategy, tol),
        SolverVariant::Nu => select_nu(state, q, strategy, tol),
    }
}

fn curvature(qd: &[f64], i: usize, j: usize, q_ij: f64, sign: f64) -> f64 {
    let quad = qd[i] + qd[j] - 2.0 * sign * q_ij;
    if quad > 0.0 {
        quad
    } else {
        TAU
    }
}

fn select_standard<Q: QMatrix>(
    state: &DualState,
    q: &Q,
    strategy: WorkingSetStrategy,
    tol: f64,
) -> Result<Option<(usize, usize)>> {
    let mut gmax = f64::NEG_INFINITY;
    let mut gmax_idx = None;
    for &t in &state.active_set {
        let v = -state.y[t] * state.gradient[t];
        if state.in_up_set(t) && v > gmax {
            gmax = v;
            gmax_idx = Some(t);
        }
    }
    let i = match gmax_idx {
        Some(i) => i,
        None => return Ok(None),
    };

    let q_i = match strategy {
        WorkingSetStrategy::SecondOrder => Some(q.get_q(i)?),
        WorkingSetStrategy::MaximalViolatingPair => None,
    };
    let qd = q.diagonal();

    let mut gmax2 = f64::NEG_INFINITY;
    let mut gmax2_idx = None;
    let mut obj_min = f64::INFINITY;
    let mut obj_min_idx = None;
    for &t in &state.active_set {
        if !state.in_low_set(t) {
            continue;
        }
        let v = state.y[t] * state.gradient[t];
        if v > gmax2 {
            gmax2 = v;
            gmax2_idx = Some(t);
        }
        if let Some(q_i) = &q_i {
            let grad_diff = gmax + v;
            if grad_diff > 0.0 {
                let quad = curvature(qd, i, t, q_i[t], state.y[i] * state.y[t]);
                let obj = -(grad_diff * grad_diff) / quad;
                if obj < obj_min {
                    obj_min = obj;
                    obj_min_idx = Some(t);
                }
            }
        }
    }

    if gmax + gmax2 < tol {
        return Ok(None);
    }
    let j = match strategy {
        WorkingSetStrategy::SecondOrder => obj_min_idx,
        WorkingSetStrategy::MaximalViolatingPair => gmax2_idx,
    };
    Ok(j.map(|j| (i, j)))
}

/// Per-class candidates of the Nu variant
#[derive(Default)]
struct ClassScan {
    gmax: f64,
    i: Option<usize>,
    gmax2: f64,
    j_first: Option<usize>,
    obj_min: f64,
    j_second: Option<usize>,
}

impl ClassScan {
    fn new() -> Self {
        Self {
            gmax: f64::NEG_INFINITY,
            gmax2: f64::NEG_INFINITY,
            obj_min: f64::INFINITY,
            ..Default::default()
        }
    }

    fn violation(&self) -> f64 {
        self.gmax + self.gmax2
    }
}

/// Both variables of a Nu pair come from the same class, which keeps the
/// extra per-class equality constraint satisfied.
fn select_nu<Q: QMatrix>(
    state: &DualState,
    q: &Q,
    strategy: WorkingSetStrategy,
    tol: f64,
) -> Result<Option<(usize, usize)>> {
    let mut pos = ClassScan::new();
    let mut neg = ClassScan::new();
    for &t in &state.active_set {
        let scan = if state.y[t] > 0.0 { &mut pos } else { &mut neg };
        let v = -state.y[t] * state.gradient[t];
        if state.in_up_set(t) && v > scan.gmax {
            scan.gmax = v;
            scan.i = Some(t);
        }
    }

    let second_order = strategy == WorkingSetStrategy::SecondOrder;
    let q_pos = match (second_order, pos.i) {
        (true, Some(i)) => Some(q.get_q(i)?),
        _ => None,
    };
    let q_neg = match (second_order, neg.i) {
        (true, Some(i)) => Some(q.get_q(i)?),
        _ => None,
    };
    let qd = q.diagonal();

    for &t in &state.active_set {
        if !state.in_low_set(t) {
            continue;
        }
        let (scan, q_i) = if state.y[t] > 0.0 {
            (&mut pos, &q_pos)
        } else {
            (&mut neg, &q_neg)
        };
        let v = state.y[t] * state.gradient[t];
        if v > scan.gmax2 {
            scan.gmax2 = v;
            scan.j_first = Some(t);
        }
        if let (Some(i), Some(q_i)) = (scan.i, q_i) {
            let grad_diff = scan.gmax + v;
            if grad_diff > 0.0 {
                let quad = curvature(qd, i, t, q_i[t], 1.0);
                let obj = -(grad_diff * grad_diff) / quad;
                if obj < scan.obj_min {
                    scan.obj_min = obj;
                    scan.j_second = Some(t);
                }
            }
        }
    }

    if pos.violation().max(neg.violation()) < tol {
        return Ok(None);
    }

    let pick = |scan: &ClassScan| {
        let j = if second_order {
            scan.j_second
        } else {
            scan.j_first
        };
        scan.i.zip(j)
    };
    Ok(match (pick(&pos), pick(&neg)) {
        (Some(p), Some(n)) => {
            if neg.violation() > pos.violation() {
                Some(n)
            } else {
                Some(p)
            }
        }
        (p, n) => p.or(n),
    })
}
