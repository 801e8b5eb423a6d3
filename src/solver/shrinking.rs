//! Shrinking heuristic implementation
//!
//! Bounded variables whose gradient says they would move further past
//! their bound cannot be part of any violating pair in the near future, so
//! they are temporarily removed from the active set. When the remaining
//! problem is within `10 * tol` of optimal the full gradient is rebuilt
//! once and every variable is reactivated, so the final optimality check
//! always covers the whole problem.

use crate::solver::smo::{DualState, SolverVariant};

/// Iteration bookkeeping for periodic shrinking
#[derive(Debug)]
pub struct ShrinkingStrategy {
    period: usize,
    counter: usize,
    unshrunk: bool,
}

/// Per-class extreme gradients used to decide which variables to shrink
#[derive(Debug, Clone, Copy)]
struct Extremes {
    up: f64,
    low: f64,
}

impl Extremes {
    fn new() -> Self {
        Self {
            up: f64::NEG_INFINITY,
            low: f64::NEG_INFINITY,
        }
    }
}

impl ShrinkingStrategy {
    /// Shrink every `min(l, 1000)` iterations
    pub fn new(n_variables: usize) -> Self {
        let period = n_variables.clamp(1, 1000);
        Self {
            period,
            counter: period,
            unshrunk: false,
        }
    }

    /// Count one iteration; true when a shrinking pass is due
    pub fn tick(&mut self) -> bool {
        self.counter -= 1;
        if self.counter == 0 {
            self.counter = self.period;
            true
        } else {
            false
        }
    }

    /// Schedule a shrinking pass on the next iteration
    pub fn force_next(&mut self) {
        self.counter = 1;
    }

    /// Decide what to shrink
    ///
    /// Returns `(unshrink, to_remove)`. When `unshrink` is true the caller
    /// must first rebuild the gradient and reactivate every variable; the
    /// removal list is then computed against the full set.
    pub fn plan(&mut self, state: &DualState, variant: SolverVariant, tol: f64) -> ShrinkPlan {
        let (pos, neg) = scan_extremes(state, variant);
        let gap = match variant {
            SolverVariant::Standard => pos.up + pos.low,
            SolverVariant::Nu => (pos.up + pos.low).max(neg.up + neg.low),
        };

        let unshrink = !self.unshrunk && gap <= tol * 10.0;
        if unshrink {
            self.unshrunk = true;
        }
        ShrinkPlan {
            unshrink,
            pos,
            neg,
            variant,
        }
    }
}

/// Outcome of [`ShrinkingStrategy::plan`]
#[derive(Debug, Clone, Copy)]
pub struct ShrinkPlan {
    pub unshrink: bool,
    pos: Extremes,
    neg: Extremes,
    variant: SolverVariant,
}

impl ShrinkPlan {
    /// Active variables that can be removed from the working problem
    pub fn shrinkable(&self, state: &DualState) -> Vec<usize> {
        state
            .active_set
            .iter()
            .copied()
            .filter(|&t| self.be_shrunk(state, t))
            .collect()
    }

    fn be_shrunk(&self, state: &DualState, t: usize) -> bool {
        let g = state.gradient[t];
        let positive = state.y[t] > 0.0;
        match self.variant {
            // Standard: one pair of extremes over both classes in y*G space
            SolverVariant::Standard => {
                let e = self.pos;
                if state.is_upper_bound(t) {
                    if positive {
                        -g > e.up
                    } else {
                        -g > e.low
                    }
                } else if state.is_lower_bound(t) {
                    if positive {
                        g > e.low
                    } else {
                        g > e.up
                    }
                } else {
                    false
                }
            }
            SolverVariant::Nu => {
                let e = if positive { self.pos } else { self.neg };
                if state.is_upper_bound(t) {
                    -g > e.up
                } else if state.is_lower_bound(t) {
                    g > e.low
                } else {
                    false
                }
            }
        }
    }
}

/// Standard: `pos.up = max_{I_up} −y G`, `pos.low = max_{I_low} y G`.
/// Nu: the same two quantities in raw gradient space, per class.
fn scan_extremes(state: &DualState, variant: SolverVariant) -> (Extremes, Extremes) {
    let mut pos = Extremes::new();
    let mut neg = Extremes::new();
    for &t in &state.active_set {
        let g = state.gradient[t];
        let positive = state.y[t] > 0.0;
        match variant {
            SolverVariant::Standard => {
                if state.in_up_set(t) {
                    pos.up = pos.up.max(-state.y[t] * g);
                }
                if state.in_low_set(t) {
                    pos.low = pos.low.max(state.y[t] * g);
                }
            }
            SolverVariant::Nu => {
                let e = if positive { &mut pos } else { &mut neg };
                if !state.is_upper_bound(t) {
                    e.up = e.up.max(-g);
                }
                if !state.is_lower_bound(t) {
                    e.low = e.low.max(g);
                }
            }
        }
    }
    (pos, neg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_and_tick() {
        let mut strategy = ShrinkingStrategy::new(3);
        assert!(!strategy.tick());
        assert!(!strategy.tick());
        assert!(strategy.tick());
        assert!(!strategy.tick());

        strategy.force_next();
        assert!(strategy.tick());

        assert_eq!(ShrinkingStrategy::new(5000).period, 1000);
        assert_eq!(ShrinkingStrategy::new(0).period, 1);
    }

    #[test]
    fn test_bounded_variable_shrunk() {
        // variable 2 sits at zero with a gradient pushing it further down
        let mut state = DualState::new(
            vec![0.5, 0.5, 0.0],
            vec![-1.0; 3],
            vec![1.0, -1.0, 1.0],
            vec![1.0; 3],
        );
        state.gradient = vec![0.0, 0.0, 5.0];

        let mut strategy = ShrinkingStrategy::new(3);
        let plan = strategy.plan(&state, SolverVariant::Standard, 1e-3);
        assert_eq!(plan.shrinkable(&state), vec![2]);
    }

    #[test]
    fn test_unshrink_once_near_optimum() {
        let mut state = DualState::new(vec![0.5, 0.5], vec![-1.0; 2], vec![1.0, -1.0], vec![1.0; 2]);
        state.gradient = vec![0.0, 0.0];

        let mut strategy = ShrinkingStrategy::new(2);
        assert!(strategy.plan(&state, SolverVariant::Standard, 1e-3).unshrink);
        assert!(!strategy.plan(&state, SolverVariant::Standard, 1e-3).unshrink);
    }

    #[test]
    fn test_free_variables_never_shrunk() {
        let mut state = DualState::new(vec![0.5; 4], vec![0.0; 4], vec![1.0, 1.0, -1.0, -1.0], vec![1.0; 4]);
        state.gradient = vec![3.0, -3.0, 3.0, -3.0];

        let mut strategy = ShrinkingStrategy::new(4);
        let plan = strategy.plan(&state, SolverVariant::Nu, 1e-3);
        assert!(plan.shrinkable(&state).is_empty());
    }
}
