//! Q-matrix views of the dual problems
//!
//! The solver only sees `Q` through [`QMatrix`]: whole rows on demand plus
//! the diagonal. Rows come from the shared [`KernelCache`] and are released
//! when the view is dropped.

use crate::cache::{CachedRow, KernelCache};
use crate::core::Result;
use crate::kernel::KernelEvaluator;

/// Row access to the Hessian of a dual problem
pub trait QMatrix: Send + Sync {
    /// Number of dual variables
    fn len(&self) -> usize;

    /// Row `i` of Q, `len()` values long
    fn get_q(&self, i: usize) -> Result<CachedRow>;

    /// Q[i][i] for every variable
    fn diagonal(&self) -> &[f64];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn kernel_diagonal(evaluator: &KernelEvaluator<'_>) -> Result<Vec<f64>> {
    (0..evaluator.len())
        .map(|i| evaluator.evaluate(i, i))
        .collect()
}

/// Q[i][j] = y_i y_j K(x_i, x_j) for classification
pub struct SvcQ<'a> {
    evaluator: KernelEvaluator<'a>,
    y: Vec<f64>,
    cache: &'a KernelCache,
    problem: usize,
    qd: Vec<f64>,
}

impl<'a> SvcQ<'a> {
    pub fn new(evaluator: KernelEvaluator<'a>, y: &[f64], cache: &'a KernelCache) -> Result<Self> {
        let qd = kernel_diagonal(&evaluator)?;
        Ok(Self {
            evaluator,
            y: y.to_vec(),
            problem: cache.register_problem(),
            cache,
            qd,
        })
    }
}

impl QMatrix for SvcQ<'_> {
    fn len(&self) -> usize {
        self.evaluator.len()
    }

    fn get_q(&self, i: usize) -> Result<CachedRow> {
        let l = self.len();
        self.cache.get_or_compute(self.problem, i, l, |row| {
            self.evaluator.fill_row(i, row)?;
            let yi = self.y[i];
            for (value, &yj) in row.iter_mut().zip(&self.y) {
                *value *= yi * yj;
            }
            Ok(())
        })
    }

    fn diagonal(&self) -> &[f64] {
        &self.qd
    }
}

impl Drop for SvcQ<'_> {
    fn drop(&mut self) {
        self.cache.release_problem(self.problem);
    }
}

/// Q = K for one-class detection
pub struct OneClassQ<'a> {
    evaluator: KernelEvaluator<'a>,
    cache: &'a KernelCache,
    problem: usize,
    qd: Vec<f64>,
}

impl<'a> OneClassQ<'a> {
    pub fn new(evaluator: KernelEvaluator<'a>, cache: &'a KernelCache) -> Result<Self> {
        let qd = kernel_diagonal(&evaluator)?;
        Ok(Self {
            evaluator,
            problem: cache.register_problem(),
            cache,
            qd,
        })
    }
}

impl QMatrix for OneClassQ<'_> {
    fn len(&self) -> usize {
        self.evaluator.len()
    }

    fn get_q(&self, i: usize) -> Result<CachedRow> {
        let l = self.len();
        self.cache
            .get_or_compute(self.problem, i, l, |row| self.evaluator.fill_row(i, row))
    }

    fn diagonal(&self) -> &[f64] {
        &self.qd
    }
}

impl Drop for OneClassQ<'_> {
    fn drop(&mut self) {
        self.cache.release_problem(self.problem);
    }
}

/// Regression Q over 2l variables
///
/// Variable `k < l` is α⁺ of row `k` (sign +1), variable `k + l` is α⁻ of
/// row `k` (sign −1), so Q[a][b] = s_a s_b K(x_{a mod l}, x_{b mod l}).
/// Kernel rows of length `l` are cached; Q rows are expanded on request.
pub struct SvrQ<'a> {
    evaluator: KernelEvaluator<'a>,
    cache: &'a KernelCache,
    problem: usize,
    qd: Vec<f64>,
}

impl<'a> SvrQ<'a> {
    pub fn new(evaluator: KernelEvaluator<'a>, cache: &'a KernelCache) -> Result<Self> {
        let kd = kernel_diagonal(&evaluator)?;
        let mut qd = kd.clone();
        qd.extend_from_slice(&kd);
        Ok(Self {
            evaluator,
            problem: cache.register_problem(),
            cache,
            qd,
        })
    }

    fn sign(&self, k: usize) -> f64 {
        if k < self.evaluator.len() {
            1.0
        } else {
            -1.0
        }
    }
}

impl QMatrix for SvrQ<'_> {
    fn len(&self) -> usize {
        2 * self.evaluator.len()
    }

    fn get_q(&self, i: usize) -> Result<CachedRow> {
        let l = self.evaluator.len();
        let real = i % l;
        let kernel_row = self
            .cache
            .get_or_compute(self.problem, real, l, |row| self.evaluator.fill_row(real, row))?;

        let si = self.sign(i);
        let row: Vec<f64> = (0..2 * l)
            .map(|j| si * self.sign(j) * kernel_row[j % l])
            .collect();
        Ok(CachedRow::from(row))
    }

    fn diagonal(&self) -> &[f64] {
        &self.qd
    }
}

impl Drop for SvrQ<'_> {
    fn drop(&mut self) {
        self.cache.release_problem(self.problem);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{KernelType, SparseVector, SvmParams};
    use crate::kernel::KernelFunction;

    fn rows() -> Vec<SparseVector> {
        vec![
            SparseVector::new(vec![0], vec![1.0]),
            SparseVector::new(vec![0], vec![2.0]),
        ]
    }

    fn linear() -> KernelFunction {
        let params = SvmParams {
            kernel: KernelType::Linear,
            ..Default::default()
        };
        KernelFunction::from_params(&params, 1).unwrap()
    }

    #[test]
    fn test_svc_q_signs() {
        let data = rows();
        let cache = KernelCache::with_memory_limit(1024);
        let q = SvcQ::new(
            KernelEvaluator::over_all(linear(), &data),
            &[1.0, -1.0],
            &cache,
        )
        .unwrap();

        assert_eq!(q.diagonal(), &[1.0, 4.0]);
        assert_eq!(&q.get_q(0).unwrap()[..], &[1.0, -2.0]);
        assert_eq!(&q.get_q(1).unwrap()[..], &[-2.0, 4.0]);
    }

    #[test]
    fn test_svr_q_layout() {
        let data = rows();
        let cache = KernelCache::with_memory_limit(1024);
        let q = SvrQ::new(KernelEvaluator::over_all(linear(), &data), &cache).unwrap();

        assert_eq!(q.len(), 4);
        assert_eq!(q.diagonal(), &[1.0, 4.0, 1.0, 4.0]);
        assert_eq!(&q.get_q(0).unwrap()[..], &[1.0, 2.0, -1.0, -2.0]);
        assert_eq!(&q.get_q(3).unwrap()[..], &[-2.0, -4.0, 2.0, 4.0]);
    }

    #[test]
    fn test_rows_released_on_drop() {
        let data = rows();
        let cache = KernelCache::with_memory_limit(1024);
        {
            let q = OneClassQ::new(KernelEvaluator::over_all(linear(), &data), &cache).unwrap();
            q.get_q(0).unwrap();
            q.get_q(1).unwrap();
            assert_eq!(cache.stats().rows, 2);
        }
        assert_eq!(cache.stats().rows, 0);
    }
}
