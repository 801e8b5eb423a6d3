//! Kernel cache implementation
//!
//! Provides a memory-bounded LRU cache of kernel matrix rows shared by every
//! subproblem of one fit. Each subproblem takes its own id from the cache so
//! that rows of different subproblems never collide; within a subproblem a
//! row is only ever requested by the single worker that owns it.

use crate::core::{Result, SVMError};
use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A cached kernel (or Q) row
pub type CachedRow = Arc<[f64]>;

const BYTES_PER_VALUE: usize = std::mem::size_of::<f64>();

/// Cache key: row `row` of subproblem `problem`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RowKey {
    problem: usize,
    row: usize,
}

struct CacheInner {
    rows: LruCache<RowKey, CachedRow>,
    used_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// LRU cache for kernel matrix rows, bounded in bytes
pub struct KernelCache {
    inner: Mutex<CacheInner>,
    budget_bytes: usize,
    next_problem: AtomicUsize,
}

impl KernelCache {
    /// Create a cache holding at most `budget_bytes` of row data
    pub fn with_memory_limit(budget_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                rows: LruCache::unbounded(),
                used_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            budget_bytes,
            next_problem: AtomicUsize::new(0),
        }
    }

    /// Reserve a fresh subproblem id
    pub fn register_problem(&self) -> usize {
        self.next_problem.fetch_add(1, Ordering::Relaxed)
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    /// Return the cached row or compute, cache and return it
    ///
    /// `compute` runs without the lock held and receives an empty buffer
    /// with room for `len` values. A row larger than the whole budget is
    /// returned without being cached.
    pub fn get_or_compute<F>(
        &self,
        problem: usize,
        row: usize,
        len: usize,
        compute: F,
    ) -> Result<CachedRow>
    where
        F: FnOnce(&mut Vec<f64>) -> Result<()>,
    {
        let key = RowKey { problem, row };
        {
            let mut inner = self.inner.lock();
            if let Some(cached) = inner.rows.get(&key) {
                let cached = Arc::clone(cached);
                inner.hits += 1;
                return Ok(cached);
            }
            inner.misses += 1;
        }

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len).map_err(|e| {
            SVMError::ResourceExhausted(format!("cannot allocate kernel row of {len} values: {e}"))
        })?;
        compute(&mut buffer)?;
        let computed: CachedRow = Arc::from(buffer);

        let size = computed.len() * BYTES_PER_VALUE;
        if size > self.budget_bytes {
            return Ok(computed);
        }

        let mut inner = self.inner.lock();
        while inner.used_bytes + size > self.budget_bytes {
            match inner.rows.pop_lru() {
                Some((_, evicted)) => {
                    inner.used_bytes -= evicted.len() * BYTES_PER_VALUE;
                    inner.evictions += 1;
                }
                None => break,
            }
        }
        if let Some(previous) = inner.rows.put(key, Arc::clone(&computed)) {
            inner.used_bytes -= previous.len() * BYTES_PER_VALUE;
        }
        inner.used_bytes += size;
        Ok(computed)
    }

    /// Drop every row belonging to a finished subproblem
    pub fn release_problem(&self, problem: usize) {
        let mut inner = self.inner.lock();
        let keys: Vec<RowKey> = inner
            .rows
            .iter()
            .filter(|(k, _)| k.problem == problem)
            .map(|(k, _)| *k)
            .collect();
        for key in &keys {
            if let Some(row) = inner.rows.pop(key) {
                inner.used_bytes -= row.len() * BYTES_PER_VALUE;
            }
        }
        if !keys.is_empty() {
            debug!("Released {} cached rows of subproblem {}", keys.len(), problem);
        }
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        self.stats().hit_rate()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            rows: inner.rows.len(),
            used_bytes: inner.used_bytes,
            budget_bytes: self.budget_bytes,
        }
    }

    /// Clear the cache
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.rows.clear();
        inner.used_bytes = 0;
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }
}

impl std::fmt::Debug for KernelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelCache")
            .field("budget_bytes", &self.budget_bytes)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rows: usize,
    pub used_bytes: usize,
    pub budget_bytes: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
