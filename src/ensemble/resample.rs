//! Seeded row resampling.

use rand::prelude::*;
use rand::rngs::StdRng;

/// Data that can be resampled by row.
///
/// The search never inspects rows itself; the caller turns each resample
/// into an oracle.
pub trait Dataset: Send + Sync {
    /// Number of rows.
    fn sample_size(&self) -> usize;

    /// New dataset made of the given rows, in order, repeats allowed.
    fn resample(&self, rows: &[usize]) -> Self
    where
        Self: Sized;
}

impl<T: Clone + Send + Sync> Dataset for Vec<T> {
    fn sample_size(&self) -> usize {
        self.len()
    }

    fn resample(&self, rows: &[usize]) -> Self {
        rows.iter().filter_map(|&i| self.get(i).cloned()).collect()
    }
}

/// Rows drawn per resample: `ceil(fraction * n)`, at least one when `n > 0`.
pub fn resample_size(n: usize, fraction: f64) -> usize {
    if n == 0 {
        return 0;
    }
    ((fraction * n as f64).ceil() as usize).clamp(1, n)
}

/// Row indices of every resample, drawn with replacement.
///
/// All draws come from one generator seeded with `seed`, in resample order,
/// so the plan is the same on every run regardless of thread count.
pub fn resample_plan(n: usize, fraction: f64, resamples: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let size = resample_size(n, fraction);
    (0..resamples)
        .map(|_| (0..size).map(|_| rng.gen_range(0..n)).collect())
        .collect()
}
