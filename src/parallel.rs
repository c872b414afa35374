//! Parallel per-response fitting.
//!
//! Responses share the standardized design and the configuration grouping
//! but are otherwise independent, so their mixed-model fits run on the
//! Rayon thread pool. Enable with the `parallel` feature flag.
//!
//! Results keep the configured response order regardless of completion order.
//!
//! For a handful of responses on small datasets the sequential path may be
//! faster due to scheduling overhead.

use rayon::prelude::*;

/// Evaluate `f(0), f(1), ..., f(n - 1)` in parallel, returning results in index order.
pub fn map_indexed<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    (0..n).into_par_iter().map(f).collect()
}
