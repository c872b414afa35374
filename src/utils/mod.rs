//! Small numeric helpers shared by the pipeline stages.
//!
//! The term builder walks [`pairs`] for two-factor interactions; the
//! standardizer and the summaries use the descriptive statistics.

/// Number of unordered pairs drawn from `n` items, `n(n-1)/2`.
///
/// # Examples
///
/// ```
/// use mixed_doe::utils::pair_count;
///
/// assert_eq!(pair_count(4), 6);
/// assert_eq!(pair_count(1), 0);
/// assert_eq!(pair_count(0), 0);
/// ```
#[must_use]
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// All index pairs `(i, j)` with `i < j < n`, in lexicographic order.
///
/// # Examples
///
/// ```
/// use mixed_doe::utils::pairs;
///
/// let p: Vec<(usize, usize)> = pairs(3).collect();
/// assert_eq!(p, vec![(0, 1), (0, 2), (1, 2)]);
/// ```
pub fn pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
}

/// Arithmetic mean. Returns `NaN` for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divisor N).
#[must_use]
pub fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Median of the values; the midpoint of the two central values for even lengths.
///
/// Returns `NaN` for an empty slice.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
