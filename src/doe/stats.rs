//! Statistical utilities for DOE analysis.
//!
//! Provides:
//! - LogWorth (`-log10(p)`) with the 1e-16 p-value floor
//! - Upper-tail F-distribution probabilities
//! - Two-sided normal p-values for z statistics

use statrs::distribution::{ContinuousCDF, FisherSnedecor, Normal};

use crate::error::{Error, Result};

/// Smallest p-value used before taking logarithms; caps LogWorth at 16.
pub const P_VALUE_FLOOR: f64 = 1e-16;

/// LogWorth of [`P_VALUE_FLOOR`].
pub const MAX_LOGWORTH: f64 = 16.0;

/// LogWorth above which a term counts as significant in one response (p < 0.05).
pub const SIGNIFICANT_LOGWORTH: f64 = 1.3;

/// LogWorth of a p-value: `-log10(max(p, 1e-16))`.
///
/// An undefined (`NaN`) p-value is treated as 1, giving LogWorth 0.
///
/// # Example
///
/// ```
/// use mixed_doe::doe::logworth;
///
/// assert_eq!(logworth(1.0), 0.0);
/// assert!((logworth(0.05) - 1.30103).abs() < 1e-5);
/// assert_eq!(logworth(0.0), 16.0);
/// ```
#[must_use]
pub fn logworth(p: f64) -> f64 {
    if p.is_nan() {
        return 0.0;
    }
    if p <= P_VALUE_FLOOR {
        return MAX_LOGWORTH;
    }
    let lw = -p.min(1.0).log10();
    // -log10(1) is -0.0
    if lw == 0.0 {
        0.0
    } else {
        lw
    }
}

/// Probability `P(F > f)` for an F distribution with `df1`, `df2` degrees of freedom.
///
/// An infinite statistic gives 0; a non-positive one gives 1.
///
/// # Errors
///
/// Returns [`Error::Numerical`] for non-positive degrees of freedom or a `NaN` statistic.
pub fn f_upper_tail(f: f64, df1: f64, df2: f64) -> Result<f64> {
    if f.is_nan() {
        return Err(Error::numerical("F statistic is NaN"));
    }
    let dist = FisherSnedecor::new(df1, df2)
        .map_err(|e| Error::numerical(format!("F({df1}, {df2}): {e}")))?;
    if f == f64::INFINITY {
        return Ok(0.0);
    }
    if f <= 0.0 {
        return Ok(1.0);
    }
    Ok(dist.sf(f).clamp(0.0, 1.0))
}

/// Two-sided p-value of a standard normal statistic.
///
/// # Errors
///
/// Returns [`Error::Numerical`] for a `NaN` statistic.
pub fn normal_two_sided(z: f64) -> Result<f64> {
    if z.is_nan() {
        return Err(Error::numerical("z statistic is NaN"));
    }
    let dist = Normal::new(0.0, 1.0).map_err(|e| Error::numerical(e.to_string()))?;
    Ok((2.0 * dist.sf(z.abs())).min(1.0))
}
