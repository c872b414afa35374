//! Type-III ANOVA for response-surface screening.
//!
//! Every effect occupies one design column, so the Type-III sum of squares
//! of effect `j` is the extra residual sum of squares from dropping that
//! column alone: `SS_j = b_j² / [(X'X)^-1]_jj`. Each effect is tested with
//! `F = SS_j / MSE` on `(1, n - p)` degrees of freedom.
//!
//! Columns aliased with earlier columns (a coded square in a two-level
//! factor, for instance) are left out of the fit and reported with zero
//! degrees of freedom and p = 1.
//!
//! When the fit is exact (residual sum of squares negligible against the
//! response scale) the F-ratio is undefined. Effects that still explain
//! variation then get p = 0, and effects that explain none get p = 1.

use tracing::debug;

use super::design::DesignMatrix;
use super::ols::{estimable_columns, fit_ols, OlsFit};
use super::stats::f_upper_tail;
use super::types::{ANOVAEntry, ANOVAResult, Effect};
use crate::error::{Error, Result};

/// Relative size (against `Σ y²`) below which a sum of squares counts as zero.
const EXACT_FIT_TOLERANCE: f64 = 1e-20;

/// Calculate the Type-III ANOVA table for one response.
///
/// # Arguments
/// * `design` - Design matrix with the intercept in column 0
/// * `y` - Response values, one per design row
///
/// # Returns
/// * ANOVAResult with one entry per design column, intercept first;
///   aliased columns carry `aliased = true`
///
/// # Errors
///
/// Propagates least-squares failures on the estimable columns
/// ([`Error::Saturated`], [`Error::SingularDesign`], [`Error::Numerical`]).
pub fn calculate_anova(design: &DesignMatrix, y: &[f64]) -> Result<ANOVAResult> {
    let kept = estimable_columns(design.matrix());
    if kept.len() == design.ncols() {
        let fit = fit_ols(design, y)?;
        return anova_from_fit(design, y, &fit);
    }
    if kept.first() != Some(&0) {
        return Err(Error::SingularDesign {
            rank: kept.len(),
            columns: design.ncols(),
        });
    }

    let estimable = design.select(&kept);
    debug!(
        aliased = design.ncols() - kept.len(),
        "aliased columns left out of the screening fit"
    );
    let fit = fit_ols(&estimable, y)?;
    let partial = anova_from_fit(&estimable, y, &fit)?;

    let mut estimated = partial.entries.into_iter();
    let entries = effects(design)
        .enumerate()
        .map(|(j, effect)| {
            let entry = if kept.binary_search(&j).is_ok() {
                estimated.next()
            } else {
                None
            };
            entry.unwrap_or_else(|| aliased_entry(effect))
        })
        .collect();

    Ok(ANOVAResult { entries, ..partial })
}

fn effects(design: &DesignMatrix) -> impl Iterator<Item = Effect> + '_ {
    std::iter::once(Effect::Intercept).chain(design.terms().iter().cloned().map(Effect::Term))
}

fn aliased_entry(effect: Effect) -> ANOVAEntry {
    ANOVAEntry {
        effect,
        sum_of_squares: 0.0,
        degrees_of_freedom: 0,
        mean_square: 0.0,
        f_ratio: None,
        p_value: 1.0,
        aliased: true,
    }
}

/// Build the ANOVA table from an existing least-squares fit.
///
/// # Errors
///
/// Returns [`crate::Error::Numerical`] if a p-value cannot be computed.
pub fn anova_from_fit(design: &DesignMatrix, y: &[f64], fit: &OlsFit) -> Result<ANOVAResult> {
    let scale = y.iter().map(|v| v * v).sum::<f64>().max(f64::MIN_POSITIVE);
    let exact = fit.rss <= EXACT_FIT_TOLERANCE * scale;
    let error_df = fit.df_resid;
    let error_ms = fit.mse();

    let mut entries = Vec::with_capacity(design.ncols());
    for (j, effect) in effects(design).enumerate() {
        let b = fit.coefficients[j];
        let c = fit.xtx_inverse[(j, j)];
        let ss = if c > 0.0 { b * b / c } else { 0.0 };

        let (f_ratio, p_value) = if exact {
            let p = if ss > EXACT_FIT_TOLERANCE * scale { 0.0 } else { 1.0 };
            (None, p)
        } else {
            let f = ss / error_ms;
            (Some(f), f_upper_tail(f, 1.0, error_df as f64)?)
        };

        entries.push(ANOVAEntry {
            effect,
            sum_of_squares: ss,
            degrees_of_freedom: 1,
            mean_square: ss,
            f_ratio,
            p_value,
            aliased: false,
        });
    }

    Ok(ANOVAResult {
        entries,
        error_ss: fit.rss,
        error_df,
        error_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::Term;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn two_factor_design(z: &Array2<f64>) -> DesignMatrix {
        let names = vec!["a".to_string(), "b".to_string()];
        let terms = vec![Term::Linear("a".into()), Term::Linear("b".into())];
        DesignMatrix::build(z, &names, &terms).unwrap()
    }

    #[test]
    fn test_anova_orthogonal_ss() {
        // Replicated 2x2 factorial: SS for a coded ±1 factor is N * b²
        let z = array![
            [-1.0, -1.0],
            [-1.0, 1.0],
            [1.0, -1.0],
            [1.0, 1.0],
            [-1.0, -1.0],
            [-1.0, 1.0],
            [1.0, -1.0],
            [1.0, 1.0],
        ];
        let y = [10.0, 20.0, 30.0, 40.0, 11.0, 21.0, 31.0, 41.0];
        let design = two_factor_design(&z);
        let anova = calculate_anova(&design, &y).unwrap();

        assert_eq!(anova.entries.len(), 3);
        assert_eq!(anova.error_df, 5);
        // b_a = 10, b_b = 5
        assert_relative_eq!(anova.entries[1].sum_of_squares, 800.0, epsilon = 1e-9);
        assert_relative_eq!(anova.entries[2].sum_of_squares, 200.0, epsilon = 1e-9);
        // Residuals are ±0.5 around each cell mean
        assert_relative_eq!(anova.error_ss, 2.0, epsilon = 1e-9);
        assert!(anova.entries[1].p_value < anova.entries[2].p_value);
        assert!(anova.entries.iter().all(|e| e.f_ratio.is_some()));
    }

    #[test]
    fn test_anova_matches_drop_one_refit() {
        let z = array![
            [-1.0, 0.3],
            [-0.5, -1.2],
            [0.0, 0.8],
            [0.4, -0.1],
            [1.1, 1.5],
            [0.7, -0.9],
            [-0.2, 0.2],
        ];
        let y = [3.1, 1.9, 4.4, 3.0, 6.2, 2.7, 3.3];
        let full = two_factor_design(&z);
        let anova = calculate_anova(&full, &y).unwrap();

        let reduced = DesignMatrix::build(&z, &["a".into(), "b".into()], &[Term::Linear("a".into())]).unwrap();
        let rss_reduced = fit_ols(&reduced, &y).unwrap().rss;
        assert_relative_eq!(
            anova.entries[2].sum_of_squares,
            rss_reduced - anova.error_ss,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_anova_two_level_quadratic_aliasing() {
        // Replicated coded 2x2 factorial under the full quadratic model
        let mut rows = Vec::new();
        let mut y = Vec::new();
        let wobble = [0.03, -0.02, 0.01, -0.04, 0.02, -0.01];
        for (k, (a, b)) in [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)].into_iter().enumerate() {
            for rep in 0..3 {
                rows.extend([a, b]);
                y.push(1.0 + 2.0 * a + 0.1 * b + wobble[(k + rep) % wobble.len()]);
            }
        }
        let z = Array2::from_shape_vec((12, 2), rows).unwrap();
        let names = vec!["a".to_string(), "b".to_string()];
        let design = DesignMatrix::build(&z, &names, &crate::terms::build_rsm_terms(&names)).unwrap();
        let anova = calculate_anova(&design, &y).unwrap();

        assert_eq!(anova.entries.len(), 6);
        let names: Vec<String> = anova.entries.iter().map(|e| e.effect.to_string()).collect();
        assert_eq!(names, vec!["Intercept", "a", "b", "I(a**2)", "I(b**2)", "a:b"]);
        assert!(anova.entries[3].aliased && anova.entries[4].aliased);
        assert_eq!(anova.entries[3].p_value, 1.0);
        assert_eq!(anova.entries[4].degrees_of_freedom, 0);
        // Intercept, a, b, a:b estimated on 12 - 4 residual df
        assert_eq!(anova.error_df, 8);
        assert!(!anova.entries[1].aliased);
        assert!(anova.entries[1].p_value < 1e-10);
        assert!(anova.entries[2].p_value < 0.05);
    }

    #[test]
    fn test_anova_exact_fit_guard() {
        let z = array![
            [-1.0, -1.0],
            [-1.0, 1.0],
            [1.0, -1.0],
            [1.0, 1.0],
            [0.0, 0.0],
        ];
        // y depends on a only
        let y: Vec<f64> = z.column(0).iter().map(|a| 5.0 + 2.0 * a).collect();
        let anova = calculate_anova(&two_factor_design(&z), &y).unwrap();

        assert!(anova.entries.iter().all(|e| e.f_ratio.is_none()));
        assert_eq!(anova.entries[0].p_value, 0.0);
        assert_eq!(anova.entries[1].p_value, 0.0);
        assert_eq!(anova.entries[2].p_value, 1.0);
    }
}
