//! Approximate fit diagnostics from conditional fitted values.

use super::types::{Diagnostics, ResidualRow, VarianceComponents};
use crate::error::{Error, Result};
use crate::utils::mean;

/// R², adjusted R² and RMSE for one response.
///
/// `n_fixed_terms` excludes the intercept.
///
/// # Errors
///
/// Returns [`Error::Numerical`] if the response is constant, the lengths
/// disagree, or `N − k − 1` is not positive.
pub fn fit_diagnostics(response: &str, y: &[f64], fitted: &[f64], n_fixed_terms: usize) -> Result<Diagnostics> {
    let n = y.len();
    if fitted.len() != n || n == 0 {
        return Err(Error::numerical("diagnostics inputs have different lengths"));
    }
    let y_bar = mean(y);
    let ss_total: f64 = y.iter().map(|v| (v - y_bar).powi(2)).sum();
    if !(ss_total > 0.0) {
        return Err(Error::numerical(format!("response '{response}' is constant")));
    }
    if n <= n_fixed_terms + 1 {
        return Err(Error::numerical(format!(
            "adjusted R² needs more than {} observations",
            n_fixed_terms + 1
        )));
    }

    let ss_resid: f64 = y.iter().zip(fitted).map(|(a, f)| (a - f).powi(2)).sum();
    let r2 = 1.0 - ss_resid / ss_total;
    let adjusted = 1.0 - (1.0 - r2) * (n - 1) as f64 / (n - n_fixed_terms - 1) as f64;

    Ok(Diagnostics {
        response: response.to_string(),
        r2_approximate: r2,
        adjusted_r2_approximate: adjusted,
        rmse: (ss_resid / n as f64).sqrt(),
        mean_response: y_bar,
        observations: n,
    })
}

/// Variance components record.
#[must_use]
pub fn variance_components(response: &str, group_var: f64, residual_var: f64) -> VarianceComponents {
    VarianceComponents {
        response: response.to_string(),
        group_var,
        residual_var,
        rmse_from_var: residual_var.max(0.0).sqrt(),
    }
}

/// Per-observation residual table.
///
/// The pseudo-studentized residual divides by `rmse`; with a zero RMSE it is
/// the raw residual.
#[must_use]
pub fn residual_table(config_keys: &[String], y: &[f64], fitted: &[f64], rmse: f64) -> Vec<ResidualRow> {
    config_keys
        .iter()
        .zip(y.iter().zip(fitted))
        .enumerate()
        .map(|(id, (key, (&actual, &predicted)))| {
            let residual = actual - predicted;
            ResidualRow {
                id,
                config_key: key.clone(),
                actual,
                predicted,
                residual,
                pseudo_studentized_residual: if rmse > 0.0 { residual / rmse } else { residual },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_diagnostics() {
        let y = [1.0, 2.0, 3.0, 4.0, 5.0];
        let fitted = [1.1, 1.9, 3.0, 4.2, 4.8];
        let d = fit_diagnostics("y", &y, &fitted, 1).unwrap();

        // SS_resid = 0.01 + 0.01 + 0 + 0.04 + 0.04, SS_total = 10
        assert_relative_eq!(d.r2_approximate, 0.99, epsilon = 1e-12);
        assert_relative_eq!(d.adjusted_r2_approximate, 1.0 - 0.01 * 4.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(d.rmse, (0.1_f64 / 5.0).sqrt(), epsilon = 1e-12);
        assert_eq!(d.mean_response, 3.0);
        assert_eq!(d.observations, 5);
    }

    #[test]
    fn test_constant_response_is_an_error() {
        let y = [2.0; 4];
        assert!(fit_diagnostics("y", &y, &y, 0).is_err());
    }

    #[test]
    fn test_residual_table() {
        let keys = vec!["1_2".to_string(), "1_2".to_string(), "3_4".to_string()];
        let rows = residual_table(&keys, &[1.0, 2.0, 3.0], &[1.5, 1.5, 3.0], 0.5);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].id, 1);
        assert_eq!(rows[0].residual, -0.5);
        assert_eq!(rows[0].pseudo_studentized_residual, -1.0);
        assert_eq!(rows[2].config_key, "3_4");

        let rows = residual_table(&keys, &[1.0, 2.0, 3.0], &[1.0, 2.0, 2.5], 0.0);
        assert_eq!(rows[2].pseudo_studentized_residual, 0.5);
    }

    #[test]
    fn test_variance_components() {
        let v = variance_components("y", 2.0, 0.25);
        assert_eq!(v.rmse_from_var, 0.5);
    }
}
