//! Lack-of-Fit vs. Pure-Error decomposition.
//!
//! Residuals are partitioned by Configuration Key. Pure error is the
//! spread of replicates around their own configuration mean; lack of fit
//! is the spread of configuration means around the model's mean fitted
//! value for that configuration:
//!
//! ```text
//! SS_Pure = Σ_i (y_i − ȳ_g(i))²                 DF_Pure = N − G
//! SS_Lack = Σ_g n_g (ȳ_g − ŷ̄_g)²                DF_Lack = G − k − 1
//! F       = (SS_Lack / DF_Lack) / (SS_Pure / DF_Pure)
//! ```
//!
//! `k` counts the fixed-effect terms excluding the intercept. When the
//! fitted values are constant within each configuration the two sums of
//! squares add up to the residual sum of squares.

use tracing::debug;

use super::stats::f_upper_tail;
use super::types::LackOfFit;
use crate::data::Grouping;
use crate::error::{Error, LackOfFitDegeneracy, Result};
use crate::utils::mean;

/// Compute the Lack-of-Fit table for one response.
///
/// # Errors
///
/// Returns [`Error::DegenerateLackOfFit`] when the lack-of-fit degrees of
/// freedom are not positive, there are no replicates, or the pure error is
/// zero; and [`Error::Numerical`] when the inputs disagree in length.
pub fn lack_of_fit(
    response: &str,
    y: &[f64],
    fitted: &[f64],
    grouping: &Grouping,
    n_fixed_terms: usize,
) -> Result<LackOfFit> {
    let n = y.len();
    if fitted.len() != n || grouping.n_observations() != n {
        return Err(Error::numerical("lack-of-fit inputs have different lengths"));
    }

    let groups = grouping.n_groups();
    let df_lack = groups as i64 - n_fixed_terms as i64 - 1;
    if df_lack <= 0 {
        return Err(Error::DegenerateLackOfFit {
            reason: LackOfFitDegeneracy::NoLackOfFitDegreesOfFreedom { df: df_lack },
        });
    }
    let df_pure = n - groups;
    if df_pure == 0 {
        return Err(Error::DegenerateLackOfFit {
            reason: LackOfFitDegeneracy::NoReplicates,
        });
    }

    let local_means = grouping.group_means(y);
    let fitted_means = grouping.group_means(fitted);

    let ss_pure: f64 = y
        .iter()
        .zip(grouping.membership())
        .map(|(v, &g)| (v - local_means[g]).powi(2))
        .sum();
    let ss_lack: f64 = grouping
        .counts()
        .iter()
        .zip(local_means.iter().zip(&fitted_means))
        .map(|(&c, (m, f))| c as f64 * (m - f).powi(2))
        .sum();

    let y_bar = mean(y);
    let ss_total: f64 = y.iter().map(|v| (v - y_bar).powi(2)).sum();
    if ss_pure <= 1e-12 * ss_total {
        return Err(Error::DegenerateLackOfFit {
            reason: LackOfFitDegeneracy::ZeroPureError,
        });
    }

    let df_lack = df_lack as usize;
    let ms_lack = ss_lack / df_lack as f64;
    let ms_pure = ss_pure / df_pure as f64;
    let f_ratio = ms_lack / ms_pure;
    let p_value = f_upper_tail(f_ratio, df_lack as f64, df_pure as f64)?;

    debug!(stage = "lack_of_fit", response, f_ratio, p_value, "lack-of-fit computed");

    Ok(LackOfFit {
        response: response.to_string(),
        df_lack_of_fit: df_lack,
        ss_lack_of_fit: ss_lack,
        ms_lack_of_fit: ms_lack,
        df_pure_error: df_pure,
        ss_pure_error: ss_pure,
        ms_pure_error: ms_pure,
        f_ratio,
        p_value,
    })
}
