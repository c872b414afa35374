//! Plain-text summary of an analysis.
//!
//! ```text
//! Response Variable: Lvalue
//!   R² (approx):          0.9876
//!   Adjusted R² (approx): 0.9812
//!   ...
//! ```

use std::fmt;

use crate::doe::{DOEAnalysis, ResponseAnalysis, Stage};

/// Displays the per-response console summary of a [`DOEAnalysis`].
#[derive(Debug, Clone, Copy)]
pub struct Summary<'a>(pub &'a DOEAnalysis);

/// Render the summary of `analysis` to a string.
#[must_use]
pub fn render_summary(analysis: &DOEAnalysis) -> String {
    Summary(analysis).to_string()
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let analysis = self.0;
        let names: Vec<String> = analysis.reduced_terms.iter().map(ToString::to_string).collect();
        writeln!(f, "Reduced model terms: {}", names.join(" + "))?;
        match analysis.condition_number {
            Some(c) => writeln!(f, "Condition number of X'X: {c:.4e}")?,
            None => writeln!(f, "Condition number of X'X: not available")?,
        }

        for result in &analysis.results {
            writeln!(f)?;
            write_response(f, analysis, result)?;
        }

        if !analysis.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures:")?;
            for failure in &analysis.failures {
                writeln!(f, "  {failure}")?;
            }
        }
        Ok(())
    }
}

fn write_response(f: &mut fmt::Formatter<'_>, analysis: &DOEAnalysis, result: &ResponseAnalysis) -> fmt::Result {
    let d = &result.diagnostics;
    writeln!(f, "Response Variable: {}", result.response)?;
    writeln!(f, "  R² (approx):          {:.4}", d.r2_approximate)?;
    writeln!(f, "  Adjusted R² (approx): {:.4}", d.adjusted_r2_approximate)?;
    writeln!(f, "  RMSE:                 {:.4}", d.rmse)?;
    writeln!(f, "  Mean of Response:     {:.4}", d.mean_response)?;
    writeln!(f, "  Observations:         {}", d.observations)?;
    writeln!(
        f,
        "  Variance components:  group {:.4}, residual {:.4}",
        result.variance.group_var, result.variance.residual_var
    )?;

    writeln!(f)?;
    match &result.lack_of_fit {
        Some(lof) => {
            writeln!(f, "  Lack-of-Fit Test:")?;
            writeln!(
                f,
                "    {:<12} {:>4} {:>14} {:>14} {:>10} {:>10}",
                "Source", "DF", "Sum of Sq", "Mean Square", "F Ratio", "Prob > F"
            )?;
            writeln!(
                f,
                "    {:<12} {:>4} {:>14.4} {:>14.4} {:>10.4} {:>10.4}",
                "Lack of Fit", lof.df_lack_of_fit, lof.ss_lack_of_fit, lof.ms_lack_of_fit, lof.f_ratio, lof.p_value
            )?;
            writeln!(
                f,
                "    {:<12} {:>4} {:>14.4} {:>14.4}",
                "Pure Error", lof.df_pure_error, lof.ss_pure_error, lof.ms_pure_error
            )?;
            writeln!(
                f,
                "    {:<12} {:>4} {:>14.4}",
                "Total Error",
                lof.df_total_error(),
                lof.ss_total_error()
            )?;
        }
        None => {
            let reason = analysis
                .failures_for(&result.response)
                .find(|fail| fail.stage == Stage::LackOfFit)
                .map_or_else(|| "not computed".to_string(), |fail| fail.error.to_string());
            writeln!(f, "  Lack-of-Fit Test: unavailable ({reason})")?;
        }
    }

    writeln!(f)?;
    writeln!(f, "  Fixed Effects Estimates (Uncoded):")?;
    writeln!(f, "    {:>14}  Term", "Estimate")?;
    for row in &result.decoded {
        writeln!(f, "    {:>14.6}  {}", row.estimate, row.factor)?;
    }
    Ok(())
}
