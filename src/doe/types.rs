//! DOE analysis types.
//!
//! Configuration and result records for the screening → reduction →
//! mixed-model pipeline. Result records are flat, finite-valued rows so an
//! external collaborator can export them without further processing.

use std::collections::HashSet;
use std::fmt;

use crate::data::StandardizationRow;
use crate::error::{Error, Result};
use crate::terms::Term;

use super::decode::{DecodedCoefficient, NaturalPolynomial};
use super::mixed::MixedFit;

/// Settings for the REML variance-ratio search.
///
/// The random-intercept model is profiled on `gamma = Group_Var / Residual_Var`.
/// The search covers `gamma = 0` plus `ln(gamma)` in `[log_ratio_min, log_ratio_max]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MixedModelConfig {
    /// Lower end of the `ln(gamma)` search interval (default: -20).
    pub log_ratio_min: f64,
    /// Upper end of the `ln(gamma)` search interval (default: 12).
    pub log_ratio_max: f64,
    /// Points in the initial grid over the interval (default: 65).
    pub grid_points: usize,
    /// Width of the final `ln(gamma)` bracket (default: 1e-8).
    pub tolerance: f64,
    /// Maximum golden-section refinements (default: 200).
    pub max_iterations: usize,
}

impl Default for MixedModelConfig {
    fn default() -> Self {
        Self {
            log_ratio_min: -20.0,
            log_ratio_max: 12.0,
            grid_points: 65,
            tolerance: 1e-8,
            max_iterations: 200,
        }
    }
}

/// Configuration for a full analysis run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    /// Predictor (factor) column names, in model order.
    pub predictors: Vec<String>,
    /// Response column names, each modeled independently.
    pub responses: Vec<String>,
    /// Keep a term whose Max LogWorth reaches this value (default: 1.3).
    pub logworth_threshold: f64,
    /// Keep a term significant in at least this many responses (default: 2).
    pub min_significant: usize,
    /// Per-response LogWorth above which a term counts as significant (default: 1.3).
    pub significance_logworth: f64,
    /// REML search settings.
    pub mixed_model: MixedModelConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            predictors: ["dye1", "dye2", "Time", "Temp"].map(String::from).to_vec(),
            responses: ["Lvalue", "Avalue", "Bvalue"].map(String::from).to_vec(),
            logworth_threshold: 1.3,
            min_significant: 2,
            significance_logworth: super::stats::SIGNIFICANT_LOGWORTH,
            mixed_model: MixedModelConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Configuration with the given columns and default thresholds.
    #[must_use]
    pub fn with_columns(predictors: Vec<String>, responses: Vec<String>) -> Self {
        Self {
            predictors,
            responses,
            ..Self::default()
        }
    }

    /// Check names and thresholds for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for empty, duplicate, overlapping, or
    /// unparsable names, and for non-finite thresholds or an empty search interval.
    pub fn validate(&self) -> Result<()> {
        if self.predictors.is_empty() {
            return Err(Error::invalid_config("at least one predictor is required"));
        }
        if self.responses.is_empty() {
            return Err(Error::invalid_config("at least one response is required"));
        }

        let mut seen = HashSet::new();
        for name in self.predictors.iter().chain(&self.responses) {
            if name.trim().is_empty() {
                return Err(Error::invalid_config("column names must not be blank"));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::invalid_config(format!(
                    "column '{name}' is listed more than once"
                )));
            }
        }
        // ':' '(' '*' are term syntax
        if let Some(bad) = self
            .predictors
            .iter()
            .find(|p| p.contains(':') || p.contains('(') || p.contains('*') || p == &"Intercept")
        {
            return Err(Error::invalid_config(format!(
                "predictor name '{bad}' clashes with term notation"
            )));
        }

        if !self.logworth_threshold.is_finite() || !self.significance_logworth.is_finite() {
            return Err(Error::invalid_config("LogWorth thresholds must be finite"));
        }

        let mm = &self.mixed_model;
        if !(mm.log_ratio_min < mm.log_ratio_max) || mm.grid_points < 3 || !(mm.tolerance > 0.0) {
            return Err(Error::invalid_config(
                "mixed-model search needs log_ratio_min < log_ratio_max, grid_points >= 3 and tolerance > 0",
            ));
        }
        Ok(())
    }
}

/// A row of an effect table: the intercept or a model term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Effect {
    /// The implicit intercept.
    Intercept,
    /// A response-surface term.
    Term(Term),
}

impl Effect {
    /// The term, unless this is the intercept.
    #[must_use]
    pub fn term(&self) -> Option<&Term> {
        match self {
            Self::Intercept => None,
            Self::Term(t) => Some(t),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intercept => write!(f, "Intercept"),
            Self::Term(t) => write!(f, "{t}"),
        }
    }
}

/// Type-III ANOVA entry for a single effect.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ANOVAEntry {
    /// Effect tested.
    pub effect: Effect,
    /// Extra residual sum of squares from dropping this effect.
    pub sum_of_squares: f64,
    /// Degrees of freedom (one column per effect, 0 when aliased).
    pub degrees_of_freedom: usize,
    /// Mean square (SS / df).
    pub mean_square: f64,
    /// F-ratio (MS_effect / MS_error), `None` when the fit is exact.
    pub f_ratio: Option<f64>,
    /// P-value from the F-distribution; 1 for an aliased effect.
    pub p_value: f64,
    /// The column is a linear combination of earlier columns and was not estimated.
    pub aliased: bool,
}

/// Complete Type-III ANOVA result for one response.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ANOVAResult {
    /// One entry per design column, intercept first.
    pub entries: Vec<ANOVAEntry>,
    /// Residual sum of squares.
    pub error_ss: f64,
    /// Residual degrees of freedom.
    pub error_df: usize,
    /// Residual mean square.
    pub error_ms: f64,
}

/// One row of an effect summary.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectRow {
    /// Intercept or term.
    pub effect: Effect,
    /// LogWorth per response, in the summary's response order (0 when absent).
    pub logworth: Vec<f64>,
    /// Median LogWorth across responses.
    pub median_logworth: f64,
    /// Maximum LogWorth across responses.
    pub max_logworth: f64,
    /// Number of responses where LogWorth exceeds the significance cutoff.
    pub appears_significant: usize,
}

/// Merged LogWorth table across responses, sorted by descending Max LogWorth.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectSummary {
    /// Response names, one per LogWorth column.
    pub responses: Vec<String>,
    /// Rows, sorted by descending Max LogWorth.
    pub rows: Vec<EffectRow>,
}

impl EffectSummary {
    /// Look up a row by effect name.
    #[must_use]
    pub fn row(&self, name: &str) -> Option<&EffectRow> {
        self.rows.iter().find(|r| r.effect.to_string() == name)
    }

    /// LogWorth of `effect` for `response`, if both exist.
    #[must_use]
    pub fn logworth(&self, effect: &str, response: &str) -> Option<f64> {
        let col = self.responses.iter().position(|r| r == response)?;
        self.row(effect).map(|r| r.logworth[col])
    }
}

/// Pipeline stages, used to label failures and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    /// Predictor z-scoring.
    Standardize,
    /// Full-model OLS screening.
    Screening,
    /// Hierarchical term reduction.
    Reduction,
    /// Condition number of the reduced design.
    Collinearity,
    /// OLS screening over the reduced terms.
    SimplifiedScreening,
    /// REML mixed-model fit.
    MixedFit,
    /// Coefficient decoding to natural units.
    Decode,
    /// R², RMSE and residual tables.
    Diagnostics,
    /// Lack-of-Fit decomposition.
    LackOfFit,
}

impl Stage {
    /// Stable lowercase name for logs and exports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standardize => "standardize",
            Self::Screening => "screening",
            Self::Reduction => "reduction",
            Self::Collinearity => "collinearity",
            Self::SimplifiedScreening => "simplified_screening",
            Self::MixedFit => "mixed_fit",
            Self::Decode => "decode",
            Self::Diagnostics => "diagnostics",
            Self::LackOfFit => "lack_of_fit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable failure recorded during the run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StageFailure {
    /// Stage that failed.
    pub stage: Stage,
    /// Affected response, or `None` for run-wide diagnostics.
    pub response: Option<String>,
    /// What went wrong.
    pub error: Error,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.response {
            Some(r) => write!(f, "[{}] {}: {}", self.stage, r, self.error),
            None => write!(f, "[{}] {}", self.stage, self.error),
        }
    }
}

/// Fixed-effect estimate in standardized (coded) units.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodedCoefficient {
    /// Response name.
    pub response: String,
    /// `Intercept` or term name.
    pub factor: String,
    /// Estimate (the intercept row carries the pure fixed intercept).
    pub estimate: f64,
    /// Standard error from the GLS covariance.
    pub std_error: f64,
    /// Wald z statistic, `None` when the standard error is zero.
    pub z: Option<f64>,
    /// Two-sided normal p-value, `None` when `z` is undefined.
    pub p_value: Option<f64>,
    /// LogWorth of the p-value (0 when undefined).
    pub logworth: f64,
}

/// Approximate fit statistics for one response.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostics {
    /// Response name.
    pub response: String,
    /// `1 - SS_resid / SS_total` from the conditional fitted values.
    pub r2_approximate: f64,
    /// `1 - (1 - R²)(N - 1)/(N - k - 1)`.
    pub adjusted_r2_approximate: f64,
    /// `sqrt(mean(residual²))`.
    pub rmse: f64,
    /// Mean of the response.
    pub mean_response: f64,
    /// Number of observations.
    pub observations: usize,
}

/// Variance components of the random-intercept model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarianceComponents {
    /// Response name.
    pub response: String,
    /// Random-intercept (configuration) variance.
    pub group_var: f64,
    /// Residual variance.
    pub residual_var: f64,
    /// `sqrt(residual_var)`.
    pub rmse_from_var: f64,
}

/// One observation's residual record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResidualRow {
    /// 0-based observation index.
    pub id: usize,
    /// Configuration Key of the observation.
    pub config_key: String,
    /// Observed response.
    pub actual: f64,
    /// Conditional fitted value (fixed effects plus configuration BLUP).
    pub predicted: f64,
    /// `actual - predicted`.
    pub residual: f64,
    /// Residual / RMSE. An approximation: no leverage is available for the mixed model.
    pub pseudo_studentized_residual: f64,
}

/// Lack-of-Fit vs. Pure-Error decomposition for one response.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LackOfFit {
    /// Response name.
    pub response: String,
    /// `#groups - k - 1`.
    pub df_lack_of_fit: usize,
    /// `Σ n_g (local_mean_g - fitted_mean_g)²`.
    pub ss_lack_of_fit: f64,
    /// `SS / DF` for Lack-of-Fit.
    pub ms_lack_of_fit: f64,
    /// `N - #groups`.
    pub df_pure_error: usize,
    /// `Σ (y_i - local_mean_g(i))²`.
    pub ss_pure_error: f64,
    /// `SS / DF` for Pure Error.
    pub ms_pure_error: f64,
    /// `MS_Lack / MS_Pure`.
    pub f_ratio: f64,
    /// Upper-tail F probability.
    pub p_value: f64,
}

impl LackOfFit {
    /// Total residual degrees of freedom.
    #[must_use]
    pub fn df_total_error(&self) -> usize {
        self.df_lack_of_fit + self.df_pure_error
    }

    /// Total residual sum of squares.
    #[must_use]
    pub fn ss_total_error(&self) -> f64 {
        self.ss_lack_of_fit + self.ss_pure_error
    }
}

/// Everything produced for one successfully fitted response.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResponseAnalysis {
    /// Response name.
    pub response: String,
    /// Model formula in patsy notation.
    pub formula: String,
    /// The REML fit.
    pub fit: MixedFit,
    /// Coded coefficient table.
    pub coded: Vec<CodedCoefficient>,
    /// Natural-unit coefficient table, intercept first.
    pub decoded: Vec<DecodedCoefficient>,
    /// Exact natural-unit expansion of the fixed-effect polynomial.
    pub natural: NaturalPolynomial,
    /// Fit statistics.
    pub diagnostics: Diagnostics,
    /// Variance components.
    pub variance: VarianceComponents,
    /// Residual table.
    pub residuals: Vec<ResidualRow>,
    /// Lack-of-Fit record, absent when the test is degenerate.
    pub lack_of_fit: Option<LackOfFit>,
}

impl ResponseAnalysis {
    /// The fixed-effects-only intercept (standardized space).
    #[must_use]
    pub fn fixed_intercept(&self) -> f64 {
        self.fit.fixed_intercept()
    }
}

/// Complete DOE analysis result.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DOEAnalysis {
    /// Predictor names, in model order.
    pub predictors: Vec<String>,
    /// Response names, in configured order.
    pub responses: Vec<String>,
    /// Pre- and post-standardization statistics per predictor.
    pub standardization: Vec<StandardizationRow>,
    /// Full response-surface term list.
    pub full_terms: Vec<Term>,
    /// Full-model LogWorth summary.
    pub full_effects: EffectSummary,
    /// Shared reduced term set (hierarchical, sorted by name).
    pub reduced_terms: Vec<Term>,
    /// Condition number of X'X for the reduced design, when computable.
    pub condition_number: Option<f64>,
    /// Reduced-model LogWorth summary.
    pub reduced_effects: EffectSummary,
    /// Successfully analyzed responses, in configured order.
    pub results: Vec<ResponseAnalysis>,
    /// Recoverable failures, in the order they occurred.
    pub failures: Vec<StageFailure>,
}

impl DOEAnalysis {
    /// Result for a response, if it was fitted.
    #[must_use]
    pub fn response(&self, name: &str) -> Option<&ResponseAnalysis> {
        self.results.iter().find(|r| r.response == name)
    }

    /// `(response, fixed intercept)` for every fitted response.
    #[must_use]
    pub fn fixed_intercepts(&self) -> Vec<(String, f64)> {
        self.results
            .iter()
            .map(|r| (r.response.clone(), r.fixed_intercept()))
            .collect()
    }

    /// Failures recorded for one response.
    pub fn failures_for<'a>(&'a self, response: &'a str) -> impl Iterator<Item = &'a StageFailure> {
        self.failures
            .iter()
            .filter(move |f| f.response.as_deref() == Some(response))
    }
}
