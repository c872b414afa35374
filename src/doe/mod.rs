//! DOE (Design of Experiments) analysis module.
//!
//! This module runs the complete response-surface analysis:
//! - Standardization of predictors
//! - Full second-order term expansion
//! - OLS screening with Type-III ANOVA and LogWorth
//! - Hierarchical term reduction shared across responses
//! - Collinearity check of the reduced design
//! - REML random-intercept fits per response (one intercept per configuration)
//! - Decoding of coefficients into natural units
//! - Fit diagnostics and Lack-of-Fit tests
//!
//! ## Quick Start
//!
//! ```rust
//! use mixed_doe::data::Dataset;
//! use mixed_doe::doe::{analyze, AnalysisConfig};
//! use ndarray::Array2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 3x3 factorial in (a, b), each configuration run twice
//! let mut x = Vec::new();
//! let mut y = Vec::new();
//! for a in [1.0, 2.0, 3.0] {
//!     for b in [10.0, 20.0, 30.0] {
//!         for e in [-0.05, 0.05] {
//!             x.extend([a, b]);
//!             y.push(5.0 + 2.0 * a - 0.1 * b + e);
//!         }
//!     }
//! }
//! let dataset = Dataset::from_arrays(
//!     vec!["a".into(), "b".into()],
//!     Array2::from_shape_vec((18, 2), x)?,
//!     vec!["y".into()],
//!     Array2::from_shape_vec((18, 1), y)?,
//! )?;
//!
//! let config = AnalysisConfig::with_columns(vec!["a".into(), "b".into()], vec!["y".into()]);
//! let result = analyze(&dataset, &config)?;
//!
//! let fit = result.response("y").unwrap();
//! println!("{}", fit.formula);
//! println!("R² ≈ {:.4}", fit.diagnostics.r2_approximate);
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure handling
//!
//! Input problems (missing columns, non-numeric cells, a constant
//! predictor) abort the run. Problems with one response are recorded as a
//! [`StageFailure`] and the remaining responses continue. A degenerate
//! Lack-of-Fit test drops only that response's Lack-of-Fit record.

mod anova;
mod collinearity;
mod decode;
mod design;
mod diagnostics;
mod lack_of_fit;
mod mixed;
mod ols;
mod reduce;
mod screening;
mod stats;
mod types;

use std::path::Path;

use ndarray::Array2;
use tracing::{info, warn};

pub use anova::calculate_anova;
pub use collinearity::condition_number;
pub use decode::{decode_coefficients, DecodedCoefficient, NaturalPolynomial};
pub use design::{DesignMatrix, INTERCEPT};
pub use diagnostics::{fit_diagnostics, residual_table, variance_components};
pub use lack_of_fit::lack_of_fit;
pub use mixed::{fit_reml, MixedFit};
pub use ols::{fit_ols, OlsFit};
pub use reduce::{reduce_terms, select_terms};
pub use screening::{screen_effects, summarize, LogWorthColumn};
pub use stats::{f_upper_tail, logworth, normal_two_sided, MAX_LOGWORTH, P_VALUE_FLOOR, SIGNIFICANT_LOGWORTH};
pub use types::{
    ANOVAEntry, ANOVAResult, AnalysisConfig, CodedCoefficient, DOEAnalysis, Diagnostics, Effect, EffectRow,
    EffectSummary, LackOfFit, MixedModelConfig, ResidualRow, ResponseAnalysis, Stage, StageFailure,
    VarianceComponents,
};

use crate::data::{Dataset, Standardizer};
use crate::error::{Error, Result};
use crate::terms::{build_rsm_terms, formula, Term};
use crate::utils::mean;

/// Run the complete analysis on a dataset.
///
/// # Arguments
/// * `dataset` - Experimental runs; its predictor and response columns must
///   match `config`
/// * `config` - Analysis configuration
///
/// # Returns
/// * Complete DOEAnalysis result, with per-response failures recorded in
///   [`DOEAnalysis::failures`]
///
/// # Errors
/// * [`Error::InvalidConfig`] if the configuration is invalid or does not
///   match the dataset's columns
/// * [`Error::ZeroVariance`] if a predictor is constant
pub fn analyze(dataset: &Dataset, config: &AnalysisConfig) -> Result<DOEAnalysis> {
    config.validate()?;
    if dataset.predictor_names() != config.predictors.as_slice()
        || dataset.response_names() != config.responses.as_slice()
    {
        return Err(Error::invalid_config(format!(
            "dataset columns {:?} / {:?} do not match the configured predictors and responses",
            dataset.predictor_names(),
            dataset.response_names()
        )));
    }

    // Standardize predictors
    let scaler = Standardizer::fit(&config.predictors, dataset.predictors())?;
    let standardized = scaler.transform(dataset.predictors())?;
    let standardization = scaler.summary(&standardized);
    info!(
        stage = %Stage::Standardize,
        observations = dataset.n_observations(),
        configurations = dataset.grouping().n_groups(),
        "predictors standardized"
    );

    // Full model screening
    let full_terms = build_rsm_terms(&config.predictors);
    let (full_effects, mut failures) = screen_effects(
        dataset,
        &standardized,
        &full_terms,
        config.significance_logworth,
        Stage::Screening,
    );
    info!(stage = %Stage::Screening, terms = full_terms.len(), failed = failures.len(), "full model screened");

    // Hierarchical reduction
    let reduced_terms = reduce_terms(&full_effects, config.logworth_threshold, config.min_significant);
    if reduced_terms.is_empty() {
        warn!(stage = %Stage::Reduction, "no term passed screening; fitting intercept-only models");
    }
    let reduced_names: Vec<String> = reduced_terms.iter().map(ToString::to_string).collect();
    info!(
        stage = %Stage::Reduction,
        terms = %reduced_names.join(", "),
        "reduced term set"
    );

    // Collinearity
    let (design, condition_number) = match reduced_design(&standardized, &config.predictors, &reduced_terms, &mut failures) {
        Ok((design, kappa)) => (Ok(design), kappa),
        Err(error) => {
            warn!(stage = %Stage::Collinearity, %error, "reduced design unavailable");
            failures.push(StageFailure {
                stage: Stage::Collinearity,
                response: None,
                error: error.clone(),
            });
            (Err(error), None)
        }
    };

    // Reduced model screening
    let (reduced_effects, reduced_failures) = screen_effects(
        dataset,
        &standardized,
        &reduced_terms,
        config.significance_logworth,
        Stage::SimplifiedScreening,
    );
    failures.extend(reduced_failures);

    // Per-response mixed models
    let mut results = Vec::with_capacity(config.responses.len());
    match &design {
        Ok(design) => {
            let context = ResponseContext {
                dataset,
                design,
                scaler: &scaler,
                config,
            };
            for (analysis, response_failures) in map_responses(config.responses.len(), |index| context.analyze(index)) {
                results.extend(analysis);
                failures.extend(response_failures);
            }
        }
        Err(error) => failures.extend(config.responses.iter().map(|name| StageFailure {
            stage: Stage::MixedFit,
            response: Some(name.clone()),
            error: error.clone(),
        })),
    }
    info!(fitted = results.len(), failures = failures.len(), "analysis complete");

    Ok(DOEAnalysis {
        predictors: config.predictors.clone(),
        responses: config.responses.clone(),
        standardization,
        full_terms,
        full_effects,
        reduced_terms,
        condition_number,
        reduced_effects,
        results,
        failures,
    })
}

/// Reduced design matrix and its condition number.
///
/// A condition number that cannot be evaluated is recorded as a
/// [`Stage::Collinearity`] failure and leaves the design usable.
///
/// # Errors
///
/// Returns the error of [`DesignMatrix::build`] if the design cannot be built.
fn reduced_design(
    standardized: &Array2<f64>,
    predictors: &[String],
    terms: &[Term],
    failures: &mut Vec<StageFailure>,
) -> Result<(DesignMatrix, Option<f64>)> {
    let design = DesignMatrix::build(standardized, predictors, terms)?;
    let kappa = match condition_number(&design) {
        Ok(kappa) => {
            info!(stage = %Stage::Collinearity, condition_number = kappa, "reduced design checked");
            Some(kappa)
        }
        Err(error) => {
            warn!(stage = %Stage::Collinearity, %error, "condition number unavailable");
            failures.push(StageFailure {
                stage: Stage::Collinearity,
                response: None,
                error,
            });
            None
        }
    };
    Ok((design, kappa))
}

/// Load a CSV file with the configured columns and analyze it.
///
/// # Errors
///
/// Returns an input error if the file cannot be loaded, and otherwise the
/// errors of [`analyze`].
pub fn analyze_csv(path: impl AsRef<Path>, config: &AnalysisConfig) -> Result<DOEAnalysis> {
    let dataset = Dataset::from_csv_path(path, &config.predictors, &config.responses)?;
    analyze(&dataset, config)
}

/// Coded coefficient table with Wald z statistics.
///
/// # Errors
///
/// Returns [`Error::Numerical`] if a p-value cannot be evaluated.
pub fn coded_coefficients(fit: &MixedFit) -> Result<Vec<CodedCoefficient>> {
    fit.coefficient_names()
        .into_iter()
        .enumerate()
        .map(|(j, factor)| {
            let z = fit.z_statistic(j);
            let p_value = z.map(normal_two_sided).transpose()?;
            Ok(CodedCoefficient {
                response: fit.response.clone(),
                factor,
                estimate: fit.coefficients[j],
                std_error: fit.std_errors[j],
                z,
                p_value,
                logworth: p_value.map_or(0.0, logworth),
            })
        })
        .collect()
}

struct ResponseContext<'a> {
    dataset: &'a Dataset,
    design: &'a DesignMatrix,
    scaler: &'a Standardizer,
    config: &'a AnalysisConfig,
}

impl ResponseContext<'_> {
    fn analyze(&self, index: usize) -> (Option<ResponseAnalysis>, Vec<StageFailure>) {
        let name = &self.config.responses[index];
        let mut failures = Vec::new();
        let fail = |stage: Stage, error: Error| {
            warn!(stage = %stage, response = %name, %error, "response dropped");
            StageFailure {
                stage,
                response: Some(name.clone()),
                error,
            }
        };

        match self.fit(index, name, &mut failures) {
            Ok(analysis) => (Some(analysis), failures),
            Err((stage, error)) => {
                failures.push(fail(stage, error));
                (None, failures)
            }
        }
    }

    fn fit(
        &self,
        index: usize,
        name: &str,
        failures: &mut Vec<StageFailure>,
    ) -> std::result::Result<ResponseAnalysis, (Stage, Error)> {
        let y = self.dataset.response(index).to_vec();
        let grouping = self.dataset.grouping();
        let at = |stage: Stage| move |error: Error| (stage, error);

        let fit = fit_reml(self.design, &y, grouping, name, &self.config.mixed_model).map_err(at(Stage::MixedFit))?;
        let coded = coded_coefficients(&fit).map_err(at(Stage::MixedFit))?;

        let decoded = decode_coefficients(&fit, self.scaler, mean(&y)).map_err(at(Stage::Decode))?;
        let natural = NaturalPolynomial::from_fit(&fit, self.scaler).map_err(at(Stage::Decode))?;

        let k = fit.n_fixed_terms();
        let diagnostics = fit_diagnostics(name, &y, &fit.fitted, k).map_err(at(Stage::Diagnostics))?;
        let variance = variance_components(name, fit.group_var, fit.residual_var);
        let residuals = residual_table(self.dataset.config_keys(), &y, &fit.fitted, diagnostics.rmse);

        let lack_of_fit = match lack_of_fit(name, &y, &fit.fitted, grouping, k) {
            Ok(lof) => Some(lof),
            Err(error) => {
                warn!(stage = %Stage::LackOfFit, response = %name, %error, "lack-of-fit skipped");
                failures.push(StageFailure {
                    stage: Stage::LackOfFit,
                    response: Some(name.to_string()),
                    error,
                });
                None
            }
        };

        info!(
            stage = %Stage::MixedFit,
            response = %name,
            r2 = diagnostics.r2_approximate,
            group_var = fit.group_var,
            residual_var = fit.residual_var,
            "response fitted"
        );

        Ok(ResponseAnalysis {
            response: name.to_string(),
            formula: formula(name, &fit.terms),
            fit,
            coded,
            decoded,
            natural,
            diagnostics,
            variance,
            residuals,
            lack_of_fit,
        })
    }
}

#[cfg(feature = "parallel")]
fn map_responses<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    crate::parallel::map_indexed(n, f)
}

#[cfg(not(feature = "parallel"))]
fn map_responses<T, F>(n: usize, f: F) -> Vec<T>
where
    F: Fn(usize) -> T,
{
    (0..n).map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    /// 3x3 factorial in (a, b), `reps` replicates, responses from `f(a, b, rep)`.
    fn factorial<F>(reps: usize, responses: &[&str], f: F) -> Dataset
    where
        F: Fn(f64, f64, usize) -> Vec<f64>,
    {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for a in [1.0, 2.0, 3.0] {
            for b in [10.0, 20.0, 30.0] {
                for rep in 0..reps {
                    x.extend([a, b]);
                    y.extend(f(a, b, rep));
                }
            }
        }
        let n = 9 * reps;
        Dataset::from_arrays(
            vec!["a".into(), "b".into()],
            Array2::from_shape_vec((n, 2), x).unwrap(),
            responses.iter().map(|s| s.to_string()).collect(),
            Array2::from_shape_vec((n, responses.len()), y).unwrap(),
        )
        .unwrap()
    }

    fn config(responses: &[&str]) -> AnalysisConfig {
        AnalysisConfig::with_columns(
            vec!["a".into(), "b".into()],
            responses.iter().map(|s| s.to_string()).collect(),
        )
    }

    const NOISE: [f64; 3] = [-0.07, 0.02, 0.05];

    #[test]
    fn test_analyze_noise_free_linear() {
        let ds = factorial(2, &["y1", "y2"], |a, b, _| {
            vec![4.0 + 3.0 * a - 0.2 * b, 1.0 + 0.5 * a + 0.1 * b]
        });
        let result = analyze(&ds, &config(&["y1", "y2"])).unwrap();

        for term in ["a", "b"] {
            let row = result.full_effects.row(term).unwrap();
            assert_eq!(row.max_logworth, MAX_LOGWORTH);
            assert_eq!(row.appears_significant, 2);
        }
        for term in ["I(a**2)", "I(b**2)", "a:b"] {
            assert_eq!(result.full_effects.row(term).unwrap().max_logworth, 0.0);
        }
        let reduced: Vec<String> = result.reduced_terms.iter().map(|t| t.name()).collect();
        assert_eq!(reduced, vec!["a", "b"]);
    }

    #[test]
    fn test_analyze_recovers_quadratic_surface() {
        let ds = factorial(3, &["y"], |a, b, rep| {
            vec![10.0 + 2.0 * a + 0.05 * b - 0.8 * a * a + NOISE[rep] * (1.0 + b / 30.0)]
        });
        let result = analyze(&ds, &config(&["y"])).unwrap();
        let names: Vec<String> = result.reduced_terms.iter().map(|t| t.name()).collect();
        assert!(names.contains(&"I(a**2)".to_string()));
        assert!(names.contains(&"a".to_string()));

        let fit = result.response("y").unwrap();
        assert!(fit.diagnostics.r2_approximate > 0.99);
        assert_eq!(fit.coded.len(), names.len() + 1);
        assert_eq!(fit.decoded[0].factor, "Intercept");

        // Natural polynomial reproduces coded predictions at every run
        let scaler = Standardizer::fit(&config(&["y"]).predictors, ds.predictors()).unwrap();
        let z = scaler.transform(ds.predictors()).unwrap();
        for (i, row) in ds.predictors().outer_iter().enumerate() {
            let raw = |p: &str| match p {
                "a" => Some(row[0]),
                "b" => Some(row[1]),
                _ => None,
            };
            let coded = |p: &str| match p {
                "a" => Some(z[[i, 0]]),
                "b" => Some(z[[i, 1]]),
                _ => None,
            };
            let expected = fit.fit.predict_fixed(coded).unwrap();
            assert_relative_eq!(fit.natural.predict(raw).unwrap(), expected, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_analyze_lack_of_fit_partition() {
        let ds = factorial(3, &["y"], |a, b, rep| vec![a + 0.1 * b + 0.3 * (a * b).sin() + NOISE[rep]]);
        let result = analyze(&ds, &config(&["y"])).unwrap();
        let fit = result.response("y").unwrap();

        let lof = fit.lack_of_fit.as_ref().unwrap();
        let rss: f64 = fit.residuals.iter().map(|r| r.residual.powi(2)).sum();
        assert_relative_eq!(lof.ss_total_error(), rss, max_relative = 1e-8);
        assert_eq!(lof.df_pure_error, 27 - 9);
        assert_eq!(lof.df_lack_of_fit, 9 - fit.fit.n_fixed_terms() - 1);
        assert!(result.failures_for("y").all(|f| f.stage != Stage::LackOfFit));
    }

    #[test]
    fn test_analyze_two_level_factorial_keeps_main_effects() {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for a in [10.0, 20.0] {
            for b in [1.0, 3.0] {
                for rep in 0..3 {
                    x.extend([a, b]);
                    y.push(1.0 + 0.2 * a + 0.5 * b + NOISE[rep]);
                }
            }
        }
        let ds = Dataset::from_arrays(
            vec!["a".into(), "b".into()],
            Array2::from_shape_vec((12, 2), x).unwrap(),
            vec!["y".into()],
            Array2::from_shape_vec((12, 1), y).unwrap(),
        )
        .unwrap();
        let result = analyze(&ds, &config(&["y"])).unwrap();

        assert!(result.failures.iter().all(|f| f.stage != Stage::Screening));
        for term in ["I(a**2)", "I(b**2)"] {
            assert_eq!(result.full_effects.row(term).unwrap().max_logworth, 0.0);
        }
        let reduced: Vec<String> = result.reduced_terms.iter().map(|t| t.name()).collect();
        assert!(reduced.contains(&"a".to_string()));
        assert!(reduced.contains(&"b".to_string()));
        assert!(result.response("y").is_some());
    }

    #[test]
    fn test_reduced_design_unknown_term_is_an_error() {
        let z = ndarray::array![[-1.0, 1.0], [0.0, -1.0], [1.0, 0.0]];
        let mut failures = Vec::new();
        let err = reduced_design(&z, &["a".into(), "b".into()], &[Term::Linear("c".into())], &mut failures).unwrap_err();
        assert_eq!(err, Error::UnknownTerm("c".into()));
        assert!(failures.is_empty());
    }

    #[test]
    fn test_reduced_design_reports_condition_number() {
        let z = ndarray::array![[-1.0, 1.0], [0.0, -1.0], [1.0, 0.0], [1.0, 1.0]];
        let mut failures = Vec::new();
        let (design, kappa) =
            reduced_design(&z, &["a".into(), "b".into()], &[Term::Linear("a".into())], &mut failures).unwrap();
        assert_eq!(design.ncols(), 2);
        assert!(kappa.unwrap() >= 1.0);
        assert!(failures.is_empty());
    }

    #[test]
    fn test_constant_predictor_is_fatal() {
        let ds = Dataset::from_arrays(
            vec!["a".into(), "b".into()],
            ndarray::array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0]],
            vec!["y".into()],
            ndarray::array![[1.0], [2.0], [3.0]],
        )
        .unwrap();
        let err = analyze(&ds, &config(&["y"])).unwrap_err();
        assert!(matches!(err, Error::ZeroVariance { ref predictor, .. } if predictor == "b"));
    }

    #[test]
    fn test_mismatched_config_is_rejected() {
        let ds = factorial(2, &["y"], |a, _, _| vec![a]);
        let err = analyze(&ds, &config(&["z"])).unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_coded_coefficients_have_wald_statistics() {
        let ds = factorial(2, &["y"], |a, b, rep| vec![a - 0.05 * b + [0.1, -0.1][rep] * a]);
        let result = analyze(&ds, &config(&["y"])).unwrap();
        let fit = result.response("y").unwrap();
        for (row, se) in fit.coded.iter().zip(&fit.fit.std_errors) {
            assert_eq!(row.std_error, *se);
            if let (Some(z), Some(p)) = (row.z, row.p_value) {
                assert_relative_eq!(z, row.estimate / row.std_error);
                assert!((0.0..=1.0).contains(&p));
                assert_relative_eq!(row.logworth, logworth(p));
            }
        }
    }
}
