//! Effect screening across responses.
//!
//! Each response gets its own OLS fit and Type-III ANOVA on a shared design.
//! The per-response LogWorth columns are outer-joined on effect name (absent
//! entries become 0) and summarized with Median, Max and the number of
//! responses in which the effect appears significant.

use ndarray::Array2;
use tracing::{debug, warn};

use super::anova::calculate_anova;
use super::design::DesignMatrix;
use super::stats::logworth;
use super::types::{ANOVAResult, Effect, EffectRow, EffectSummary, Stage, StageFailure};
use crate::data::Dataset;
use crate::error::Result;
use crate::terms::Term;
use crate::utils::median;

/// LogWorth column for one response: `(effect, LogWorth)` in ANOVA order.
pub type LogWorthColumn = Vec<(Effect, f64)>;

/// Convert an ANOVA table into a LogWorth column.
#[must_use]
pub fn logworth_column(anova: &ANOVAResult) -> LogWorthColumn {
    anova
        .entries
        .iter()
        .map(|e| (e.effect.clone(), logworth(e.p_value)))
        .collect()
}

/// Merge per-response LogWorth columns into a summary.
///
/// `columns[i]` is `None` for a response whose fit failed; it contributes a
/// column of zeros. Rows are sorted by descending Max LogWorth, ties kept in
/// first-seen order.
#[must_use]
pub fn summarize(responses: &[String], columns: &[Option<LogWorthColumn>], significance: f64) -> EffectSummary {
    let mut effects: Vec<Effect> = Vec::new();
    for column in columns.iter().flatten() {
        for (effect, _) in column {
            if !effects.contains(effect) {
                effects.push(effect.clone());
            }
        }
    }

    let mut rows: Vec<EffectRow> = effects
        .into_iter()
        .map(|effect| {
            let logworth: Vec<f64> = columns
                .iter()
                .map(|column| {
                    column
                        .as_ref()
                        .and_then(|c| c.iter().find(|(e, _)| *e == effect))
                        .map_or(0.0, |(_, lw)| *lw)
                })
                .collect();
            EffectRow {
                median_logworth: median(&logworth),
                max_logworth: logworth.iter().copied().fold(0.0, f64::max),
                appears_significant: logworth.iter().filter(|&&lw| lw > significance).count(),
                logworth,
                effect,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.max_logworth.total_cmp(&a.max_logworth));

    EffectSummary {
        responses: responses.to_vec(),
        rows,
    }
}

/// Screen every response of `dataset` against `terms`.
///
/// A response whose fit fails is recorded in the returned failures and
/// contributes zeros; the other responses are unaffected. If the design
/// itself cannot be built, every response fails.
#[must_use]
pub fn screen_effects(
    dataset: &Dataset,
    standardized: &Array2<f64>,
    terms: &[Term],
    significance: f64,
    stage: Stage,
) -> (EffectSummary, Vec<StageFailure>) {
    let responses = dataset.response_names();
    let mut failures = Vec::new();

    let columns: Vec<Option<LogWorthColumn>> = match DesignMatrix::build(standardized, dataset.predictor_names(), terms) {
        Ok(design) => responses
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let y = dataset.response(i).to_vec();
                match screen_response(&design, &y) {
                    Ok(column) => {
                        debug!(stage = %stage, response = %name, effects = column.len(), "screened");
                        Some(column)
                    }
                    Err(error) => {
                        warn!(stage = %stage, response = %name, %error, "screening fit failed");
                        failures.push(StageFailure {
                            stage,
                            response: Some(name.clone()),
                            error,
                        });
                        None
                    }
                }
            })
            .collect(),
        Err(error) => {
            warn!(stage = %stage, %error, "design matrix could not be built");
            failures.extend(responses.iter().map(|name| StageFailure {
                stage,
                response: Some(name.clone()),
                error: error.clone(),
            }));
            vec![None; responses.len()]
        }
    };

    (summarize(responses, &columns, significance), failures)
}

fn screen_response(design: &DesignMatrix, y: &[f64]) -> Result<LogWorthColumn> {
    calculate_anova(design, y).map(|anova| logworth_column(&anova))
}
