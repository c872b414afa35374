//! Hierarchical term reduction.
//!
//! A term survives screening when its Max LogWorth reaches the threshold
//! **or** it is significant in at least `min_significant` responses. The
//! intercept is never selected (it is implicit in every model). The
//! selection is then closed under hierarchy and sorted by name, giving one
//! term set shared by every response.

use super::types::EffectSummary;
use crate::terms::{hierarchy_closure, Term};

/// Terms passing the screening rule, in summary order, intercept excluded.
#[must_use]
pub fn select_terms(summary: &EffectSummary, threshold: f64, min_significant: usize) -> Vec<Term> {
    summary
        .rows
        .iter()
        .filter(|row| row.max_logworth >= threshold || row.appears_significant >= min_significant)
        .filter_map(|row| row.effect.term().cloned())
        .collect()
}

/// Select terms and close the selection under hierarchy.
#[must_use]
pub fn reduce_terms(summary: &EffectSummary, threshold: f64, min_significant: usize) -> Vec<Term> {
    hierarchy_closure(&select_terms(summary, threshold, min_significant))
}
