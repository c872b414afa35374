//! Response-surface model terms.
//!
//! A [`Term`] is one column of a second-order response-surface model: a
//! linear predictor, its square, or a pairwise interaction. Terms print in
//! patsy notation (`x`, `I(x**2)`, `a:b`) so formula strings and exported
//! tables line up with external response-surface tools.
//!
//! Quadratic and interaction terms have *parents*: the linear terms of the
//! predictors they are built from. A model is hierarchical when every
//! parent of every included term is also included.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::{pair_count, pairs};

/// A symbolic response-surface model term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Term {
    /// Main effect of a predictor.
    Linear(String),
    /// Squared predictor, `I(x**2)`.
    Quadratic(String),
    /// Product of two distinct predictors, `a:b`.
    Interaction(String, String),
}

impl Term {
    /// Parse a term name in patsy notation, checking it against the known predictors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTerm`] if the name is malformed or refers to a
    /// predictor outside `predictors`.
    ///
    /// # Example
    ///
    /// ```
    /// use mixed_doe::terms::Term;
    ///
    /// let predictors = vec!["Time".to_string(), "Temp".to_string()];
    /// let term = Term::parse("I(Temp**2)", &predictors).unwrap();
    /// assert_eq!(term, Term::Quadratic("Temp".into()));
    /// assert!(Term::parse("Pressure", &predictors).is_err());
    /// ```
    pub fn parse(name: &str, predictors: &[String]) -> Result<Self> {
        let known = |p: &str| predictors.iter().any(|q| q == p);
        let unknown = || Error::UnknownTerm(name.to_string());
        let name = name.trim();

        let term = if let Some(inner) = name.strip_prefix("I(").and_then(|s| s.strip_suffix(')')) {
            let base = inner.split("**").next().ok_or_else(unknown)?.trim();
            if !inner.trim_end().ends_with("**2") {
                return Err(unknown());
            }
            Self::Quadratic(base.to_string())
        } else if let Some((a, b)) = name.split_once(':') {
            let (a, b) = (a.trim(), b.trim());
            if a == b {
                return Err(unknown());
            }
            Self::Interaction(a.to_string(), b.to_string())
        } else {
            Self::Linear(name.to_string())
        };

        if term.predictors().into_iter().all(known) {
            Ok(term)
        } else {
            Err(unknown())
        }
    }

    /// The patsy-style name of this term.
    #[must_use]
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Predictors this term is built from, in order.
    #[must_use]
    pub fn predictors(&self) -> Vec<&str> {
        match self {
            Self::Linear(p) | Self::Quadratic(p) => vec![p.as_str()],
            Self::Interaction(a, b) => vec![a.as_str(), b.as_str()],
        }
    }

    /// Linear terms that must accompany this term in a hierarchical model.
    #[must_use]
    pub fn parents(&self) -> Vec<Term> {
        match self {
            Self::Linear(_) => Vec::new(),
            Self::Quadratic(p) => vec![Self::Linear(p.clone())],
            Self::Interaction(a, b) => vec![Self::Linear(a.clone()), Self::Linear(b.clone())],
        }
    }

    /// Whether this is a main-effect term.
    #[must_use]
    pub fn is_linear(&self) -> bool {
        matches!(self, Self::Linear(_))
    }

    /// Evaluate the term for one observation.
    ///
    /// `value` maps a predictor name to its value in the current row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTerm`] if a constituent predictor cannot be resolved.
    pub fn evaluate<F>(&self, value: F) -> Result<f64>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let get = |p: &str| value(p).ok_or_else(|| Error::UnknownTerm(self.name()));
        Ok(match self {
            Self::Linear(p) => get(p)?,
            Self::Quadratic(p) => get(p)?.powi(2),
            Self::Interaction(a, b) => get(a)? * get(b)?,
        })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear(p) => write!(f, "{p}"),
            Self::Quadratic(p) => write!(f, "I({p}**2)"),
            Self::Interaction(a, b) => write!(f, "{a}:{b}"),
        }
    }
}

/// Number of terms in the full second-order model for `p` predictors: `2p + C(p, 2)`.
#[must_use]
pub fn rsm_term_count(p: usize) -> usize {
    2 * p + pair_count(p)
}

/// Expand predictor names into the full response-surface term list.
///
/// Order is fixed: all linear terms, then all quadratic terms, then the
/// pairwise interactions in lexicographic index order.
///
/// # Example
///
/// ```
/// use mixed_doe::terms::build_rsm_terms;
///
/// let predictors: Vec<String> = ["dye1", "dye2", "Time", "Temp"].map(String::from).to_vec();
/// let terms = build_rsm_terms(&predictors);
/// assert_eq!(terms.len(), 14);
/// assert_eq!(terms[4].to_string(), "I(dye1**2)");
/// assert_eq!(terms[8].to_string(), "dye1:dye2");
/// ```
#[must_use]
pub fn build_rsm_terms(predictors: &[String]) -> Vec<Term> {
    let mut terms = Vec::with_capacity(rsm_term_count(predictors.len()));
    terms.extend(predictors.iter().cloned().map(Term::Linear));
    terms.extend(predictors.iter().cloned().map(Term::Quadratic));
    terms.extend(
        pairs(predictors.len()).map(|(i, j)| Term::Interaction(predictors[i].clone(), predictors[j].clone())),
    );
    terms
}

/// Close a term selection under model hierarchy.
///
/// Adds the parent linear terms of every quadratic and interaction term,
/// removes duplicates, and sorts by term name. Applying it twice gives the
/// same result as applying it once.
#[must_use]
pub fn hierarchy_closure(terms: &[Term]) -> Vec<Term> {
    let mut closed: BTreeMap<String, Term> = BTreeMap::new();
    for term in terms {
        for parent in term.parents() {
            closed.entry(parent.name()).or_insert(parent);
        }
        closed.entry(term.name()).or_insert_with(|| term.clone());
    }
    closed.into_values().collect()
}

/// Whether every parent of every term is present in `terms`.
#[must_use]
pub fn is_hierarchical(terms: &[Term]) -> bool {
    terms
        .iter()
        .flat_map(Term::parents)
        .all(|parent| terms.contains(&parent))
}

/// Render `response ~ t1 + t2 + ...`, or `response ~ 1` for an intercept-only model.
#[must_use]
pub fn formula(response: &str, terms: &[Term]) -> String {
    if terms.is_empty() {
        return format!("{response} ~ 1");
    }
    let rhs: Vec<String> = terms.iter().map(Term::name).collect();
    format!("{response} ~ {}", rhs.join(" + "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_term_count_matches_formula() {
        for p in 1..=7 {
            let predictors: Vec<String> = (0..p).map(|i| format!("x{i}")).collect();
            let terms = build_rsm_terms(&predictors);
            assert_eq!(terms.len(), rsm_term_count(p));
            assert_eq!(terms.len(), 2 * p + p * (p - 1) / 2);
        }
    }

    #[test]
    fn test_term_order_and_names() {
        let predictors = names(&["dye1", "dye2", "Time", "Temp"]);
        let terms: Vec<String> = build_rsm_terms(&predictors).iter().map(Term::name).collect();
        assert_eq!(
            terms,
            vec![
                "dye1",
                "dye2",
                "Time",
                "Temp",
                "I(dye1**2)",
                "I(dye2**2)",
                "I(Time**2)",
                "I(Temp**2)",
                "dye1:dye2",
                "dye1:Time",
                "dye1:Temp",
                "dye2:Time",
                "dye2:Temp",
                "Time:Temp",
            ]
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let predictors = names(&["a", "b"]);
        for term in build_rsm_terms(&predictors) {
            assert_eq!(Term::parse(&term.name(), &predictors).unwrap(), term);
        }
        assert!(Term::parse("c", &predictors).is_err());
        assert!(Term::parse("a:a", &predictors).is_err());
        assert!(Term::parse("I(a**3)", &predictors).is_err());
        assert!(Term::parse("a:c", &predictors).is_err());
    }

    #[test]
    fn test_hierarchy_closure_adds_parents() {
        let selected = vec![
            Term::Interaction("dye1".into(), "Temp".into()),
            Term::Quadratic("Time".into()),
        ];
        let closed = hierarchy_closure(&selected);
        let names: Vec<String> = closed.iter().map(Term::name).collect();
        // Byte order: uppercase sorts before lowercase.
        assert_eq!(names, vec!["I(Time**2)", "Temp", "Time", "dye1", "dye1:Temp"]);
        assert!(is_hierarchical(&closed));
        assert!(!is_hierarchical(&selected));
    }

    #[test]
    fn test_hierarchy_closure_idempotent() {
        let predictors = names(&["a", "b", "c"]);
        let all = build_rsm_terms(&predictors);
        for skip in 0..all.len() {
            let subset: Vec<Term> = all.iter().skip(skip).step_by(2).cloned().collect();
            let once = hierarchy_closure(&subset);
            let twice = hierarchy_closure(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_is_linear() {
        assert!(Term::Linear("a".into()).is_linear());
        assert!(!Term::Quadratic("a".into()).is_linear());
        assert!(!Term::Interaction("a".into(), "b".into()).is_linear());
    }

    #[test]
    fn test_evaluate() {
        let lookup = |p: &str| match p {
            "a" => Some(2.0),
            "b" => Some(-3.0),
            _ => None,
        };
        assert_eq!(Term::Linear("a".into()).evaluate(lookup).unwrap(), 2.0);
        assert_eq!(Term::Quadratic("b".into()).evaluate(lookup).unwrap(), 9.0);
        assert_eq!(
            Term::Interaction("a".into(), "b".into())
                .evaluate(lookup)
                .unwrap(),
            -6.0
        );
        assert!(Term::Linear("z".into()).evaluate(lookup).is_err());
    }

    #[test]
    fn test_formula() {
        let terms = vec![Term::Linear("Time".into()), Term::Quadratic("Time".into())];
        assert_eq!(formula("Lvalue", &terms), "Lvalue ~ Time + I(Time**2)");
        assert_eq!(formula("Avalue", &[]), "Avalue ~ 1");
    }
}
