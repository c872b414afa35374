//! Decoding of standardized-space coefficients into natural units.
//!
//! Two views are produced for every fitted response:
//!
//! - the **decoded table** ([`decode_coefficients`]): each term's coefficient
//!   divided by its scale factor, with the intercept computed as
//!   `mean(y) − Σ β_lin · mean(x)` over linear terms only;
//! - the **natural polynomial** ([`NaturalPolynomial`]): the fixed-effect
//!   polynomial fully re-expanded in raw units, with every centering
//!   product folded into the lower-order coefficients.
//!
//! For a model with only linear terms whose fixed intercept equals the
//! response mean the two coincide. With quadratic or interaction terms the
//! table keeps the per-term rescaling and only the polynomial reproduces
//! standardized-space predictions exactly.

use std::collections::BTreeMap;

use super::design::INTERCEPT;
use super::mixed::MixedFit;
use crate::data::{ScaleParams, Standardizer};
use crate::error::{Error, Result};
use crate::terms::Term;

/// A natural-unit coefficient for one response.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodedCoefficient {
    /// Response name.
    pub response: String,
    /// `Intercept` or term name.
    pub factor: String,
    /// Natural-unit estimate.
    pub estimate: f64,
}

fn scale<'a>(scaler: &'a Standardizer, term: &Term, predictor: &str) -> Result<&'a ScaleParams> {
    scaler
        .get(predictor)
        .ok_or_else(|| Error::UnknownTerm(term.name()))
}

/// Per-term rescaling of the fixed effects, intercept first.
///
/// # Errors
///
/// Returns [`Error::UnknownTerm`] if a term refers to a predictor the
/// standardizer was not fitted on.
pub fn decode_coefficients(fit: &MixedFit, scaler: &Standardizer, response_mean: f64) -> Result<Vec<DecodedCoefficient>> {
    let mut terms = Vec::with_capacity(fit.terms.len());
    let mut intercept = response_mean;

    for (term, &coded) in fit.terms.iter().zip(&fit.coefficients[1..]) {
        let natural = match term {
            Term::Linear(p) => coded / scale(scaler, term, p)?.std,
            Term::Quadratic(p) => coded / scale(scaler, term, p)?.std.powi(2),
            Term::Interaction(a, b) => coded / (scale(scaler, term, a)?.std * scale(scaler, term, b)?.std),
        };
        // Only main effects shift the intercept
        if term.is_linear() {
            for p in term.predictors() {
                intercept -= natural * scale(scaler, term, p)?.mean;
            }
        }
        terms.push(DecodedCoefficient {
            response: fit.response.clone(),
            factor: term.name(),
            estimate: natural,
        });
    }

    let mut decoded = Vec::with_capacity(terms.len() + 1);
    decoded.push(DecodedCoefficient {
        response: fit.response.clone(),
        factor: INTERCEPT.to_string(),
        estimate: intercept,
    });
    decoded.extend(terms);
    Ok(decoded)
}

/// The fixed-effect polynomial expressed exactly in raw predictor units.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NaturalPolynomial {
    /// Constant term.
    pub intercept: f64,
    /// `(term, coefficient)` pairs, sorted by term name.
    pub terms: Vec<(Term, f64)>,
}

impl NaturalPolynomial {
    /// Expand the coded fixed effects of `fit` into raw units.
    ///
    /// With `z = (x − m)/s`:
    /// `b·z = (b/s)x − bm/s`,
    /// `q·z² = (q/s²)x² − (2qm/s²)x + qm²/s²`, and
    /// `w·z_a z_b = (w/(s_a s_b))(x_a x_b − m_b x_a − m_a x_b + m_a m_b)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTerm`] for a predictor the standardizer does not know.
    pub fn from_fit(fit: &MixedFit, scaler: &Standardizer) -> Result<Self> {
        let mut intercept = fit.fixed_intercept();
        let mut coefs: BTreeMap<String, (Term, f64)> = BTreeMap::new();
        let mut add = |term: Term, value: f64| {
            coefs.entry(term.name()).or_insert((term, 0.0)).1 += value;
        };

        for (term, &b) in fit.terms.iter().zip(&fit.coefficients[1..]) {
            match term {
                Term::Linear(p) => {
                    let s = scale(scaler, term, p)?;
                    add(term.clone(), b / s.std);
                    intercept -= b * s.mean / s.std;
                }
                Term::Quadratic(p) => {
                    let s = scale(scaler, term, p)?;
                    let k = b / (s.std * s.std);
                    add(term.clone(), k);
                    add(Term::Linear(p.clone()), -2.0 * k * s.mean);
                    intercept += k * s.mean * s.mean;
                }
                Term::Interaction(a, c) => {
                    let (sa, sc) = (scale(scaler, term, a)?, scale(scaler, term, c)?);
                    let k = b / (sa.std * sc.std);
                    add(term.clone(), k);
                    add(Term::Linear(a.clone()), -k * sc.mean);
                    add(Term::Linear(c.clone()), -k * sa.mean);
                    intercept += k * sa.mean * sc.mean;
                }
            }
        }

        Ok(Self {
            intercept,
            terms: coefs.into_values().collect(),
        })
    }

    /// Predict at raw predictor values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTerm`] if `raw` cannot resolve a predictor.
    pub fn predict<F>(&self, raw: F) -> Result<f64>
    where
        F: Fn(&str) -> Option<f64> + Copy,
    {
        self.terms
            .iter()
            .try_fold(self.intercept, |acc, (term, k)| Ok(acc + k * term.evaluate(raw)?))
    }

    /// Coefficient of a term by name.
    #[must_use]
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        if name == INTERCEPT {
            return Some(self.intercept);
        }
        self.terms
            .iter()
            .find(|(t, _)| t.name() == name)
            .map(|(_, k)| *k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn fit_with(terms: Vec<Term>, coefficients: Vec<f64>) -> MixedFit {
        MixedFit {
            response: "y".into(),
            std_errors: vec![0.1; coefficients.len()],
            terms,
            coefficients,
            group_var: 0.0,
            residual_var: 1.0,
            group_keys: Vec::new(),
            random_effects: Vec::new(),
            fitted: Vec::new(),
            mean_random_effect: 0.0,
            log_reml: 0.0,
            iterations: 0,
        }
    }

    fn scaler() -> Standardizer {
        let x = array![[0.5, 30.0], [1.0, 60.0], [1.5, 90.0], [1.0, 30.0]];
        Standardizer::fit(&["dye1".into(), "Time".into()], &x).unwrap()
    }

    #[test]
    fn test_decode_table_formulas() {
        let s = scaler();
        let (d, t) = (s.get("dye1").unwrap().clone(), s.get("Time").unwrap().clone());
        let fit = fit_with(
            vec![
                Term::Linear("dye1".into()),
                Term::Linear("Time".into()),
                Term::Quadratic("Time".into()),
                Term::Interaction("dye1".into(), "Time".into()),
            ],
            vec![40.0, 2.0, -3.0, 0.5, 1.5],
        );

        let decoded = decode_coefficients(&fit, &s, 42.0).unwrap();
        let names: Vec<&str> = decoded.iter().map(|c| c.factor.as_str()).collect();
        assert_eq!(names, vec!["Intercept", "dye1", "Time", "I(Time**2)", "dye1:Time"]);

        assert_relative_eq!(decoded[1].estimate, 2.0 / d.std);
        assert_relative_eq!(decoded[2].estimate, -3.0 / t.std);
        assert_relative_eq!(decoded[3].estimate, 0.5 / (t.std * t.std));
        assert_relative_eq!(decoded[4].estimate, 1.5 / (d.std * t.std));
        assert_relative_eq!(
            decoded[0].estimate,
            42.0 - decoded[1].estimate * d.mean - decoded[2].estimate * t.mean
        );
    }

    #[test]
    fn test_natural_polynomial_reproduces_coded_prediction() {
        let s = scaler();
        let fit = fit_with(
            vec![
                Term::Linear("dye1".into()),
                Term::Linear("Time".into()),
                Term::Quadratic("dye1".into()),
                Term::Interaction("dye1".into(), "Time".into()),
            ],
            vec![40.0, 2.0, -3.0, 0.5, 1.5],
        );
        let poly = NaturalPolynomial::from_fit(&fit, &s).unwrap();

        for &(dye1, time) in &[(0.5, 30.0), (1.2, 75.0), (2.0, 10.0)] {
            let raw = |p: &str| match p {
                "dye1" => Some(dye1),
                "Time" => Some(time),
                _ => None,
            };
            let coded = |p: &str| s.get(p).and_then(|sp| raw(p).map(|x| sp.code(x)));
            let expected = fit.predict_fixed(coded).unwrap();
            assert_relative_eq!(poly.predict(raw).unwrap(), expected, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_linear_only_forms_agree() {
        let s = scaler();
        let fit = fit_with(
            vec![Term::Linear("dye1".into()), Term::Linear("Time".into())],
            vec![40.0, 2.0, -3.0],
        );
        // Intercept equal to the response mean, as in a balanced OLS fit
        let decoded = decode_coefficients(&fit, &s, 40.0).unwrap();
        let poly = NaturalPolynomial::from_fit(&fit, &s).unwrap();
        for c in &decoded {
            assert_relative_eq!(poly.coefficient(&c.factor).unwrap(), c.estimate, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_unknown_predictor() {
        let fit = fit_with(vec![Term::Linear("Temp".into())], vec![1.0, 1.0]);
        let err = decode_coefficients(&fit, &scaler(), 0.0).unwrap_err();
        assert_eq!(err, Error::UnknownTerm("Temp".into()));
        assert!(NaturalPolynomial::from_fit(&fit, &scaler()).is_err());
    }
}
