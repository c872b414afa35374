//! Design matrix construction.
//!
//! Column 0 is the intercept (all ones); the remaining columns are the
//! requested terms evaluated on standardized predictors, in term order.

use nalgebra::DMatrix;
use ndarray::Array2;

use crate::error::{Error, Result};
use crate::terms::Term;

/// Intercept column name.
pub const INTERCEPT: &str = "Intercept";

/// A model matrix with named columns.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    terms: Vec<Term>,
    x: DMatrix<f64>,
}

impl DesignMatrix {
    /// Evaluate `terms` on every row of the standardized predictor block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTerm`] if a term refers to a predictor not in
    /// `predictor_names`, and [`Error::EmptyDataset`] for a block with no rows.
    pub fn build(standardized: &Array2<f64>, predictor_names: &[String], terms: &[Term]) -> Result<Self> {
        let n = standardized.nrows();
        if n == 0 {
            return Err(Error::EmptyDataset);
        }

        let mut x = DMatrix::<f64>::zeros(n, terms.len() + 1);
        for (i, row) in standardized.outer_iter().enumerate() {
            let lookup = |p: &str| {
                predictor_names
                    .iter()
                    .position(|q| q == p)
                    .map(|j| row[j])
            };
            x[(i, 0)] = 1.0;
            for (j, term) in terms.iter().enumerate() {
                x[(i, j + 1)] = term.evaluate(lookup)?;
            }
        }

        Ok(Self {
            terms: terms.to_vec(),
            x,
        })
    }

    /// Number of observations.
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    /// Number of columns, intercept included.
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    /// Terms behind columns `1..`.
    #[must_use]
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Column names, `Intercept` first.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        std::iter::once(INTERCEPT.to_string())
            .chain(self.terms.iter().map(Term::name))
            .collect()
    }

    /// The numeric matrix.
    #[must_use]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.x
    }

    /// Gram matrix `X'X`.
    #[must_use]
    pub fn gram(&self) -> DMatrix<f64> {
        self.x.tr_mul(&self.x)
    }

    /// The sub-design made of the listed columns, in ascending order.
    ///
    /// `columns` must start with the intercept column `0`.
    pub(crate) fn select(&self, columns: &[usize]) -> Self {
        Self {
            terms: columns
                .iter()
                .filter(|&&j| j > 0)
                .map(|&j| self.terms[j - 1].clone())
                .collect(),
            x: self.x.select_columns(columns),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_select_keeps_intercept_and_term_names() {
        let z = array![[-1.0, 2.0], [0.5, -1.0], [1.0, 0.0]];
        let names = vec!["a".to_string(), "b".to_string()];
        let terms = vec![
            Term::Linear("a".into()),
            Term::Linear("b".into()),
            Term::Quadratic("a".into()),
        ];
        let design = DesignMatrix::build(&z, &names, &terms).unwrap();
        let sub = design.select(&[0, 2]);

        assert_eq!(sub.column_names(), vec!["Intercept", "b"]);
        assert_eq!(sub.matrix()[(0, 1)], 2.0);
        assert_eq!(sub.matrix()[(2, 0)], 1.0);
    }

    #[test]
    fn test_build_columns() {
        let z = array![[-1.0, 2.0], [0.5, -1.0]];
        let names = vec!["a".to_string(), "b".to_string()];
        let terms = vec![
            Term::Linear("b".into()),
            Term::Quadratic("a".into()),
            Term::Interaction("a".into(), "b".into()),
        ];
        let design = DesignMatrix::build(&z, &names, &terms).unwrap();

        assert_eq!(design.ncols(), 4);
        assert_eq!(design.column_names(), vec!["Intercept", "b", "I(a**2)", "a:b"]);
        let x = design.matrix();
        assert_eq!(x[(0, 0)], 1.0);
        assert_eq!(x[(0, 1)], 2.0);
        assert_eq!(x[(0, 2)], 1.0);
        assert_eq!(x[(0, 3)], -2.0);
        assert_eq!(x[(1, 3)], -0.5);
    }

    #[test]
    fn test_build_unknown_predictor() {
        let z = array![[1.0], [2.0]];
        let err = DesignMatrix::build(&z, &["a".into()], &[Term::Linear("c".into())]).unwrap_err();
        assert_eq!(err, Error::UnknownTerm("c".into()));
    }

    #[test]
    fn test_gram_is_symmetric() {
        let z = array![[1.0, 0.0], [0.0, 1.0], [-1.0, -1.0]];
        let names = vec!["a".to_string(), "b".to_string()];
        let terms = vec![Term::Linear("a".into()), Term::Linear("b".into())];
        let g = DesignMatrix::build(&z, &names, &terms).unwrap().gram();
        assert_eq!(g[(0, 0)], 3.0);
        assert_eq!(g, g.transpose());
    }
}
