//! Ordinary least squares via the singular value decomposition.

use nalgebra::{DMatrix, DVector};

use super::design::DesignMatrix;
use crate::error::{Error, Result};

/// Ratio `s_min / s_max` below which the design counts as rank deficient.
pub(crate) const RANK_TOLERANCE: f64 = 1e-10;

/// Least-squares fit of one response on a design matrix.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Coefficients, intercept first.
    pub coefficients: DVector<f64>,
    /// `(X'X)^-1`.
    pub xtx_inverse: DMatrix<f64>,
    /// Fitted values.
    pub fitted: DVector<f64>,
    /// Residual sum of squares.
    pub rss: f64,
    /// Residual degrees of freedom `n - p`.
    pub df_resid: usize,
}

impl OlsFit {
    /// Residual mean square.
    #[must_use]
    pub fn mse(&self) -> f64 {
        self.rss / self.df_resid as f64
    }
}

/// Numerical rank from singular values, using [`RANK_TOLERANCE`] relative to the largest.
pub(crate) fn numerical_rank(singular_values: &DVector<f64>) -> usize {
    let s_max = singular_values.iter().copied().fold(0.0_f64, f64::max);
    if !(s_max > 0.0) {
        return 0;
    }
    singular_values
        .iter()
        .filter(|&&s| s > RANK_TOLERANCE * s_max)
        .count()
}

/// Share of a column's norm that must survive projection onto the earlier
/// columns for it to count as estimable.
pub(crate) const ALIAS_TOLERANCE: f64 = 1e-8;

/// Indices of the columns of `x` that are not linear combinations of the
/// columns before them, in ascending order.
///
/// Columns are visited left to right and orthogonalised against the kept
/// ones (modified Gram-Schmidt). With a two-level factor the coded square
/// equals the intercept column, so the quadratic term is dropped here.
pub(crate) fn estimable_columns(x: &DMatrix<f64>) -> Vec<usize> {
    let mut basis: Vec<DVector<f64>> = Vec::new();
    let mut kept = Vec::new();
    for (j, column) in x.column_iter().enumerate() {
        let norm = column.norm();
        if !(norm > 0.0) {
            continue;
        }
        let mut r = column.clone_owned();
        for q in &basis {
            let projection = q.dot(&r);
            r.axpy(-projection, q, 1.0);
        }
        let remaining = r.norm();
        if remaining > ALIAS_TOLERANCE * norm {
            basis.push(r / remaining);
            kept.push(j);
        }
    }
    kept
}

/// Fit `y = X b + e` by least squares.
///
/// # Errors
///
/// - [`Error::Saturated`] when there are no residual degrees of freedom
/// - [`Error::SingularDesign`] when `X` is rank deficient
/// - [`Error::Numerical`] when `y` has the wrong length or the SVD fails
pub fn fit_ols(design: &DesignMatrix, y: &[f64]) -> Result<OlsFit> {
    let (n, p) = (design.nrows(), design.ncols());
    if y.len() != n {
        return Err(Error::numerical(format!(
            "response has {} values for {} design rows",
            y.len(),
            n
        )));
    }
    if n <= p {
        return Err(Error::Saturated {
            observations: n,
            parameters: p,
        });
    }

    let x = design.matrix();
    let svd = x.clone().svd(true, true);
    let rank = numerical_rank(&svd.singular_values);
    if rank < p {
        return Err(Error::SingularDesign { rank, columns: p });
    }
    let (u, v_t) = match (&svd.u, &svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(Error::numerical("SVD did not return singular vectors")),
    };

    let y = DVector::from_column_slice(y);
    let inv_s = svd.singular_values.map(|s| 1.0 / s);

    // b = V S^-1 U' y
    let uty = u.tr_mul(&y);
    let scaled = uty.component_mul(&inv_s);
    let coefficients = v_t.tr_mul(&scaled);

    // (X'X)^-1 = V S^-2 V'
    let mut v_scaled = v_t.transpose();
    for (j, mut col) in v_scaled.column_iter_mut().enumerate() {
        col *= inv_s[j];
    }
    let xtx_inverse = &v_scaled * v_scaled.transpose();

    let fitted = x * &coefficients;
    let rss = (&y - &fitted).norm_squared();
    if !rss.is_finite() || coefficients.iter().any(|b| !b.is_finite()) {
        return Err(Error::numerical("least-squares solution is not finite"));
    }

    Ok(OlsFit {
        coefficients,
        xtx_inverse,
        fitted,
        rss,
        df_resid: n - p,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::Term;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn line_design(xs: &[f64]) -> DesignMatrix {
        let z = ndarray::Array2::from_shape_vec((xs.len(), 1), xs.to_vec()).unwrap();
        DesignMatrix::build(&z, &["x".into()], &[Term::Linear("x".into())]).unwrap()
    }

    #[test]
    fn test_ols_simple_line() {
        let design = line_design(&[-1.0, 0.0, 1.0, 2.0]);
        let y = [1.0, 3.0, 5.0, 7.5];
        let fit = fit_ols(&design, &y).unwrap();

        // Closed form: slope = Sxy / Sxx
        let slope = (-1.5 * -3.125 + -0.5 * -1.125 + 0.5 * 0.875 + 1.5 * 3.375) / 5.0;
        assert_relative_eq!(fit.coefficients[1], slope, epsilon = 1e-12);
        assert_relative_eq!(fit.coefficients[0], 4.125 - slope * 0.5, epsilon = 1e-12);
        assert_eq!(fit.df_resid, 2);
        assert_relative_eq!(fit.xtx_inverse[(1, 1)], 1.0 / 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ols_exact_fit_has_zero_rss() {
        let design = line_design(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let y = [2.0, 5.0, 8.0, 11.0, 14.0];
        let fit = fit_ols(&design, &y).unwrap();
        assert!(fit.rss < 1e-20);
        assert_relative_eq!(fit.coefficients[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ols_singular_design() {
        let z = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let terms = vec![Term::Linear("a".into()), Term::Linear("b".into())];
        let design = DesignMatrix::build(&z, &["a".into(), "b".into()], &terms).unwrap();
        let err = fit_ols(&design, &[1.0, 2.0, 3.0, 4.0]).unwrap_err();
        assert_eq!(err, Error::SingularDesign { rank: 2, columns: 3 });
    }

    #[test]
    fn test_estimable_columns_two_level_quadratic() {
        // Coded 2x2 factorial: a², b² both equal the intercept column
        let z = array![[-1.0, -1.0], [-1.0, 1.0], [1.0, -1.0], [1.0, 1.0]];
        let names = vec!["a".to_string(), "b".to_string()];
        let design = DesignMatrix::build(&z, &names, &crate::terms::build_rsm_terms(&names)).unwrap();
        assert_eq!(design.column_names()[5], "a:b");
        assert_eq!(estimable_columns(design.matrix()), vec![0, 1, 2, 5]);
    }

    #[test]
    fn test_estimable_columns_full_rank() {
        let design = line_design(&[-1.0, 0.0, 1.0, 2.0]);
        assert_eq!(estimable_columns(design.matrix()), vec![0, 1]);
    }

    #[test]
    fn test_ols_saturated() {
        let design = line_design(&[0.0, 1.0]);
        let err = fit_ols(&design, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::Saturated { observations: 2, parameters: 2 }));
    }
}
