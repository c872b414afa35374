//! Collinearity check on the reduced design.

use super::design::DesignMatrix;
use super::ols::numerical_rank;
use crate::error::{Error, Result};

/// Condition number of `X'X`: ratio of its largest to smallest singular value.
///
/// # Errors
///
/// Returns [`Error::SingularDesign`] when the smallest singular value is zero
/// or the ratio is not finite.
pub fn condition_number(design: &DesignMatrix) -> Result<f64> {
    let singular_values = design.gram().singular_values();
    let s_max = singular_values.iter().copied().fold(0.0_f64, f64::max);
    let s_min = singular_values.iter().copied().fold(f64::INFINITY, f64::min);

    let kappa = s_max / s_min;
    if !(s_min > 0.0) || !kappa.is_finite() {
        return Err(Error::SingularDesign {
            rank: numerical_rank(&singular_values),
            columns: design.ncols(),
        });
    }
    Ok(kappa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::Term;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_orthogonal_design_is_well_conditioned() {
        let z = array![[-1.0, -1.0], [-1.0, 1.0], [1.0, -1.0], [1.0, 1.0]];
        let terms = vec![Term::Linear("a".into()), Term::Linear("b".into())];
        let design = DesignMatrix::build(&z, &["a".into(), "b".into()], &terms).unwrap();
        assert_relative_eq!(condition_number(&design).unwrap(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_near_collinear_design_is_ill_conditioned() {
        let z = array![[-1.0, -1.001], [0.0, 0.0], [1.0, 1.0], [2.0, 2.002]];
        let terms = vec![Term::Linear("a".into()), Term::Linear("b".into())];
        let design = DesignMatrix::build(&z, &["a".into(), "b".into()], &terms).unwrap();
        assert!(condition_number(&design).unwrap() > 1e5);
    }

    #[test]
    fn test_duplicate_column_reports_failure() {
        let z = array![[-1.0], [0.0], [1.0]];
        let terms = vec![Term::Linear("a".into()), Term::Linear("a".into())];
        let design = DesignMatrix::build(&z, &["a".into()], &terms).unwrap();
        match condition_number(&design) {
            Err(Error::SingularDesign { columns, .. }) => assert_eq!(columns, 3),
            Ok(kappa) => assert!(kappa > 1e15, "kappa = {kappa}"),
            Err(other) => panic!("unexpected error {other}"),
        }
    }
}
