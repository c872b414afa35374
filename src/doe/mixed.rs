//! REML fitting of the random-intercept mixed model.
//!
//! Model: `y = Xβ + Zu + ε` with one random intercept per Configuration Key,
//! `u ~ N(0, τ²I)` and `ε ~ N(0, σ²I)`. The fixed effects are the intercept
//! plus the reduced terms on standardized predictors.
//!
//! The REML likelihood is profiled on the variance ratio `γ = τ²/σ²`. With
//! `H = I + γZZ'` block diagonal, every quantity has a per-group closed form
//! using `c_g = γ / (1 + n_g γ)`:
//!
//! ```text
//! X'H⁻¹X = X'X − Σ_g c_g s_g s_g'      (s_g = column sums of X over group g)
//! X'H⁻¹y = X'y − Σ_g c_g s_g t_g       (t_g = sum of y over group g)
//! r'H⁻¹r = r'r − Σ_g c_g (Σ_g r)²
//! ln|H|  = Σ_g ln(1 + n_g γ)
//! ```
//!
//! so no `n × n` matrix is ever formed. `σ²` is profiled out as
//! `r'H⁻¹r / (n − p)` and the remaining one-dimensional criterion is
//! maximized over `ln γ` by a grid scan and golden-section refinement,
//! with `γ = 0` checked as the boundary candidate.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use tracing::{debug, warn};

use super::design::{DesignMatrix, INTERCEPT};
use super::ols::numerical_rank;
use super::types::MixedModelConfig;
use crate::data::Grouping;
use crate::error::{Error, Result};
use crate::terms::Term;

const INV_GOLDEN: f64 = 0.618_033_988_749_894_9;

/// A fitted random-intercept model for one response.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MixedFit {
    /// Response name.
    pub response: String,
    /// Fixed-effect terms, in design order (intercept excluded).
    pub terms: Vec<Term>,
    /// Fixed-effect estimates, intercept first.
    pub coefficients: Vec<f64>,
    /// Standard errors of the fixed effects.
    pub std_errors: Vec<f64>,
    /// Random-intercept variance τ².
    pub group_var: f64,
    /// Residual variance σ².
    pub residual_var: f64,
    /// Configuration Keys, in group order.
    pub group_keys: Vec<String>,
    /// BLUP of each configuration's random intercept, in group order.
    pub random_effects: Vec<f64>,
    /// Conditional fitted values `Xβ + u_g(i)`.
    pub fitted: Vec<f64>,
    /// Mean over observations of the BLUP of each observation's group.
    pub mean_random_effect: f64,
    /// Restricted log-likelihood at the optimum.
    pub log_reml: f64,
    /// Golden-section refinements performed.
    pub iterations: usize,
}

impl MixedFit {
    /// The pure fixed-effects intercept `β₀`.
    #[must_use]
    pub fn fixed_intercept(&self) -> f64 {
        self.coefficients[0]
    }

    /// The intercept including the average configuration effect:
    /// `β₀ + mean_i(u_g(i))`.
    #[must_use]
    pub fn conditional_intercept(&self) -> f64 {
        self.coefficients[0] + self.mean_random_effect
    }

    /// Number of fixed-effect terms, intercept excluded.
    #[must_use]
    pub fn n_fixed_terms(&self) -> usize {
        self.terms.len()
    }

    /// Coefficient names, `Intercept` first.
    #[must_use]
    pub fn coefficient_names(&self) -> Vec<String> {
        std::iter::once(INTERCEPT.to_string())
            .chain(self.terms.iter().map(Term::name))
            .collect()
    }

    /// Estimate for a named coefficient.
    #[must_use]
    pub fn coefficient(&self, name: &str) -> Option<f64> {
        let idx = self.coefficient_names().iter().position(|n| n == name)?;
        self.coefficients.get(idx).copied()
    }

    /// Wald statistic `β_j / se_j`, if the standard error is positive.
    #[must_use]
    pub fn z_statistic(&self, index: usize) -> Option<f64> {
        let coef = self.coefficients.get(index)?;
        let se = self.std_errors.get(index)?;
        if *se > 0.0 {
            Some(coef / se)
        } else {
            None
        }
    }

    /// Intraclass correlation `τ² / (τ² + σ²)`.
    #[must_use]
    pub fn icc(&self) -> f64 {
        let total = self.group_var + self.residual_var;
        if total > 0.0 {
            self.group_var / total
        } else {
            0.0
        }
    }

    /// Fixed-effects prediction in standardized space.
    ///
    /// `coded` maps a predictor name to its standardized value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTerm`] if a term's predictor cannot be resolved.
    pub fn predict_fixed<F>(&self, coded: F) -> Result<f64>
    where
        F: Fn(&str) -> Option<f64> + Copy,
    {
        self.terms
            .iter()
            .zip(&self.coefficients[1..])
            .try_fold(self.coefficients[0], |acc, (term, b)| {
                Ok(acc + b * term.evaluate(coded)?)
            })
    }
}

/// The profiled criterion at one variance ratio.
struct Profile {
    gamma: f64,
    beta: DVector<f64>,
    gram: Cholesky<f64, Dyn>,
    sigma2: f64,
    objective: f64,
}

/// Sufficient statistics for evaluating the profiled REML criterion.
struct ProfiledReml<'a> {
    x: &'a DMatrix<f64>,
    y: DVector<f64>,
    grouping: &'a Grouping,
    xtx: DMatrix<f64>,
    xty: DVector<f64>,
    group_x: Vec<DVector<f64>>,
    group_y: Vec<f64>,
}

impl<'a> ProfiledReml<'a> {
    fn new(x: &'a DMatrix<f64>, y: DVector<f64>, grouping: &'a Grouping) -> Self {
        let p = x.ncols();
        let mut group_x = vec![DVector::zeros(p); grouping.n_groups()];
        let mut group_y = vec![0.0; grouping.n_groups()];
        for (i, &g) in grouping.membership().iter().enumerate() {
            group_x[g] += x.row(i).transpose();
            group_y[g] += y[i];
        }

        Self {
            xtx: x.tr_mul(x),
            xty: x.tr_mul(&y),
            x,
            y,
            grouping,
            group_x,
            group_y,
        }
    }

    fn df(&self) -> f64 {
        (self.x.nrows() - self.x.ncols()) as f64
    }

    fn shrinkage(&self, gamma: f64) -> impl Iterator<Item = f64> + '_ {
        self.grouping
            .counts()
            .iter()
            .map(move |&n| gamma / (1.0 + n as f64 * gamma))
    }

    fn residuals(&self, beta: &DVector<f64>) -> DVector<f64> {
        &self.y - self.x * beta
    }

    fn evaluate(&self, gamma: f64) -> Option<Profile> {
        let mut a = self.xtx.clone();
        let mut b = self.xty.clone();
        for ((c, s), t) in self.shrinkage(gamma).zip(&self.group_x).zip(&self.group_y) {
            a.ger(-c, s, s, 1.0);
            b.axpy(-c * t, s, 1.0);
        }

        let gram = a.cholesky()?;
        let beta = gram.solve(&b);

        let r = self.residuals(&beta);
        let group_r = self.grouping.group_sums(r.as_slice());
        let rhr = r.norm_squared()
            - self
                .shrinkage(gamma)
                .zip(&group_r)
                .map(|(c, s)| c * s * s)
                .sum::<f64>();
        let sigma2 = rhr.max(0.0) / self.df();

        let log_det_h: f64 = self
            .grouping
            .counts()
            .iter()
            .map(|&n| (n as f64).mul_add(gamma, 1.0).ln())
            .sum();
        let log_det_a = 2.0 * gram.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();

        let objective =
            -0.5 * (self.df() * sigma2.max(f64::MIN_POSITIVE).ln() + log_det_h + log_det_a);
        objective.is_finite().then_some(Profile {
            gamma,
            beta,
            gram,
            sigma2,
            objective,
        })
    }

    fn objective_at_log(&self, log_gamma: f64) -> f64 {
        self.evaluate(log_gamma.exp())
            .map_or(f64::NEG_INFINITY, |p| p.objective)
    }

    /// Maximize over `γ`. Returns the best profile and refinement count.
    fn maximize(&self, config: &MixedModelConfig) -> Result<(Profile, usize)> {
        let steps = config.grid_points.max(3) - 1;
        let width = (config.log_ratio_max - config.log_ratio_min) / steps as f64;
        let grid: Vec<f64> = (0..=steps)
            .map(|k| config.log_ratio_min + k as f64 * width)
            .collect();
        let values: Vec<f64> = grid.iter().map(|&phi| self.objective_at_log(phi)).collect();

        let best_k = values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(k, _)| k);

        let mut iterations = 0;
        let mut candidates = vec![0.0];
        if values[best_k].is_finite() {
            let mut lo = grid[best_k.saturating_sub(1)];
            let mut hi = grid[(best_k + 1).min(steps)];
            let mut x1 = hi - INV_GOLDEN * (hi - lo);
            let mut x2 = lo + INV_GOLDEN * (hi - lo);
            let mut f1 = self.objective_at_log(x1);
            let mut f2 = self.objective_at_log(x2);

            while hi - lo > config.tolerance {
                if iterations >= config.max_iterations {
                    return Err(Error::ConvergenceFailure { iterations });
                }
                iterations += 1;
                if f1 >= f2 {
                    hi = x2;
                    x2 = x1;
                    f2 = f1;
                    x1 = hi - INV_GOLDEN * (hi - lo);
                    f1 = self.objective_at_log(x1);
                } else {
                    lo = x1;
                    x1 = x2;
                    f1 = f2;
                    x2 = lo + INV_GOLDEN * (hi - lo);
                    f2 = self.objective_at_log(x2);
                }
            }
            let refined = if f1 >= f2 { x1 } else { x2 };
            candidates.push(grid[best_k].exp());
            candidates.push(refined.exp());
        }

        candidates
            .into_iter()
            .filter_map(|gamma| self.evaluate(gamma))
            .max_by(|a, b| a.objective.total_cmp(&b.objective))
            .map(|profile| (profile, iterations))
            .ok_or(Error::ConvergenceFailure { iterations })
    }
}

/// Fit the random-intercept model by REML.
///
/// # Errors
///
/// - [`Error::Saturated`] when there are no residual degrees of freedom
/// - [`Error::SingularDesign`] when the fixed-effects design is rank deficient
/// - [`Error::ConvergenceFailure`] when no finite optimum is found
/// - [`Error::Numerical`] when `y` does not match the design
pub fn fit_reml(
    design: &DesignMatrix,
    y: &[f64],
    grouping: &Grouping,
    response: &str,
    config: &MixedModelConfig,
) -> Result<MixedFit> {
    let x = design.matrix();
    let (n, p) = (x.nrows(), x.ncols());
    if y.len() != n || grouping.n_observations() != n {
        return Err(Error::numerical(format!(
            "{} responses and {} group labels for {} design rows",
            y.len(),
            grouping.n_observations(),
            n
        )));
    }
    if n <= p {
        return Err(Error::Saturated {
            observations: n,
            parameters: p,
        });
    }
    let rank = numerical_rank(&x.singular_values());
    if rank < p {
        return Err(Error::SingularDesign { rank, columns: p });
    }
    if grouping.n_groups() == n {
        warn!(
            stage = "mixed_fit",
            response, "every configuration is unique; variance components are not separable"
        );
    }

    let reml = ProfiledReml::new(x, DVector::from_column_slice(y), grouping);
    let (profile, iterations) = reml.maximize(config)?;
    let Profile {
        gamma,
        beta,
        gram,
        sigma2,
        objective,
    } = profile;

    let df = reml.df();
    let covariance = gram.inverse() * sigma2;
    let std_errors: Vec<f64> = covariance.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect();

    let residuals = reml.residuals(&beta);
    let random_effects: Vec<f64> = reml
        .shrinkage(gamma)
        .zip(grouping.group_sums(residuals.as_slice()))
        .map(|(c, s)| c * s)
        .collect();
    let fixed = x * &beta;
    let fitted: Vec<f64> = fixed
        .iter()
        .zip(grouping.membership())
        .map(|(f, &g)| f + random_effects[g])
        .collect();
    let mean_random_effect = grouping
        .membership()
        .iter()
        .map(|&g| random_effects[g])
        .sum::<f64>()
        / n as f64;

    let log_reml = objective - 0.5 * df * (1.0 + (2.0 * std::f64::consts::PI).ln());
    let group_var = gamma * sigma2;

    if gamma == 0.0 || gamma.ln() <= config.log_ratio_min {
        warn!(stage = "mixed_fit", response, "group variance estimate is on the zero boundary");
    } else if gamma.ln() >= config.log_ratio_max {
        warn!(stage = "mixed_fit", response, gamma, "variance ratio reached the upper search bound");
    }
    debug!(
        stage = "mixed_fit",
        response,
        group_var,
        residual_var = sigma2,
        log_reml,
        iterations,
        "REML fit complete"
    );

    if beta.iter().chain(&std_errors).chain(&fitted).any(|v| !v.is_finite()) {
        return Err(Error::numerical("mixed-model estimates are not finite"));
    }

    Ok(MixedFit {
        response: response.to_string(),
        terms: design.terms().to_vec(),
        coefficients: beta.iter().copied().collect(),
        std_errors,
        group_var,
        residual_var: sigma2,
        group_keys: grouping.keys().to_vec(),
        random_effects,
        fitted,
        mean_random_effect,
        log_reml,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn intercept_only(n: usize) -> DesignMatrix {
        let z = Array2::zeros((n, 1));
        DesignMatrix::build(&z, &["x".into()], &[]).unwrap()
    }

    fn grouping(labels: &[&str]) -> Grouping {
        let keys: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        Grouping::from_keys(&keys)
    }

    const LABELS: [&str; 9] = ["A", "A", "A", "B", "B", "B", "C", "C", "C"];

    #[test]
    fn test_balanced_one_way_matches_anova_estimates() {
        // MSW = 1, MSB = 48, n = 3: sigma² = 1, tau² = (48 - 1) / 3
        let y = [1.0, 2.0, 3.0, 5.0, 6.0, 7.0, 9.0, 11.0, 10.0];
        let fit = fit_reml(
            &intercept_only(9),
            &y,
            &grouping(&LABELS),
            "y",
            &MixedModelConfig::default(),
        )
        .unwrap();

        assert_relative_eq!(fit.residual_var, 1.0, epsilon = 1e-5);
        assert_relative_eq!(fit.group_var, 47.0 / 3.0, epsilon = 1e-4);
        assert_relative_eq!(fit.fixed_intercept(), 6.0, epsilon = 1e-10);
        // Var(mean) = MSB / N
        assert_relative_eq!(fit.std_errors[0], (48.0_f64 / 9.0).sqrt(), epsilon = 1e-4);
        assert!(fit.icc() > 0.9);
    }

    #[test]
    fn test_blups_shrink_group_means() {
        let y = [1.0, 2.0, 3.0, 5.0, 6.0, 7.0, 9.0, 11.0, 10.0];
        let fit = fit_reml(
            &intercept_only(9),
            &y,
            &grouping(&LABELS),
            "y",
            &MixedModelConfig::default(),
        )
        .unwrap();

        // u_A = c * (sum of residuals in A), c = gamma / (1 + 3 gamma)
        let gamma = fit.group_var / fit.residual_var;
        let c = gamma / (1.0 + 3.0 * gamma);
        assert_relative_eq!(fit.random_effects[0], c * -12.0, epsilon = 1e-8);
        assert!(fit.random_effects[0].abs() < 4.0);
        assert_relative_eq!(fit.fitted[0], 6.0 + fit.random_effects[0], epsilon = 1e-10);
        // Balanced: BLUPs average to zero
        assert_relative_eq!(fit.conditional_intercept(), fit.fixed_intercept(), epsilon = 1e-10);
    }

    #[test]
    fn test_no_between_group_variation_gives_zero_group_var() {
        let y = [1.0, 5.0, 3.0, 2.0, 4.0, 3.0, 3.0, 3.1, 2.9];
        let fit = fit_reml(
            &intercept_only(9),
            &y,
            &grouping(&LABELS),
            "y",
            &MixedModelConfig::default(),
        )
        .unwrap();

        assert!(fit.group_var < 1e-6);
        assert_relative_eq!(fit.residual_var, 10.02 / 8.0, epsilon = 1e-6);
        assert_relative_eq!(fit.fixed_intercept(), 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_fixed_slope_recovered() {
        // Two configurations per x level, replicated; y = 2 + 3x + group shift
        let xs = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let labels = ["a", "a", "b", "b", "c", "c", "d", "d", "e", "e", "f", "f"];
        let shift = [0.3, 0.3, -0.3, -0.3, 0.2, 0.2, -0.2, -0.2, 0.1, 0.1, -0.1, -0.1];
        let noise = [0.05, -0.05, 0.04, -0.04, 0.03, -0.03, 0.02, -0.02, 0.01, -0.01, 0.06, -0.06];
        let y: Vec<f64> = (0..12)
            .map(|i| 2.0 + 3.0 * xs[i] + shift[i] + noise[i])
            .collect();

        let z = Array2::from_shape_vec((12, 1), xs.to_vec()).unwrap();
        let design = DesignMatrix::build(&z, &["x".into()], &[Term::Linear("x".into())]).unwrap();
        let fit = fit_reml(&design, &y, &grouping(&labels), "y", &MixedModelConfig::default()).unwrap();

        assert_relative_eq!(fit.coefficients[1], 3.0, epsilon = 1e-10);
        assert_relative_eq!(fit.fixed_intercept(), 2.0, epsilon = 1e-10);
        assert!(fit.group_var > fit.residual_var);
        assert_eq!(fit.coefficient_names(), vec!["Intercept", "x"]);
        assert_eq!(fit.coefficient("x"), Some(fit.coefficients[1]));
        let at_one = fit.predict_fixed(|p| (p == "x").then_some(1.0)).unwrap();
        assert_relative_eq!(at_one, 5.0, epsilon = 1e-10);
    }

    #[test]
    fn test_saturated_model() {
        let err = fit_reml(
            &intercept_only(1),
            &[1.0],
            &grouping(&["A"]),
            "y",
            &MixedModelConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::Saturated {
                observations: 1,
                parameters: 1
            }
        );
    }
}
