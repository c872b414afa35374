//! Predictor standardization.
//!
//! Each predictor is replaced by `(x - mean) / std` with the population
//! standard deviation (divisor N). The fitted `(mean, std)` pairs are kept
//! for the lifetime of one analysis run and reused for every decoding step.

use ndarray::Array2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::utils::{mean, population_std};

/// Relative tolerance below which a predictor's spread counts as zero.
const ZERO_SPREAD_TOLERANCE: f64 = 1e-12;

/// Affine transform retained for one predictor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleParams {
    /// Predictor name.
    pub name: String,
    /// Sample mean of the raw values.
    pub mean: f64,
    /// Population standard deviation of the raw values.
    pub std: f64,
}

impl ScaleParams {
    /// Map a raw value into standardized space.
    #[must_use]
    pub fn code(&self, x: f64) -> f64 {
        (x - self.mean) / self.std
    }

    /// Map a standardized value back to raw units.
    #[must_use]
    pub fn uncode(&self, z: f64) -> f64 {
        z * self.std + self.mean
    }
}

/// Pre- and post-standardization statistics for one predictor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StandardizationRow {
    /// Predictor name.
    pub variable: String,
    /// Mean of the standardized column (zero up to rounding).
    pub mean_after: f64,
    /// Population std of the standardized column (one up to rounding).
    pub std_after: f64,
    /// Mean of the raw column.
    pub original_mean: f64,
    /// Population std of the raw column.
    pub original_std: f64,
}

/// Z-scoring transform fitted on one predictor block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Standardizer {
    params: Vec<ScaleParams>,
}

impl Standardizer {
    /// Fit means and population standard deviations column by column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroVariance`] for a constant predictor and
    /// [`Error::EmptyDataset`] when there are no rows.
    ///
    /// # Example
    ///
    /// ```
    /// use mixed_doe::data::Standardizer;
    /// use ndarray::array;
    ///
    /// let x = array![[1.0, 10.0], [3.0, 30.0]];
    /// let s = Standardizer::fit(&["a".into(), "b".into()], &x).unwrap();
    /// assert_eq!(s.params()[0].mean, 2.0);
    /// assert_eq!(s.params()[1].std, 10.0);
    /// ```
    pub fn fit(names: &[String], data: &Array2<f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(Error::EmptyDataset);
        }
        if names.len() != data.ncols() {
            return Err(Error::invalid_config(format!(
                "{} predictor names for {} columns",
                names.len(),
                data.ncols()
            )));
        }

        let params = names
            .iter()
            .zip(data.columns())
            .map(|(name, column)| {
                let values = column.to_vec();
                let m = mean(&values);
                let s = population_std(&values);
                if !(s > ZERO_SPREAD_TOLERANCE * m.abs().max(1.0)) {
                    return Err(Error::ZeroVariance {
                        predictor: name.clone(),
                        value: values[0],
                    });
                }
                debug!(stage = "standardize", predictor = %name, mean = m, std = s, "fitted scale");
                Ok(ScaleParams {
                    name: name.clone(),
                    mean: m,
                    std: s,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { params })
    }

    /// Apply the fitted transform to a block with the same column layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the column count differs from the fit.
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        if data.ncols() != self.params.len() {
            return Err(Error::invalid_config(format!(
                "expected {} predictor columns, got {}",
                self.params.len(),
                data.ncols()
            )));
        }

        let mut out = data.clone();
        for (mut column, p) in out.columns_mut().into_iter().zip(&self.params) {
            column.mapv_inplace(|x| p.code(x));
        }
        Ok(out)
    }

    /// Fitted parameters in predictor order.
    #[must_use]
    pub fn params(&self) -> &[ScaleParams] {
        &self.params
    }

    /// Parameters for a predictor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScaleParams> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Summarize a standardized block against the fitted raw statistics.
    #[must_use]
    pub fn summary(&self, standardized: &Array2<f64>) -> Vec<StandardizationRow> {
        self.params
            .iter()
            .zip(standardized.columns())
            .map(|(p, column)| {
                let values = column.to_vec();
                StandardizationRow {
                    variable: p.name.clone(),
                    mean_after: mean(&values),
                    std_after: population_std(&values),
                    original_mean: p.mean,
                    original_std: p.std,
                }
            })
            .collect()
    }
}
