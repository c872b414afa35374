//! Error types for the mixed-doe library.
//!
//! This module provides error handling using the `thiserror` crate, with
//! variants grouped the way failures propagate through an analysis run:
//! input errors abort the run, modeling errors abort one response, and
//! degenerate Lack-of-Fit conditions only suppress that response's F-test.

use std::fmt;

use thiserror::Error;

/// The main error type for the mixed-doe library.
#[derive(Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    // ============ Input Errors ============
    /// The dataset has no observations.
    #[error("dataset is empty")]
    EmptyDataset,

    /// A required column is absent from the input table.
    #[error("required column '{0}' is missing from the input table")]
    MissingColumn(String),

    /// A cell in a required column could not be used.
    #[error("invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        /// Column name.
        column: String,
        /// 1-based data row (header excluded).
        row: usize,
        /// The offending cell text.
        value: String,
    },

    /// A predictor is constant, so it cannot be standardized.
    #[error("predictor '{predictor}' has zero variance (constant value {value})")]
    ZeroVariance {
        /// The constant predictor.
        predictor: String,
        /// The constant value it takes.
        value: f64,
    },

    /// The analysis configuration is inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of what is invalid.
        message: String,
    },

    /// Reading or writing a file failed.
    #[error("i/o error on '{path}': {message}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// Underlying error message.
        message: String,
    },

    // ============ Term Errors ============
    /// A term name refers to a predictor that does not exist, or cannot be parsed.
    #[error("cannot resolve model term '{0}'")]
    UnknownTerm(String),

    // ============ Modeling Errors ============
    /// The design matrix is rank deficient.
    #[error("design matrix is singular (rank {rank} of {columns} columns)")]
    SingularDesign {
        /// Numerical rank found.
        rank: usize,
        /// Number of design columns.
        columns: usize,
    },

    /// There are no residual degrees of freedom left.
    #[error("model is saturated: {observations} observations for {parameters} parameters")]
    Saturated {
        /// Number of observations.
        observations: usize,
        /// Number of fixed-effect parameters.
        parameters: usize,
    },

    /// The REML search did not reach a finite optimum.
    #[error("REML optimisation failed to converge after {iterations} iterations")]
    ConvergenceFailure {
        /// Iterations performed.
        iterations: usize,
    },

    /// A numerical routine produced a non-finite or undefined value.
    #[error("numerical failure: {message}")]
    Numerical {
        /// Description of the failure.
        message: String,
    },

    // ============ Lack-of-Fit Errors ============
    /// The Lack-of-Fit test is undefined for this response.
    #[error("lack-of-fit test is degenerate: {reason}")]
    DegenerateLackOfFit {
        /// Which degeneracy occurred.
        reason: LackOfFitDegeneracy,
    },
}

/// Reasons a Lack-of-Fit F-test cannot be formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LackOfFitDegeneracy {
    /// Too few distinct configurations for the model's fixed effects.
    NoLackOfFitDegreesOfFreedom {
        /// `#groups - k - 1`, which is not positive.
        df: i64,
    },
    /// Every configuration was run exactly once.
    NoReplicates,
    /// Replicates agree exactly, so pure error is zero.
    ZeroPureError,
}

impl fmt::Display for LackOfFitDegeneracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLackOfFitDegreesOfFreedom { df } => {
                write!(f, "lack-of-fit degrees of freedom is {df}")
            }
            Self::NoReplicates => write!(f, "no replicated configurations (pure error df is 0)"),
            Self::ZeroPureError => write!(f, "pure error sum of squares is zero"),
        }
    }
}

/// A specialized `Result` type for mixed-doe operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Create a new `InvalidConfig` error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new `Numerical` error.
    #[must_use]
    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical {
            message: message.into(),
        }
    }

    /// Create a new `Io` error for `path`.
    #[must_use]
    pub fn io(path: impl AsRef<std::path::Path>, err: impl fmt::Display) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Whether this error aborts the whole analysis rather than one response.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyDataset
                | Self::MissingColumn(_)
                | Self::InvalidValue { .. }
                | Self::ZeroVariance { .. }
                | Self::InvalidConfig { .. }
                | Self::Io { .. }
        )
    }
}
