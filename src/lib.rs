//! # Mixed DOE
//!
//! Response-surface screening and REML mixed-model analysis for replicated
//! industrial design-of-experiments data.
//!
//! ## Overview
//!
//! Given a table of experimental runs (continuous predictors, one or more
//! responses) this library:
//! - Standardizes the predictors to zero mean and unit population std
//! - Builds the full second-order response-surface term list
//! - Screens every term per response with Type-III ANOVA and LogWorth
//! - Reduces to one hierarchical term set shared by all responses
//! - Checks the reduced design for collinearity
//! - Fits a linear mixed model with a random intercept per distinct
//!   predictor configuration, estimated by REML
//! - Decodes the coefficients back to natural units
//! - Reports approximate R², RMSE, Lack-of-Fit and residual tables
//!
//! ## Quick Start
//!
//! ```rust
//! use mixed_doe::prelude::*;
//! use ndarray::Array2;
//!
//! // 3x3 factorial in two predictors, each run twice
//! let mut x = Vec::new();
//! let mut y = Vec::new();
//! let wobble = [0.2, -0.1, -0.2, 0.1, 0.15, -0.05];
//! for (i, (a, b)) in [(1.0, 10.0), (2.0, 10.0), (3.0, 10.0), (1.0, 20.0), (2.0, 20.0),
//!                     (3.0, 20.0), (1.0, 30.0), (2.0, 30.0), (3.0, 30.0)].into_iter().enumerate() {
//!     for rep in 0..2 {
//!         x.extend([a, b]);
//!         y.push(5.0 + 2.0 * a - 0.1 * b + wobble[(2 * i + rep) % 6]);
//!     }
//! }
//! let dataset = Dataset::from_arrays(
//!     vec!["a".into(), "b".into()],
//!     Array2::from_shape_vec((18, 2), x).unwrap(),
//!     vec!["y".into()],
//!     Array2::from_shape_vec((18, 1), y).unwrap(),
//! ).unwrap();
//!
//! let config = AnalysisConfig::with_columns(vec!["a".into(), "b".into()], vec!["y".into()]);
//! let analysis = analyze(&dataset, &config).unwrap();
//!
//! let names: Vec<String> = analysis.reduced_terms.iter().map(|t| t.to_string()).collect();
//! assert!(names.contains(&"a".to_string()));
//! assert_eq!(analysis.results.len(), 1);
//! ```
//!
//! ## Features
//!
//! - `serde`: Enable serialization of configurations and results, and JSON export
//! - `parallel`: Fit responses in parallel using rayon
//! - `python`: Enable Python bindings via PyO3
//! - `cli`: Build the `mixed-doe` command-line tool (default)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod data;
pub mod doe;
pub mod error;
pub mod export;
pub mod report;
pub mod terms;
pub mod utils;

#[cfg(feature = "python")]
pub mod python;

#[cfg(feature = "parallel")]
pub mod parallel;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::data::{Dataset, Grouping, ScaleParams, StandardizationRow, Standardizer};
    pub use crate::doe::{
        analyze, analyze_csv, AnalysisConfig, DOEAnalysis, Effect, EffectSummary, LackOfFit, MixedFit,
        MixedModelConfig, NaturalPolynomial, ResponseAnalysis, Stage, StageFailure,
    };
    pub use crate::error::{Error, Result};
    pub use crate::export::write_all;
    pub use crate::report::render_summary;
    pub use crate::terms::{build_rsm_terms, formula, Term};
}

// Re-export commonly used items at crate root
pub use data::Dataset;
pub use doe::{analyze, analyze_csv, AnalysisConfig, DOEAnalysis};
pub use error::{Error, Result};
