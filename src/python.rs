//! Python bindings for the DOE pipeline.
//!
//! This module exposes the CSV-to-results pipeline to Python using PyO3.
//! Enable the `python` feature to use this.

use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::data::Dataset;
use crate::doe::{analyze, AnalysisConfig, DOEAnalysis};
use crate::export::write_all;
use crate::report::render_summary;

fn value_error(e: crate::Error) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(e.to_string())
}

fn config_for(predictors: Option<Vec<String>>, responses: Option<Vec<String>>) -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    if let Some(p) = predictors {
        config.predictors = p;
    }
    if let Some(r) = responses {
        config.responses = r;
    }
    config
}

fn load_and_analyze(file_path: &str, config: &AnalysisConfig) -> PyResult<(Dataset, DOEAnalysis)> {
    config.validate().map_err(value_error)?;
    let dataset =
        Dataset::from_csv_path(file_path, &config.predictors, &config.responses).map_err(value_error)?;
    let analysis = analyze(&dataset, config).map_err(value_error)?;
    Ok((dataset, analysis))
}

/// Python wrapper for a completed analysis
#[pyclass(name = "Analysis")]
pub struct PyAnalysis {
    inner: DOEAnalysis,
}

#[pymethods]
impl PyAnalysis {
    /// Names of the fitted responses.
    #[getter]
    fn responses(&self) -> Vec<String> {
        self.inner.results.iter().map(|r| r.response.clone()).collect()
    }

    /// The shared reduced term list.
    #[getter]
    fn reduced_terms(&self) -> Vec<String> {
        self.inner.reduced_terms.iter().map(ToString::to_string).collect()
    }

    /// Condition number of the reduced design, or None.
    #[getter]
    fn condition_number(&self) -> Option<f64> {
        self.inner.condition_number
    }

    /// Fixed intercepts keyed by response.
    fn fixed_intercepts(&self, py: Python<'_>) -> PyResult<PyObject> {
        let dict = PyDict::new(py);
        for (response, b0) in self.inner.fixed_intercepts() {
            dict.set_item(response, b0)?;
        }
        Ok(dict.into())
    }

    /// Natural-unit coefficients of one response as `(factor, estimate)` pairs.
    fn uncoded(&self, py: Python<'_>, response: &str) -> PyResult<PyObject> {
        let result = self.inner.response(response).ok_or_else(|| {
            pyo3::exceptions::PyKeyError::new_err(format!("response '{response}' was not fitted"))
        })?;
        let list = PyList::empty(py);
        for row in &result.decoded {
            list.append((row.factor.clone(), row.estimate))?;
        }
        Ok(list.into())
    }

    /// Recoverable failures as strings.
    fn failures(&self) -> Vec<String> {
        self.inner.failures.iter().map(ToString::to_string).collect()
    }

    /// The console summary.
    fn summary(&self) -> String {
        render_summary(&self.inner)
    }
}

/// Analyze a CSV file without writing anything.
#[pyfunction]
#[pyo3(signature = (file_path, predictors=None, responses=None))]
fn analyze_csv(
    file_path: &str,
    predictors: Option<Vec<String>>,
    responses: Option<Vec<String>>,
) -> PyResult<PyAnalysis> {
    let config = config_for(predictors, responses);
    let (_, analysis) = load_and_analyze(file_path, &config)?;
    Ok(PyAnalysis { inner: analysis })
}

/// Run the full pipeline and export every artifact to `output_dir`.
///
/// Returns the paths written.
#[pyfunction]
#[pyo3(signature = (file_path, output_dir, predictors=None, responses=None))]
fn run_mixed_model_doe(
    file_path: &str,
    output_dir: &str,
    predictors: Option<Vec<String>>,
    responses: Option<Vec<String>>,
) -> PyResult<Vec<String>> {
    let config = config_for(predictors, responses);
    let (dataset, analysis) = load_and_analyze(file_path, &config)?;
    let written = write_all(&analysis, &dataset, PathBuf::from(output_dir)).map_err(value_error)?;
    Ok(written.iter().map(|p| p.display().to_string()).collect())
}

/// The mixed_doe Python module.
#[pymodule]
fn mixed_doe(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyAnalysis>()?;
    m.add_function(wrap_pyfunction!(analyze_csv, m)?)?;
    m.add_function(wrap_pyfunction!(run_mixed_model_doe, m)?)?;
    Ok(())
}
