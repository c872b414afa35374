//! Export of analysis results to CSV and text files.
//!
//! Every artifact is a headered CSV (or plain text for the formulas) written
//! into one output directory, using column names that JMP-style scripts
//! expect. Numbers are written in shortest round-trip form.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};
use tracing::info;

use crate::data::{Dataset, CONFIG_KEY_COLUMN};
use crate::doe::{DOEAnalysis, EffectSummary, ResponseAnalysis};
use crate::error::{Error, Result};
use crate::terms::formula;

/// Full-model LogWorth summary.
pub const FULL_LOGWORTH_FILE: &str = "fullmodel_logworth.csv";
/// Reduced-model LogWorth summary.
pub const SIMPLIFIED_LOGWORTH_FILE: &str = "simplified_logworth.csv";
/// Coded (standardized-space) coefficients.
pub const CODED_PARAMETERS_FILE: &str = "coded_parameters.csv";
/// Natural-unit coefficients.
pub const UNCODED_PARAMETERS_FILE: &str = "uncoded_parameters.csv";
/// Pure fixed-effects intercepts.
pub const FIXED_INTERCEPTS_FILE: &str = "fixed_intercepts.csv";
/// R², adjusted R², RMSE per response.
pub const DIAGNOSTICS_FILE: &str = "diagnostics_summary.csv";
/// Lack-of-Fit tables.
pub const LACK_OF_FIT_FILE: &str = "JMP_style_lof.csv";
/// Standardization parameters.
pub const SCALER_FILE: &str = "scaler.csv";
/// Pre/post standardization summary.
pub const INPUT_BRIEF_FILE: &str = "InputDataBrief.csv";
/// Model formulas.
pub const FORMULAS_FILE: &str = "model_formulas.txt";
/// Raw input rows with the Configuration Key.
pub const DESIGN_DATA_FILE: &str = "design_data.csv";
/// Variance components.
pub const VARIANCE_SUMMARY_FILE: &str = "mixed_model_variance_summary.csv";
/// Recoverable failures.
pub const FAILURES_FILE: &str = "stage_failures.csv";

/// File name of the residual table for `response`.
#[must_use]
pub fn residual_file_name(response: &str) -> String {
    format!("residual_data_{response}_from_MixedModel.csv")
}

fn num(v: f64) -> String {
    format!("{v}")
}

/// A CSV file being written, carrying its path for error messages.
struct CsvOut {
    path: PathBuf,
    writer: Writer<File>,
}

impl CsvOut {
    fn create<H, S>(dir: &Path, name: &str, header: H) -> Result<Self>
    where
        H: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let path = dir.join(name);
        let writer = WriterBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(|e| Error::io(&path, e))?;
        let mut out = Self { path, writer };
        out.row(header)?;
        Ok(out)
    }

    fn row<R, S>(&mut self, record: R) -> Result<()>
    where
        R: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.writer.write_record(record).map_err(|e| Error::io(&self.path, e))
    }

    fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush().map_err(|e| Error::io(&self.path, e))?;
        Ok(self.path)
    }
}

/// Write every artifact into `dir`, creating it if needed.
///
/// Returns the paths written, in a fixed order.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory or a file cannot be written.
pub fn write_all(analysis: &DOEAnalysis, dataset: &Dataset, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut written = vec![
        write_fixed_intercepts(analysis, dir)?,
        write_effect_summary(&analysis.full_effects, dir, FULL_LOGWORTH_FILE)?,
        write_effect_summary(&analysis.reduced_effects, dir, SIMPLIFIED_LOGWORTH_FILE)?,
        write_coded_parameters(analysis, dir)?,
        write_uncoded_parameters(analysis, dir)?,
        write_diagnostics(analysis, dir)?,
        write_lack_of_fit(analysis, dir)?,
        write_scaler(analysis, dir)?,
        write_formulas(analysis, dir)?,
    ];
    for result in &analysis.results {
        written.push(write_residuals(result, dir)?);
    }
    written.push(write_design_data(dataset, dir)?);
    written.push(write_variance_summary(analysis, dir)?);
    written.push(write_input_brief(analysis, dir)?);
    written.push(write_failures(analysis, dir)?);

    info!(dir = %dir.display(), files = written.len(), "results exported");
    Ok(written)
}

/// Write a LogWorth summary: `Factor`, one column per response, then the derived columns.
///
/// # Errors
///
/// Returns [`Error::Io`] on write failure.
pub fn write_effect_summary(summary: &EffectSummary, dir: &Path, name: &str) -> Result<PathBuf> {
    let header = std::iter::once("Factor")
        .chain(summary.responses.iter().map(String::as_str))
        .chain(["Median_LogWorth", "Max_LogWorth", "Appears_Significant"]);
    let mut out = CsvOut::create(dir, name, header)?;
    for row in &summary.rows {
        let record = std::iter::once(row.effect.to_string())
            .chain(row.logworth.iter().copied().map(num))
            .chain([
                num(row.median_logworth),
                num(row.max_logworth),
                row.appears_significant.to_string(),
            ]);
        out.row(record)?;
    }
    out.finish()
}

fn write_fixed_intercepts(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(dir, FIXED_INTERCEPTS_FILE, ["Response", "Fixed_Intercept"])?;
    for (response, b0) in analysis.fixed_intercepts() {
        out.row([response, num(b0)])?;
    }
    out.finish()
}

fn write_coded_parameters(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(
        dir,
        CODED_PARAMETERS_FILE,
        ["Response", "Factor", "Coef.", "Std.Err.", "z", "P>|z|", "LogWorth"],
    )?;
    for row in analysis.results.iter().flat_map(|r| &r.coded) {
        out.row([
            row.response.clone(),
            row.factor.clone(),
            num(row.estimate),
            num(row.std_error),
            row.z.map(num).unwrap_or_default(),
            num(row.p_value.unwrap_or(1.0)),
            num(row.logworth),
        ])?;
    }
    out.finish()
}

fn write_uncoded_parameters(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(dir, UNCODED_PARAMETERS_FILE, ["Factor", "Estimate", "Response"])?;
    for row in analysis.results.iter().flat_map(|r| &r.decoded) {
        out.row([row.factor.clone(), num(row.estimate), row.response.clone()])?;
    }
    out.finish()
}

fn write_diagnostics(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(
        dir,
        DIAGNOSTICS_FILE,
        [
            "Response",
            "R2_Approximate",
            "Adjusted_R2_Approximate",
            "RMSE",
            "Mean_Response",
            "Observations",
        ],
    )?;
    for d in analysis.results.iter().map(|r| &r.diagnostics) {
        out.row([
            d.response.clone(),
            num(d.r2_approximate),
            num(d.adjusted_r2_approximate),
            num(d.rmse),
            num(d.mean_response),
            d.observations.to_string(),
        ])?;
    }
    out.finish()
}

fn write_lack_of_fit(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(
        dir,
        LACK_OF_FIT_FILE,
        [
            "Response",
            "DF_LackOfFit",
            "SS_LackOfFit",
            "MS_LackOfFit",
            "DF_PureError",
            "SS_PureError",
            "MS_PureError",
            "F_Ratio",
            "p_Value",
        ],
    )?;
    for lof in analysis.results.iter().filter_map(|r| r.lack_of_fit.as_ref()) {
        out.row([
            lof.response.clone(),
            lof.df_lack_of_fit.to_string(),
            num(lof.ss_lack_of_fit),
            num(lof.ms_lack_of_fit),
            lof.df_pure_error.to_string(),
            num(lof.ss_pure_error),
            num(lof.ms_pure_error),
            num(lof.f_ratio),
            num(lof.p_value),
        ])?;
    }
    out.finish()
}

fn write_scaler(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(dir, SCALER_FILE, ["Variable", "Mean", "StdDev"])?;
    for row in &analysis.standardization {
        out.row([row.variable.clone(), num(row.original_mean), num(row.original_std)])?;
    }
    out.finish()
}

fn write_input_brief(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(
        dir,
        INPUT_BRIEF_FILE,
        [
            "Variable",
            "Mean (after standardization)",
            "StdDev (after standardization)",
            "Original Mean (X_mean)",
            "Original StdDev (X_std)",
        ],
    )?;
    for row in &analysis.standardization {
        out.row([
            row.variable.clone(),
            num(row.mean_after),
            num(row.std_after),
            num(row.original_mean),
            num(row.original_std),
        ])?;
    }
    out.finish()
}

fn write_formulas(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(FORMULAS_FILE);
    let text: String = analysis
        .responses
        .iter()
        .map(|response| format!("{response} formula:\n{}\n\n", formula(response, &analysis.reduced_terms)))
        .collect();
    let mut file = File::create(&path).map_err(|e| Error::io(&path, e))?;
    file.write_all(text.as_bytes()).map_err(|e| Error::io(&path, e))?;
    Ok(path)
}

/// Write the residual table for one response.
///
/// # Errors
///
/// Returns [`Error::Io`] on write failure.
pub fn write_residuals(result: &ResponseAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(
        dir,
        &residual_file_name(&result.response),
        [
            "ID",
            CONFIG_KEY_COLUMN,
            "Actual",
            "Predicted",
            "Residual",
            "Pseudo_Studentized_Residual",
        ],
    )?;
    for r in &result.residuals {
        out.row([
            r.id.to_string(),
            r.config_key.clone(),
            num(r.actual),
            num(r.predicted),
            num(r.residual),
            num(r.pseudo_studentized_residual),
        ])?;
    }
    out.finish()
}

fn write_design_data(dataset: &Dataset, dir: &Path) -> Result<PathBuf> {
    let header = dataset
        .headers()
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(CONFIG_KEY_COLUMN));
    let mut out = CsvOut::create(dir, DESIGN_DATA_FILE, header)?;
    for (record, key) in dataset.records().iter().zip(dataset.config_keys()) {
        out.row(record.iter().chain(std::iter::once(key)))?;
    }
    out.finish()
}

fn write_variance_summary(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(
        dir,
        VARIANCE_SUMMARY_FILE,
        ["Response", "Group_Var", "Residual_Var", "RMSE_from_Var"],
    )?;
    for v in analysis.results.iter().map(|r| &r.variance) {
        out.row([
            v.response.clone(),
            num(v.group_var),
            num(v.residual_var),
            num(v.rmse_from_var),
        ])?;
    }
    out.finish()
}

fn write_failures(analysis: &DOEAnalysis, dir: &Path) -> Result<PathBuf> {
    let mut out = CsvOut::create(dir, FAILURES_FILE, ["Stage", "Response", "Error"])?;
    for f in &analysis.failures {
        out.row([
            f.stage.as_str().to_string(),
            f.response.clone().unwrap_or_default(),
            f.error.to_string(),
        ])?;
    }
    out.finish()
}

/// Serialize the full analysis as pretty JSON.
///
/// # Errors
///
/// Returns [`Error::Io`] if serialization or writing fails.
#[cfg(feature = "serde")]
pub fn write_json(analysis: &DOEAnalysis, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref().to_path_buf();
    let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
    serde_json::to_writer_pretty(file, analysis).map_err(|e| Error::io(&path, e))?;
    Ok(path)
}
