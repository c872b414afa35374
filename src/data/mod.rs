//! Experimental data tables.
//!
//! This module provides:
//! - [`Dataset`]: the immutable table of experimental runs, holding raw
//!   predictor and response columns plus the verbatim input rows
//! - [`Grouping`]: the Configuration Key partition of the runs into
//!   replicate groups
//! - [`Standardizer`]: z-scoring of predictors with the retained affine
//!   transform used for decoding
//!
//! The Configuration Key is derived exactly once, from raw predictor values,
//! when the dataset is built. Every later stage reads the same [`Grouping`].

mod standardize;

pub use standardize::{ScaleParams, StandardizationRow, Standardizer};

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use ndarray::{Array2, ArrayView1};

use crate::error::{Error, Result};

/// Column name used for the Configuration Key in exported tables.
pub const CONFIG_KEY_COLUMN: &str = "Config_combo";

/// Replicate groups defined by the Configuration Key.
///
/// Groups are ordered by key. Each observation belongs to exactly one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    keys: Vec<String>,
    membership: Vec<usize>,
    counts: Vec<usize>,
}

impl Grouping {
    /// Build the grouping from one key per observation.
    #[must_use]
    pub fn from_keys(keys: &[String]) -> Self {
        let index: BTreeMap<&str, usize> = keys
            .iter()
            .map(String::as_str)
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(i, k)| (k, i))
            .collect();

        let mut counts = vec![0; index.len()];
        let membership: Vec<usize> = keys
            .iter()
            .map(|k| {
                let g = index[k.as_str()];
                counts[g] += 1;
                g
            })
            .collect();

        Self {
            keys: index.keys().map(|k| (*k).to_string()).collect(),
            membership,
            counts,
        }
    }

    /// Number of distinct configurations.
    #[must_use]
    pub fn n_groups(&self) -> usize {
        self.keys.len()
    }

    /// Number of observations.
    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.membership.len()
    }

    /// Group index of observation `i`.
    #[must_use]
    pub fn group_of(&self, i: usize) -> usize {
        self.membership[i]
    }

    /// Group index of every observation.
    #[must_use]
    pub fn membership(&self) -> &[usize] {
        &self.membership
    }

    /// Replicate count per group.
    #[must_use]
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Distinct keys, in group order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Per-group sums of `values` (one value per observation).
    #[must_use]
    pub fn group_sums(&self, values: &[f64]) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_groups()];
        for (&g, v) in self.membership.iter().zip(values) {
            sums[g] += v;
        }
        sums
    }

    /// Per-group means of `values` (one value per observation).
    #[must_use]
    pub fn group_means(&self, values: &[f64]) -> Vec<f64> {
        self.group_sums(values)
            .into_iter()
            .zip(&self.counts)
            .map(|(s, &c)| s / c as f64)
            .collect()
    }
}

/// An immutable table of experimental runs.
#[derive(Debug, Clone)]
pub struct Dataset {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
    predictor_names: Vec<String>,
    response_names: Vec<String>,
    predictors: Array2<f64>,
    responses: Array2<f64>,
    config_keys: Vec<String>,
    grouping: Grouping,
}

impl Dataset {
    /// Load a headered CSV file.
    ///
    /// # Errors
    ///
    /// Returns an input error if the file cannot be read, is empty, lacks a
    /// required column, or holds a missing or non-numeric required value.
    pub fn from_csv_path(
        path: impl AsRef<Path>,
        predictors: &[String],
        responses: &[String],
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
        Self::from_reader(file, predictors, responses).map_err(|e| match e {
            Error::Io { message, .. } => Error::io(path, message),
            other => other,
        })
    }

    /// Load headered CSV data from any reader.
    ///
    /// # Errors
    ///
    /// See [`Dataset::from_csv_path`].
    pub fn from_reader<R: Read>(
        reader: R,
        predictors: &[String],
        responses: &[String],
    ) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| Error::io("<csv>", e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut records = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec.map_err(|e| Error::io("<csv>", format!("row {}: {e}", i + 1)))?;
            records.push(rec.iter().map(str::to_string).collect());
        }

        Self::from_records(headers, records, predictors, responses)
    }

    /// Build a dataset from string cells.
    ///
    /// Columns other than the named predictors and responses are kept for
    /// re-export and otherwise ignored.
    ///
    /// # Errors
    ///
    /// See [`Dataset::from_csv_path`].
    pub fn from_records(
        headers: Vec<String>,
        records: Vec<Vec<String>>,
        predictors: &[String],
        responses: &[String],
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::EmptyDataset);
        }

        let column = |name: &String| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| Error::MissingColumn(name.clone()))
        };
        let predictor_cols = predictors.iter().map(column).collect::<Result<Vec<_>>>()?;
        let response_cols = responses.iter().map(column).collect::<Result<Vec<_>>>()?;

        let parse_block = |cols: &[usize], names: &[String]| -> Result<Array2<f64>> {
            let mut block = Array2::zeros((records.len(), cols.len()));
            for (row, record) in records.iter().enumerate() {
                for (j, (&col, name)) in cols.iter().zip(names).enumerate() {
                    let cell = record.get(col).map_or("", String::as_str);
                    block[[row, j]] = parse_cell(cell).ok_or_else(|| Error::InvalidValue {
                        column: name.clone(),
                        row: row + 1,
                        value: cell.to_string(),
                    })?;
                }
            }
            Ok(block)
        };

        let predictor_block = parse_block(&predictor_cols, predictors)?;
        let response_block = parse_block(&response_cols, responses)?;

        Ok(Self::assemble(
            headers,
            records,
            predictors.to_vec(),
            responses.to_vec(),
            predictor_block,
            response_block,
        ))
    }

    /// Build a dataset directly from numeric predictor and response blocks.
    ///
    /// # Errors
    ///
    /// Returns an input error if the blocks are empty, their shapes disagree
    /// with the names, or they contain non-finite values.
    ///
    /// # Example
    ///
    /// ```
    /// use mixed_doe::data::Dataset;
    /// use ndarray::array;
    ///
    /// let ds = Dataset::from_arrays(
    ///     vec!["x".into()],
    ///     array![[1.0], [1.0], [2.0]],
    ///     vec!["y".into()],
    ///     array![[3.0], [3.5], [5.0]],
    /// )
    /// .unwrap();
    /// assert_eq!(ds.grouping().n_groups(), 2);
    /// ```
    pub fn from_arrays(
        predictor_names: Vec<String>,
        predictors: Array2<f64>,
        response_names: Vec<String>,
        responses: Array2<f64>,
    ) -> Result<Self> {
        if predictors.nrows() == 0 {
            return Err(Error::EmptyDataset);
        }
        if predictors.ncols() != predictor_names.len()
            || responses.ncols() != response_names.len()
            || responses.nrows() != predictors.nrows()
        {
            return Err(Error::invalid_config(format!(
                "block shapes {:?}/{:?} do not match {} predictor and {} response names",
                predictors.dim(),
                responses.dim(),
                predictor_names.len(),
                response_names.len()
            )));
        }

        for (names, block) in [(&predictor_names, &predictors), (&response_names, &responses)] {
            if let Some(((row, col), v)) = block.indexed_iter().find(|(_, v)| !v.is_finite()) {
                return Err(Error::InvalidValue {
                    column: names[col].clone(),
                    row: row + 1,
                    value: v.to_string(),
                });
            }
        }

        let headers: Vec<String> = predictor_names
            .iter()
            .chain(&response_names)
            .cloned()
            .collect();
        let records: Vec<Vec<String>> = predictors
            .outer_iter()
            .zip(responses.outer_iter())
            .map(|(p, r)| p.iter().chain(r.iter()).map(|v| format_value(*v)).collect())
            .collect();

        Ok(Self::assemble(
            headers,
            records,
            predictor_names,
            response_names,
            predictors,
            responses,
        ))
    }

    fn assemble(
        headers: Vec<String>,
        records: Vec<Vec<String>>,
        predictor_names: Vec<String>,
        response_names: Vec<String>,
        predictors: Array2<f64>,
        responses: Array2<f64>,
    ) -> Self {
        let config_keys: Vec<String> = predictors.outer_iter().map(config_key).collect();
        let grouping = Grouping::from_keys(&config_keys);

        Self {
            headers,
            records,
            predictor_names,
            response_names,
            predictors,
            responses,
            config_keys,
            grouping,
        }
    }

    /// Number of observations.
    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.predictors.nrows()
    }

    /// Predictor names, in column order.
    #[must_use]
    pub fn predictor_names(&self) -> &[String] {
        &self.predictor_names
    }

    /// Response names, in column order.
    #[must_use]
    pub fn response_names(&self) -> &[String] {
        &self.response_names
    }

    /// Raw predictor block (observations × predictors).
    #[must_use]
    pub fn predictors(&self) -> &Array2<f64> {
        &self.predictors
    }

    /// Raw values of one response.
    #[must_use]
    pub fn response(&self, index: usize) -> ArrayView1<'_, f64> {
        self.responses.column(index)
    }

    /// Raw values of a response looked up by name.
    #[must_use]
    pub fn response_by_name(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let idx = self.response_names.iter().position(|r| r == name)?;
        Some(self.response(idx))
    }

    /// Configuration Key of every observation.
    #[must_use]
    pub fn config_keys(&self) -> &[String] {
        &self.config_keys
    }

    /// The replicate grouping shared by every response.
    #[must_use]
    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    /// Original column headers.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Original rows as read.
    #[must_use]
    pub fn records(&self) -> &[Vec<String>] {
        &self.records
    }
}

/// Render a value the way Configuration Keys spell it: shortest round-trip form.
fn format_value(v: f64) -> String {
    format!("{v}")
}

fn config_key(row: ArrayView1<'_, f64>) -> String {
    row.iter()
        .map(|v| format_value(*v))
        .collect::<Vec<_>>()
        .join("_")
}

fn parse_cell(cell: &str) -> Option<f64> {
    let v: f64 = cell.trim().parse().ok()?;
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    const CSV: &str = "\
run,dye1,dye2,Time,Temp,Lvalue,Avalue,Bvalue,operator
1,0.5,1,30,120,50.1,2.0,-3.1,ann
2,0.5,1,30,120,50.3,2.1,-3.0,bob
3,1.0,1,30,120,45.2,3.4,-2.2,ann
4,1.0,2,60,140,40.8,4.0,-1.9,bob
";

    #[test]
    fn test_from_reader_ignores_extra_columns() {
        let ds = Dataset::from_reader(
            CSV.as_bytes(),
            &names(&["dye1", "dye2", "Time", "Temp"]),
            &names(&["Lvalue", "Avalue", "Bvalue"]),
        )
        .unwrap();

        assert_eq!(ds.n_observations(), 4);
        assert_eq!(ds.predictors()[[2, 0]], 1.0);
        assert_eq!(ds.response_by_name("Bvalue").unwrap()[3], -1.9);
        assert_eq!(ds.headers().len(), 9);
        assert_eq!(ds.records()[1][8], "bob");
    }

    #[test]
    fn test_config_keys_from_raw_values() {
        let ds = Dataset::from_reader(
            CSV.as_bytes(),
            &names(&["dye1", "dye2", "Time", "Temp"]),
            &names(&["Lvalue"]),
        )
        .unwrap();

        assert_eq!(ds.config_keys()[0], "0.5_1_30_120");
        assert_eq!(ds.config_keys()[0], ds.config_keys()[1]);
        let grouping = ds.grouping();
        assert_eq!(grouping.n_groups(), 3);
        assert_eq!(grouping.group_of(0), grouping.group_of(1));
        assert_eq!(grouping.counts().iter().sum::<usize>(), 4);
    }

    #[test]
    fn test_missing_column() {
        let err = Dataset::from_reader(CSV.as_bytes(), &names(&["dye3"]), &names(&["Lvalue"]))
            .unwrap_err();
        assert_eq!(err, Error::MissingColumn("dye3".into()));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_invalid_value_names_row_and_column() {
        let data = "x,y\n1,2\n2,\n";
        let err = Dataset::from_reader(data.as_bytes(), &names(&["x"]), &names(&["y"])).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidValue {
                column: "y".into(),
                row: 2,
                value: String::new(),
            }
        );
    }

    #[test]
    fn test_empty_dataset() {
        let err =
            Dataset::from_reader("x,y\n".as_bytes(), &names(&["x"]), &names(&["y"])).unwrap_err();
        assert_eq!(err, Error::EmptyDataset);
    }

    #[test]
    fn test_group_means() {
        let ds = Dataset::from_arrays(
            names(&["x"]),
            array![[1.0], [2.0], [1.0], [2.0]],
            names(&["y"]),
            array![[1.0], [10.0], [3.0], [20.0]],
        )
        .unwrap();
        let y: Vec<f64> = ds.response(0).to_vec();
        assert_eq!(ds.grouping().group_means(&y), vec![2.0, 15.0]);
        assert_eq!(ds.grouping().keys(), &["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_from_arrays_rejects_non_finite() {
        let err = Dataset::from_arrays(
            names(&["x"]),
            array![[1.0], [f64::NAN]],
            names(&["y"]),
            array![[1.0], [2.0]],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { row: 2, .. }));
    }
}
