//! Dataset container consumed by the harness
//!
//! A [`Dataset`] is an `N x D` feature matrix paired with `N` integer-coded
//! class labels. It is produced by an upstream feature-engineering stage and is
//! treated as read-only once constructed.

use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Feature matrix plus integer class labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Array1<i64>,
    feature_names: Vec<String>,
}

impl Dataset {
    /// Create a dataset from a feature matrix and a parallel label vector
    pub fn new(features: Array2<f64>, labels: Array1<i64>) -> Result<Self> {
        let feature_names = (0..features.ncols()).map(|i| format!("f{}", i)).collect();
        Self::with_feature_names(features, labels, feature_names)
    }

    /// Create a dataset with explicit column names
    pub fn with_feature_names(
        features: Array2<f64>,
        labels: Array1<i64>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(HarnessError::ShapeMismatch {
                expected: format!("{} labels", features.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        if features.nrows() == 0 {
            return Err(HarnessError::InsufficientData(
                "dataset has no rows".to_string(),
            ));
        }
        if features.ncols() == 0 {
            return Err(HarnessError::ShapeMismatch {
                expected: "at least 1 feature column".to_string(),
                actual: "0 feature columns".to_string(),
            });
        }
        if feature_names.len() != features.ncols() {
            return Err(HarnessError::ShapeMismatch {
                expected: format!("{} feature names", features.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        if let Some(((row, col), value)) = features.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(HarnessError::DataError(format!(
                "non-finite feature value {} at row {}, column {}",
                value, row, col
            )));
        }

        Ok(Self {
            features,
            labels,
            feature_names,
        })
    }

    /// Build a dataset from row vectors, checking that every row has the same length
    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<i64>) -> Result<Self> {
        let n_features = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_features) {
            return Err(HarnessError::ShapeMismatch {
                expected: format!("{} features per row", n_features),
                actual: format!("{} features in row {}", row.len(), idx),
            });
        }

        let n_rows = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((n_rows, n_features), flat)?;
        Self::new(features, Array1::from_vec(labels))
    }

    /// Extract a dataset from a DataFrame; every column except `target` is a feature
    pub fn from_dataframe(df: &DataFrame, target: &str) -> Result<Self> {
        let feature_cols: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != target)
            .map(|s| s.to_string())
            .collect();

        let target_series = df
            .column(target)
            .map_err(|_| HarnessError::DataError(format!("target column '{}' not found", target)))?;
        let target_i64 = target_series.cast(&DataType::Int64)?;
        let labels: Vec<i64> = target_i64
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                v.ok_or_else(|| HarnessError::DataError(format!("missing label at row {}", row)))
            })
            .collect::<Result<_>>()?;

        let col_data: Vec<Vec<f64>> = feature_cols
            .iter()
            .map(|col_name| {
                let series = df.column(col_name)?;
                let series_f64 = series.cast(&DataType::Float64)?;
                series_f64
                    .f64()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, v)| {
                        v.ok_or_else(|| {
                            HarnessError::DataError(format!(
                                "missing value in column '{}' at row {}",
                                col_name, row
                            ))
                        })
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<_>>()?;

        let features =
            Array2::from_shape_fn((df.height(), feature_cols.len()), |(r, c)| col_data[c][r]);
        Self::with_feature_names(features, Array1::from_vec(labels), feature_cols)
    }

    /// Read a headered CSV file produced by the feature-engineering stage
    pub fn load_csv(path: impl AsRef<Path>, target: &str) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_infer_schema_length(Some(1000))
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()?;
        Self::from_dataframe(&df, target)
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &Array1<i64> {
        &self.labels
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Number of samples
    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    /// Number of feature columns
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Number of members per class, ordered by label
    pub fn class_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for &label in self.labels.iter() {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }

    /// Sorted distinct labels
    pub fn classes(&self) -> Vec<i64> {
        self.class_counts().into_keys().collect()
    }

    /// Gather the given rows, in the given order, into a new dataset
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }
}
