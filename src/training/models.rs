//! Model capability trait and trained-model handle

use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability every model family exposes to the orchestrator.
///
/// Labels are integer class codes. `predict_score` returns one column per entry
/// of [`Classifier::classes`], in the same order, or `None` when the family has
/// no score output.
pub trait Classifier: Send + Sync + fmt::Debug {
    /// Stable family name, also recorded in artifacts
    fn name(&self) -> &'static str;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()>;

    /// Predict class labels
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>>;

    /// Per-class scores, if the family produces them
    fn predict_score(&self, _x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        Ok(None)
    }

    /// Sorted class labels seen during fit
    fn classes(&self) -> &[i64];

    /// Serialize the fitted state
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// A fitted model together with the registry identifier it was built from
pub struct TrainedModel {
    id: String,
    model: Box<dyn Classifier>,
}

impl TrainedModel {
    pub fn new(id: impl Into<String>, model: Box<dyn Classifier>) -> Self {
        Self {
            id: id.into(),
            model,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model_type(&self) -> &'static str {
        self.model.name()
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.model.as_ref()
    }

    pub fn into_classifier(self) -> Box<dyn Classifier> {
        self.model
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        self.model.predict(x)
    }

    pub fn predict_score(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.model.predict_score(x)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.model.to_bytes()
    }
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("id", &self.id)
            .field("model_type", &self.model.name())
            .finish()
    }
}

/// Maps arbitrary integer labels onto contiguous indices `0..k`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<i64>,
}

impl LabelEncoder {
    pub fn fit(y: &Array1<i64>) -> Self {
        let mut classes: Vec<i64> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Index of every label; labels unseen at fit time are an error
    pub fn encode(&self, y: &Array1<i64>) -> Result<Vec<usize>> {
        y.iter()
            .map(|label| {
                self.classes.binary_search(label).map_err(|_| {
                    HarnessError::DataError(format!("label {} was not seen during fit", label))
                })
            })
            .collect()
    }

    pub fn decode(&self, idx: usize) -> i64 {
        self.classes[idx]
    }

    /// One-hot matrix of shape `(n, k)`
    pub fn one_hot(&self, encoded: &[usize]) -> Array2<f64> {
        let mut out = Array2::zeros((encoded.len(), self.classes.len()));
        for (i, &c) in encoded.iter().enumerate() {
            out[[i, c]] = 1.0;
        }
        out
    }
}

/// Per-column z-score standardization learned on the training set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl FeatureScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        // Constant columns keep unit scale
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

/// Shared fit-time checks: matching lengths and a non-empty feature matrix.
/// The class count is checked by each family.
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(HarnessError::ShapeMismatch {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(HarnessError::InsufficientData(format!(
            "cannot fit on a {}x{} feature matrix",
            x.nrows(),
            x.ncols()
        )));
    }
    Ok(())
}

/// Shared predict-time check against the fitted feature count
pub(crate) fn check_predict_input(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if n_features == 0 {
        return Err(HarnessError::ModelNotFitted);
    }
    if x.ncols() != n_features {
        return Err(HarnessError::ShapeMismatch {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Index of the largest value; the first index wins ties
pub(crate) fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Row-wise softmax with max subtraction
pub(crate) fn softmax_rows(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// Decode the argmax of every score row into class labels
pub(crate) fn decode_argmax(scores: &Array2<f64>, encoder: &LabelEncoder) -> Array1<i64> {
    scores
        .rows()
        .into_iter()
        .map(|row| encoder.decode(argmax(row)))
        .collect()
}

pub(crate) fn to_bincode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| {
        HarnessError::SerializationError(format!("Failed to serialize model: {}", e))
    })
}
