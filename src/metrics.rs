//! Classification metrics
//!
//! Accuracy is the exact-match rate. Precision, recall and F1 are computed per
//! class and combined with an explicit [`AveragePolicy`]; the default weights each
//! class by its support in the true labels, which is defined for any number of
//! classes.

use crate::error::{HarnessError, Result};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metric used to score cross-validation folds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMetric {
    #[default]
    Accuracy,
    Precision,
    Recall,
    F1,
}

impl ScoringMetric {
    pub fn name(&self) -> &'static str {
        match self {
            ScoringMetric::Accuracy => "accuracy",
            ScoringMetric::Precision => "precision",
            ScoringMetric::Recall => "recall",
            ScoringMetric::F1 => "f1",
        }
    }
}

impl fmt::Display for ScoringMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How per-class precision/recall/F1 are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AveragePolicy {
    /// Mean of per-class values weighted by true-label support
    #[default]
    Weighted,
    /// Unweighted mean over every label seen in either vector
    Macro,
}

/// Metrics computed on the held-out subset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldoutMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Area under the ROC curve; binary tasks with score-capable models only
    pub roc_auc: Option<f64>,
}

impl HoldoutMetrics {
    /// All-zero metrics, used as the placeholder for failed models
    pub fn zeroed() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1: 0.0,
            roc_auc: None,
        }
    }

    pub fn get(&self, metric: ScoringMetric) -> f64 {
        match metric {
            ScoringMetric::Accuracy => self.accuracy,
            ScoringMetric::Precision => self.precision,
            ScoringMetric::Recall => self.recall,
            ScoringMetric::F1 => self.f1,
        }
    }
}

/// Per-class confusion counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// Occurrences of the class in the true labels
    pub support: usize,
}

impl ClassCounts {
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Computes holdout and cross-validation scores from raw predictions
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricsCollector {
    pub average: AveragePolicy,
}

impl MetricsCollector {
    pub fn new(average: AveragePolicy) -> Self {
        Self { average }
    }

    /// Accuracy, precision, recall and F1 for a prediction vector
    pub fn evaluate(&self, y_true: &Array1<i64>, y_pred: &Array1<i64>) -> Result<HoldoutMetrics> {
        let counts = Self::class_counts(y_true.view(), y_pred.view())?;

        let correct = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
        let accuracy = correct as f64 / y_true.len() as f64;

        let (precision, recall, f1) = self.average_counts(&counts, y_true.len());
        Ok(HoldoutMetrics {
            accuracy,
            precision,
            recall,
            f1,
            roc_auc: None,
        })
    }

    /// A single scoring metric, as used for cross-validation folds
    pub fn score(
        &self,
        metric: ScoringMetric,
        y_true: &Array1<i64>,
        y_pred: &Array1<i64>,
    ) -> Result<f64> {
        Ok(self.evaluate(y_true, y_pred)?.get(metric))
    }

    /// Per-class confusion counts over the union of observed labels
    pub fn class_counts(
        y_true: ArrayView1<i64>,
        y_pred: ArrayView1<i64>,
    ) -> Result<BTreeMap<i64, ClassCounts>> {
        if y_true.len() != y_pred.len() {
            return Err(HarnessError::ShapeMismatch {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(HarnessError::InsufficientData(
                "cannot score an empty prediction set".to_string(),
            ));
        }

        let mut counts: BTreeMap<i64, ClassCounts> = BTreeMap::new();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            counts.entry(t).or_default().support += 1;
            if t == p {
                counts.entry(t).or_default().true_positives += 1;
            } else {
                counts.entry(p).or_default().false_positives += 1;
                counts.entry(t).or_default().false_negatives += 1;
            }
        }
        Ok(counts)
    }

    fn average_counts(&self, counts: &BTreeMap<i64, ClassCounts>, n_samples: usize) -> (f64, f64, f64) {
        match self.average {
            AveragePolicy::Weighted => {
                let total = n_samples as f64;
                counts.values().fold((0.0, 0.0, 0.0), |(p, r, f), c| {
                    let w = c.support as f64 / total;
                    (p + w * c.precision(), r + w * c.recall(), f + w * c.f1())
                })
            }
            AveragePolicy::Macro => {
                let k = counts.len() as f64;
                let (p, r, f) = counts.values().fold((0.0, 0.0, 0.0), |(p, r, f), c| {
                    (p + c.precision(), r + c.recall(), f + c.f1())
                });
                (p / k, r / k, f / k)
            }
        }
    }
}

/// Area under the ROC curve for one positive class.
///
/// Uses the rank-sum formulation with midranks for tied scores. Returns `None`
/// when only one class is present in `y_true`.
pub fn roc_auc(y_true: &Array1<i64>, scores: ArrayView1<f64>, positive: i64) -> Option<f64> {
    if y_true.len() != scores.len() {
        return None;
    }
    let n_pos = y_true.iter().filter(|&&y| y == positive).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based midrank of the tie block
        let midrank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y_true[idx] == positive {
                rank_sum_pos += midrank;
            }
        }
        i = j + 1;
    }

    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}
