//! Best-model selection

use crate::error::{HarnessError, Result};
use crate::training::{MetricReport, TrainedModel, TrainingRun};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric used to rank candidate models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    Accuracy,
    Precision,
    Recall,
    #[default]
    F1,
    /// Mean cross-validation score
    CvMean,
    /// Binary ROC-AUC; models without it rank last
    RocAuc,
}

impl RankingMetric {
    pub fn name(&self) -> &'static str {
        match self {
            RankingMetric::Accuracy => "accuracy",
            RankingMetric::Precision => "precision",
            RankingMetric::Recall => "recall",
            RankingMetric::F1 => "f1",
            RankingMetric::CvMean => "cv_mean",
            RankingMetric::RocAuc => "roc_auc",
        }
    }

    /// Value of this metric in a report; NaN when unavailable
    pub fn value(&self, report: &MetricReport) -> f64 {
        let m = &report.metrics;
        match self {
            RankingMetric::Accuracy => m.accuracy,
            RankingMetric::Precision => m.precision,
            RankingMetric::Recall => m.recall,
            RankingMetric::F1 => m.f1,
            RankingMetric::CvMean => report.cv_mean,
            RankingMetric::RocAuc => m.roc_auc.unwrap_or(f64::NAN),
        }
    }
}

impl fmt::Display for RankingMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The winning model of a run
#[derive(Debug, Clone, Copy)]
pub struct SelectionResult<'a> {
    pub model_id: &'a str,
    pub metric: RankingMetric,
    pub score: f64,
    pub report: &'a MetricReport,
    pub model: &'a TrainedModel,
}

/// Picks the best non-failed report; earlier reports win ties
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSelector {
    metric: RankingMetric,
}

impl ModelSelector {
    pub fn new(metric: RankingMetric) -> Self {
        Self { metric }
    }

    pub fn metric(&self) -> RankingMetric {
        self.metric
    }

    /// Best report among `reports`, which must be in registry order
    pub fn select_report<'a>(&self, reports: &'a [MetricReport]) -> Result<&'a MetricReport> {
        let rank = |report: &MetricReport| {
            let v = self.metric.value(report);
            if v.is_nan() {
                f64::NEG_INFINITY
            } else {
                v
            }
        };

        let mut best: Option<(&MetricReport, f64)> = None;
        for report in reports.iter().filter(|r| !r.is_failed()) {
            let value = rank(report);
            match best {
                Some((_, best_value)) if value <= best_value => {}
                _ => best = Some((report, value)),
            }
        }

        best.map(|(report, _)| report).ok_or_else(|| {
            HarnessError::NoViableModel(format!(
                "all {} registered models failed to train",
                reports.len()
            ))
        })
    }

    /// Best trained model of a run
    pub fn select<'a>(&self, run: &'a TrainingRun) -> Result<SelectionResult<'a>> {
        let report = self.select_report(run.reports())?;
        let model = run.model(&report.model_id).ok_or_else(|| {
            HarnessError::NoViableModel(format!(
                "no trained model recorded for '{}'",
                report.model_id
            ))
        })?;

        let score = self.metric.value(report);
        tracing::info!(
            model = %report.model_id,
            metric = %self.metric,
            score,
            "Selected best model"
        );
        Ok(SelectionResult {
            model_id: &report.model_id,
            metric: self.metric,
            score,
            report,
            model,
        })
    }
}
