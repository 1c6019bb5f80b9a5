//! Human-readable run summaries

use crate::selection::SelectionResult;
use crate::training::{MetricReport, ModelStatus};

/// Renders metric reports as plain text, one block per model in the given order
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportGenerator;

impl ReportGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Summary of every report, failed models included
    pub fn render(&self, reports: &[MetricReport]) -> String {
        let mut report = String::new();
        report.push_str("Model Performance Report\n");
        report.push_str(&"=".repeat(50));
        report.push('\n');

        for entry in reports {
            report.push_str(&format!("\n{}:\n", entry.model_id.to_uppercase()));
            match &entry.status {
                ModelStatus::Trained => {
                    let m = &entry.metrics;
                    report.push_str("  Status:    TRAINED\n");
                    report.push_str(&format!("  Accuracy:  {:.3}\n", m.accuracy));
                    report.push_str(&format!("  Precision: {:.3}\n", m.precision));
                    report.push_str(&format!("  Recall:    {:.3}\n", m.recall));
                    report.push_str(&format!("  F1 Score:  {:.3}\n", m.f1));
                    report.push_str(&format!(
                        "  CV Score:  {:.3} ± {:.3}\n",
                        entry.cv_mean, entry.cv_std
                    ));
                    if let Some(auc) = m.roc_auc {
                        report.push_str(&format!("  ROC AUC:   {:.3}\n", auc));
                    }
                }
                ModelStatus::Failed { reason } => {
                    report.push_str("  Status:    FAILED\n");
                    report.push_str(&format!("  Reason:    {}\n", reason));
                }
            }
        }

        report
    }

    /// [`ReportGenerator::render`] followed by the selected model
    pub fn render_with_selection(
        &self,
        reports: &[MetricReport],
        selection: &SelectionResult<'_>,
    ) -> String {
        let mut report = self.render(reports);
        report.push_str(&format!(
            "\nBest model: {} ({} = {:.3})\n",
            selection.model_id, selection.metric, selection.score
        ));
        report
    }
}
