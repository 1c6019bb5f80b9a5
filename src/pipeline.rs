//! End-to-end harness run
//!
//! split → orchestrate → select → persist → render, driven by a [`HarnessConfig`].

use crate::artifacts::{ArtifactStore, SavedArtifact};
use crate::config::HarnessConfig;
use crate::dataset::Dataset;
use crate::error::{HarnessError, Result};
use crate::report::ReportGenerator;
use crate::selection::{ModelSelector, RankingMetric};
use crate::training::{MetricReport, TrainingOrchestrator, TrainingRun};
use std::time::Instant;
use tracing::{info, warn};

/// Winner of a harness run
#[derive(Debug, Clone, PartialEq)]
pub struct BestModel {
    pub model_id: String,
    pub metric: RankingMetric,
    pub score: f64,
}

/// Everything a harness run produced
#[derive(Debug)]
pub struct HarnessOutcome {
    pub run: TrainingRun,
    /// `None` when every model failed
    pub best: Option<BestModel>,
    /// Per-model persistence results; empty when persistence is disabled
    pub artifacts: Vec<SavedArtifact>,
    /// Set when the output directory itself could not be prepared
    pub artifacts_error: Option<HarnessError>,
    pub report: String,
    pub total_time_secs: f64,
}

impl HarnessOutcome {
    pub fn reports(&self) -> &[MetricReport] {
        self.run.reports()
    }

    /// The selected model, or `NoViableModel` when nothing trained
    pub fn best(&self) -> Result<&BestModel> {
        self.best.as_ref().ok_or_else(|| {
            HarnessError::NoViableModel(format!(
                "all {} registered models failed to train",
                self.run.reports().len()
            ))
        })
    }

    pub fn n_saved(&self) -> usize {
        self.artifacts.iter().filter(|a| a.result.is_ok()).count()
    }
}

/// Runs a complete comparison from a configuration
#[derive(Debug, Clone)]
pub struct Harness {
    config: HarnessConfig,
    persist: bool,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            persist: true,
        }
    }

    /// Skip writing artifacts
    pub fn without_persistence(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Split `dataset`, train every configured model, select, persist and render.
    ///
    /// Configuration, shape and split errors abort the run. Model failures are
    /// recorded in the reports; an all-failed run yields `best == None`. A
    /// persistence failure is kept in `artifacts_error` and does not discard
    /// the reports.
    pub fn run(&self, dataset: &Dataset) -> Result<HarnessOutcome> {
        let start = Instant::now();
        self.config.validate()?;
        let registry = self.config.to_registry()?;

        let (train, test) = self.config.splitter().split(dataset)?;
        info!(
            n_train = train.n_samples(),
            n_test = test.n_samples(),
            n_features = dataset.n_features(),
            "Split dataset"
        );

        let orchestrator = TrainingOrchestrator::new(self.config.orchestrator_config());
        let run = orchestrator.run(&registry, &train, &test)?;

        let selector = ModelSelector::new(self.config.ranking_metric);
        let generator = ReportGenerator::new();
        let (best, report) = match selector.select(&run) {
            Ok(selection) => {
                let report = generator.render_with_selection(run.reports(), &selection);
                let best = BestModel {
                    model_id: selection.model_id.to_string(),
                    metric: selection.metric,
                    score: selection.score,
                };
                (Some(best), report)
            }
            Err(e) => {
                warn!(error = %e, "No model selected");
                (None, generator.render(run.reports()))
            }
        };

        let (artifacts, artifacts_error) = if self.persist {
            let store = ArtifactStore::new(self.config.output_dir.clone())
                .with_format(self.config.artifact_format);
            match store.save_all(&run) {
                Ok(saved) => (saved, None),
                Err(e) => {
                    // Reports and selection stay valid without artifacts
                    warn!(error = %e, "Persistence step failed");
                    (Vec::new(), Some(e))
                }
            }
        } else {
            (Vec::new(), None)
        };

        let total_time_secs = start.elapsed().as_secs_f64();
        info!(
            models = run.reports().len(),
            failed = run.n_failed(),
            saved = artifacts.iter().filter(|a| a.result.is_ok()).count(),
            total_time_secs,
            "Harness run complete"
        );

        Ok(HarnessOutcome {
            run,
            best,
            artifacts,
            artifacts_error,
            report,
            total_time_secs,
        })
    }
}
