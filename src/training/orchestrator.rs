//! Training orchestration
//!
//! For every registry entry the orchestrator builds a fresh model from the
//! spec's seed, fits it on the training subset, scores it on the held-out
//! subset and runs stratified cross-validation on the training subset alone.
//! A failure anywhere in that cycle is confined to its own [`MetricReport`].

use super::cross_validation::{cross_val_score, CVResults, CrossValidator};
use super::models::TrainedModel;
use super::registry::{ModelRegistry, ModelSpec};
use crate::dataset::Dataset;
use crate::error::{HarnessError, Result};
use crate::metrics::{roc_auc, AveragePolicy, HoldoutMetrics, MetricsCollector, ScoringMetric};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{info, warn};

/// Orchestration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Folds for cross-validation on the training subset
    pub cv_folds: usize,
    /// Metric averaged across folds
    pub scoring: ScoringMetric,
    /// Multiclass averaging for precision/recall/F1
    pub average: AveragePolicy,
    /// Train registry entries concurrently
    pub parallel: bool,
    /// Worker threads; `None` uses the global rayon pool
    pub n_threads: Option<usize>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cv_folds: 5,
            scoring: ScoringMetric::Accuracy,
            average: AveragePolicy::Weighted,
            parallel: true,
            n_threads: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringMetric) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }
}

/// Outcome of one registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelStatus {
    Trained,
    Failed { reason: String },
}

/// Evaluation record for one registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub model_id: String,
    pub model_type: String,
    pub status: ModelStatus,
    /// Held-out metrics; zeroed for failed models
    pub metrics: HoldoutMetrics,
    pub cv_scoring: ScoringMetric,
    pub cv_mean: f64,
    pub cv_std: f64,
    pub cv_scores: Vec<f64>,
    pub training_time_secs: f64,
    pub n_train: usize,
    pub n_test: usize,
}

impl MetricReport {
    fn failed(
        model_id: &str,
        model_type: &str,
        reason: String,
        scoring: ScoringMetric,
        n_train: usize,
        n_test: usize,
    ) -> Self {
        Self {
            model_id: model_id.to_string(),
            model_type: model_type.to_string(),
            status: ModelStatus::Failed { reason },
            metrics: HoldoutMetrics::zeroed(),
            cv_scoring: scoring,
            cv_mean: 0.0,
            cv_std: 0.0,
            cv_scores: Vec::new(),
            training_time_secs: 0.0,
            n_train,
            n_test,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ModelStatus::Failed { .. })
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ModelStatus::Failed { reason } => Some(reason),
            ModelStatus::Trained => None,
        }
    }
}

/// Reports and fitted models of one orchestration run, in registry order
#[derive(Debug, Default)]
pub struct TrainingRun {
    reports: Vec<MetricReport>,
    models: Vec<TrainedModel>,
}

impl TrainingRun {
    pub fn reports(&self) -> &[MetricReport] {
        &self.reports
    }

    /// Successfully trained models only
    pub fn models(&self) -> &[TrainedModel] {
        &self.models
    }

    pub fn model(&self, id: &str) -> Option<&TrainedModel> {
        self.models.iter().find(|m| m.id() == id)
    }

    pub fn report(&self, id: &str) -> Option<&MetricReport> {
        self.reports.iter().find(|r| r.model_id == id)
    }

    /// Remove and return a trained model, handing over ownership
    pub fn take_model(&mut self, id: &str) -> Option<TrainedModel> {
        let pos = self.models.iter().position(|m| m.id() == id)?;
        Some(self.models.remove(pos))
    }

    pub fn n_failed(&self) -> usize {
        self.reports.iter().filter(|r| r.is_failed()).count()
    }

    pub fn into_parts(self) -> (Vec<MetricReport>, Vec<TrainedModel>) {
        (self.reports, self.models)
    }
}

/// Drives the fit/evaluate/cross-validate cycle over a registry
#[derive(Debug, Clone, Default)]
pub struct TrainingOrchestrator {
    config: OrchestratorConfig,
}

impl TrainingOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Train and evaluate every registry entry.
    ///
    /// Only input problems (mismatched train/test shapes, an empty registry or
    /// an unusable thread configuration) are returned as errors; model
    /// failures become failed reports.
    pub fn run(&self, registry: &ModelRegistry, train: &Dataset, test: &Dataset) -> Result<TrainingRun> {
        if registry.is_empty() {
            return Err(HarnessError::ConfigError("model registry is empty".to_string()));
        }
        if train.n_features() != test.n_features() {
            return Err(HarnessError::ShapeMismatch {
                expected: format!("{} test features", train.n_features()),
                actual: format!("{} test features", test.n_features()),
            });
        }
        if self.config.cv_folds < 2 {
            return Err(HarnessError::invalid_parameter(
                "cv_folds",
                self.config.cv_folds,
                "must be at least 2",
            ));
        }

        info!(
            n_models = registry.len(),
            n_train = train.n_samples(),
            n_test = test.n_samples(),
            cv_folds = self.config.cv_folds,
            parallel = self.config.parallel,
            "Starting training run"
        );

        let specs: Vec<&ModelSpec> = registry.iter().collect();
        let outcomes: Vec<(MetricReport, Option<TrainedModel>)> = if self.config.parallel {
            let pool = match self.config.n_threads {
                Some(n) => Some(
                    rayon::ThreadPoolBuilder::new()
                        .num_threads(n)
                        .build()
                        .map_err(|e| HarnessError::ConfigError(format!("Thread pool error: {}", e)))?,
                ),
                None => None,
            };
            // Collecting an indexed parallel iterator keeps registry order
            let train_all = || {
                specs
                    .par_iter()
                    .map(|spec| self.train_one(spec, train, test))
                    .collect::<Vec<_>>()
            };
            match pool {
                Some(pool) => pool.install(train_all),
                None => train_all(),
            }
        } else {
            specs.iter().map(|spec| self.train_one(spec, train, test)).collect()
        };

        let mut run = TrainingRun::default();
        for (report, model) in outcomes {
            run.reports.push(report);
            if let Some(model) = model {
                run.models.push(model);
            }
        }

        info!(
            trained = run.models.len(),
            failed = run.n_failed(),
            "Training run finished"
        );
        Ok(run)
    }

    /// One registry entry; panics inside the model are recorded like errors
    fn train_one(
        &self,
        spec: &ModelSpec,
        train: &Dataset,
        test: &Dataset,
    ) -> (MetricReport, Option<TrainedModel>) {
        let mut model_type = None;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.evaluate_spec(spec, train, test, &mut model_type)
        }));

        let reason = match outcome {
            Ok(Ok((report, model))) => {
                info!(
                    model = %spec.id(),
                    accuracy = report.metrics.accuracy,
                    f1 = report.metrics.f1,
                    cv_mean = report.cv_mean,
                    cv_std = report.cv_std,
                    secs = report.training_time_secs,
                    "Model trained"
                );
                return (report, Some(model));
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        let error = HarnessError::ModelFit {
            model: spec.id().to_string(),
            reason: reason.clone(),
        };
        warn!(model = %spec.id(), error = %error, "Model failed");

        // A builder that panicked never produced a model to name
        (
            MetricReport::failed(
                spec.id(),
                model_type.unwrap_or("unknown"),
                reason,
                self.config.scoring,
                train.n_samples(),
                test.n_samples(),
            ),
            None,
        )
    }

    fn evaluate_spec(
        &self,
        spec: &ModelSpec,
        train: &Dataset,
        test: &Dataset,
        built_type: &mut Option<&'static str>,
    ) -> Result<(MetricReport, TrainedModel)> {
        let collector = MetricsCollector::new(self.config.average);
        info!(model = %spec.id(), seed = spec.seed(), "Training model");

        let mut model = spec.build();
        let model_type = model.name();
        *built_type = Some(model_type);
        let start = Instant::now();
        model.fit(train.features(), train.labels())?;
        let training_time_secs = start.elapsed().as_secs_f64();

        let predictions = model.predict(test.features())?;
        let mut metrics = collector.evaluate(test.labels(), &predictions)?;
        metrics.roc_auc = binary_roc_auc(model.as_ref(), test)?;

        let validator = CrossValidator::stratified(self.config.cv_folds).with_random_state(spec.seed());
        let cv: CVResults = cross_val_score(
            || spec.build(),
            train,
            &validator,
            self.config.scoring,
            &collector,
        )?;

        let report = MetricReport {
            model_id: spec.id().to_string(),
            model_type: model_type.to_string(),
            status: ModelStatus::Trained,
            metrics,
            cv_scoring: self.config.scoring,
            cv_mean: cv.mean_score,
            cv_std: cv.std_score,
            cv_scores: cv.scores,
            training_time_secs,
            n_train: train.n_samples(),
            n_test: test.n_samples(),
        };
        Ok((report, TrainedModel::new(spec.id(), model)))
    }
}

/// ROC-AUC of the higher class label when the model is binary and scores
fn binary_roc_auc(
    model: &dyn super::models::Classifier,
    test: &Dataset,
) -> Result<Option<f64>> {
    let classes = model.classes();
    if classes.len() != 2 {
        return Ok(None);
    }
    let scores = match model.predict_score(test.features())? {
        Some(scores) => scores,
        None => return Ok(None),
    };
    Ok(roc_auc(test.labels(), scores.column(1), classes[1]))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::Classifier;
    use crate::training::registry::ModelFamily;
    use crate::training::logistic::LogisticRegressionConfig;
    use ndarray::{Array1, Array2};

    fn separable(n: usize) -> Dataset {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let offset = if i % 2 == 0 { 0.0 } else { 10.0 };
                vec![offset + (i % 7) as f64 * 0.1, offset - (i % 5) as f64 * 0.1]
            })
            .collect();
        let labels = (0..n).map(|i| (i % 2) as i64).collect();
        Dataset::from_rows(rows, labels).unwrap()
    }

    #[derive(Debug)]
    struct Panicking;

    impl Classifier for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<i64>) -> Result<()> {
            panic!("boom")
        }
        fn predict(&self, _x: &Array2<f64>) -> Result<Array1<i64>> {
            Err(HarnessError::ModelNotFitted)
        }
        fn classes(&self) -> &[i64] {
            &[]
        }
        fn to_bytes(&self) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::new()
            .with(ModelSpec::from_family(
                "logreg",
                ModelFamily::LogisticRegression(Default::default()),
                42,
            ))
            .unwrap()
            .with(ModelSpec::from_family(
                "broken",
                ModelFamily::LogisticRegression(LogisticRegressionConfig {
                    learning_rate: -1.0,
                    ..Default::default()
                }),
                42,
            ))
            .unwrap()
            .with(ModelSpec::new("panics", 0, |_| Box::new(Panicking)))
            .unwrap()
    }

    #[test]
    fn test_failures_are_isolated() {
        let train = separable(40);
        let test = separable(10);
        for parallel in [true, false] {
            let orchestrator =
                TrainingOrchestrator::new(OrchestratorConfig::default().with_parallel(parallel));
            let run = orchestrator.run(&registry(), &train, &test).unwrap();

            let ids: Vec<&str> = run.reports().iter().map(|r| r.model_id.as_str()).collect();
            assert_eq!(ids, vec!["logreg", "broken", "panics"]);
            assert_eq!(run.models().len(), 1);
            assert_eq!(run.n_failed(), 2);

            let ok = run.report("logreg").unwrap();
            assert_eq!(ok.status, ModelStatus::Trained);
            assert_eq!(ok.metrics.accuracy, 1.0);
            assert_eq!(ok.cv_scores.len(), 5);
            assert_eq!(ok.metrics.roc_auc, Some(1.0));

            let broken = run.report("broken").unwrap();
            assert!(broken.failure_reason().unwrap().contains("learning_rate"));
            assert_eq!(broken.metrics, HoldoutMetrics::zeroed());

            let panicked = run.report("panics").unwrap();
            assert!(panicked.failure_reason().unwrap().contains("boom"));
            assert_eq!(panicked.model_type, "panicking");
        }
    }

    #[test]
    fn test_panicking_builder_is_isolated() {
        let train = separable(40);
        let test = separable(10);
        let registry = ModelRegistry::new()
            .with(ModelSpec::from_family(
                "nb",
                ModelFamily::GaussianNaiveBayes(Default::default()),
                42,
            ))
            .unwrap()
            .with(ModelSpec::new("bad_builder", 0, |_| panic!("builder exploded")))
            .unwrap();

        for parallel in [false, true] {
            let orchestrator =
                TrainingOrchestrator::new(OrchestratorConfig::default().with_parallel(parallel));
            let run = orchestrator.run(&registry, &train, &test).unwrap();

            assert_eq!(run.reports().len(), 2);
            assert_eq!(run.report("nb").unwrap().status, ModelStatus::Trained);

            let bad = run.report("bad_builder").unwrap();
            assert!(bad.is_failed());
            assert_eq!(bad.model_type, "unknown");
            assert!(bad.failure_reason().unwrap().contains("builder exploded"));
            assert!(run.model("bad_builder").is_none());
        }
    }

    #[test]
    fn test_dedicated_thread_pool() {
        let orchestrator = TrainingOrchestrator::new(OrchestratorConfig::default().with_n_threads(2));
        let run = orchestrator
            .run(&registry(), &separable(30), &separable(10))
            .unwrap();
        assert_eq!(run.reports().len(), 3);
        assert!(run.model("logreg").is_some());
    }

    #[test]
    fn test_feature_mismatch_is_fatal() {
        let train = separable(20);
        let test = Dataset::from_rows(vec![vec![0.0]; 4], vec![0, 1, 0, 1]).unwrap();
        let result = TrainingOrchestrator::default().run(&registry(), &train, &test);
        assert!(matches!(result, Err(HarnessError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_empty_registry_rejected() {
        let data = separable(10);
        let result = TrainingOrchestrator::default().run(&ModelRegistry::new(), &data, &data);
        assert!(matches!(result, Err(HarnessError::ConfigError(_))));
    }

    #[test]
    fn test_take_model_hands_over_ownership() {
        let mut run = TrainingOrchestrator::default()
            .run(&registry(), &separable(30), &separable(10))
            .unwrap();
        let model = run.take_model("logreg").unwrap();
        assert_eq!(model.model_type(), "logistic_regression");
        assert!(run.model("logreg").is_none());
        assert!(run.report("logreg").is_some());
    }
}
