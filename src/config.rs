//! Harness configuration
//!
//! A run is described by a single JSON document: split settings, cross-validation
//! and selection settings, persistence settings and the ordered list of models
//! to compare. There are no built-in model entries.

use crate::artifacts::ArtifactFormat;
use crate::error::{HarnessError, Result};
use crate::metrics::ScoringMetric;
use crate::selection::RankingMetric;
use crate::split::DatasetSplitter;
use crate::training::{ModelFamily, ModelRegistry, ModelSpec, OrchestratorConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

fn default_seed() -> u64 {
    42
}

/// One model to train: identifier, seed and family hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub family: ModelFamily,
}

impl ModelEntry {
    pub fn new(id: impl Into<String>, family: ModelFamily) -> Self {
        Self {
            id: id.into(),
            seed: default_seed(),
            family,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Complete description of a harness run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Fraction of samples held out for evaluation
    pub test_fraction: f64,
    /// Seed of the stratified split
    pub split_seed: u64,
    pub cv_folds: usize,
    pub cv_scoring: ScoringMetric,
    /// Metric used to pick the best model
    pub ranking_metric: RankingMetric,
    pub parallel: bool,
    pub n_threads: Option<usize>,
    pub output_dir: PathBuf,
    pub artifact_format: ArtifactFormat,
    /// Models in comparison order
    pub models: Vec<ModelEntry>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            split_seed: 42,
            cv_folds: 5,
            cv_scoring: ScoringMetric::Accuracy,
            ranking_metric: RankingMetric::F1,
            parallel: true,
            n_threads: None,
            output_dir: PathBuf::from("models"),
            artifact_format: ArtifactFormat::Binary,
            models: Vec::new(),
        }
    }
}

impl HarnessConfig {
    pub fn with_test_fraction(mut self, test_fraction: f64) -> Self {
        self.test_fraction = test_fraction;
        self
    }

    pub fn with_split_seed(mut self, seed: u64) -> Self {
        self.split_seed = seed;
        self
    }

    pub fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = cv_folds;
        self
    }

    pub fn with_cv_scoring(mut self, scoring: ScoringMetric) -> Self {
        self.cv_scoring = scoring;
        self
    }

    pub fn with_ranking_metric(mut self, metric: RankingMetric) -> Self {
        self.ranking_metric = metric;
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

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_artifact_format(mut self, format: ArtifactFormat) -> Self {
        self.artifact_format = format;
        self
    }

    pub fn with_model(mut self, entry: ModelEntry) -> Self {
        self.models.push(entry);
        self
    }

    /// Read and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            HarnessError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            HarnessError::ConfigError(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(HarnessError::ConfigError(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.cv_folds < 2 {
            return Err(HarnessError::ConfigError(format!(
                "cv_folds must be at least 2, got {}",
                self.cv_folds
            )));
        }
        if self.n_threads == Some(0) {
            return Err(HarnessError::ConfigError(
                "n_threads must be positive".to_string(),
            ));
        }
        if self.models.is_empty() {
            return Err(HarnessError::ConfigError(
                "no models configured".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for entry in &self.models {
            if entry.id.trim().is_empty() {
                return Err(HarnessError::ConfigError(
                    "model identifiers must not be empty".to_string(),
                ));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(HarnessError::DuplicateModel(entry.id.clone()));
            }
        }
        Ok(())
    }

    /// Registry holding the configured models in file order
    pub fn to_registry(&self) -> Result<ModelRegistry> {
        let mut registry = ModelRegistry::new();
        for entry in &self.models {
            registry.register(ModelSpec::from_family(
                entry.id.clone(),
                entry.family.clone(),
                entry.seed,
            ))?;
        }
        Ok(registry)
    }

    pub fn splitter(&self) -> DatasetSplitter {
        DatasetSplitter::new(self.test_fraction).with_seed(self.split_seed)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            cv_folds: self.cv_folds,
            scoring: self.cv_scoring,
            parallel: self.parallel,
            n_threads: self.n_threads,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{KnnConfig, RandomForestConfig};

    fn sample() -> HarnessConfig {
        HarnessConfig::default()
            .with_model(ModelEntry::new(
                "rf",
                ModelFamily::RandomForest(RandomForestConfig::default()),
            ))
            .with_model(ModelEntry::new("knn", ModelFamily::Knn(KnnConfig::default())).with_seed(7))
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.split_seed, 42);
        assert_eq!(config.cv_folds, 5);
        assert_eq!(config.ranking_metric, RankingMetric::F1);
        assert_eq!(config.output_dir, PathBuf::from("models"));
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_empty_model_list_rejected() {
        assert!(matches!(
            HarnessConfig::default().validate(),
            Err(HarnessError::ConfigError(_))
        ));
    }

    #[test]
    fn test_validate_ranges() {
        assert!(sample().validate().is_ok());
        assert!(sample().with_test_fraction(1.0).validate().is_err());
        assert!(sample().with_test_fraction(0.0).validate().is_err());
        assert!(sample().with_cv_folds(1).validate().is_err());
        assert!(sample().with_n_threads(0).validate().is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let config = sample().with_model(ModelEntry::new("rf", ModelFamily::Knn(KnnConfig::default())));
        assert!(matches!(config.validate(), Err(HarnessError::DuplicateModel(id)) if id == "rf"));
    }

    #[test]
    fn test_registry_keeps_file_order_and_seeds() {
        let registry = sample().to_registry().unwrap();
        assert_eq!(registry.ids(), vec!["rf", "knn"]);
        assert_eq!(registry.get("rf").unwrap().seed(), 42);
        assert_eq!(registry.get("knn").unwrap().seed(), 7);
    }

    #[test]
    fn test_parse_partial_json() {
        let json = r#"{
            "cv_folds": 3,
            "ranking_metric": "cv_mean",
            "models": [
                {"id": "tree", "family": {"type": "decision_tree", "max_depth": 4}}
            ]
        }"#;
        let config: HarnessConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cv_folds, 3);
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.ranking_metric, RankingMetric::CvMean);
        assert_eq!(config.models[0].seed, 42);
        assert_eq!(config.models[0].family.name(), "decision_tree");

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.cv_folds, 3);
        assert!(orchestrator.parallel);
    }
}
