//! Model registry
//!
//! The registry is an explicit, ordered list of model specifications supplied
//! by the caller. Registration order drives iteration, reporting and
//! selection tie-breaking.

use super::decision_tree::{DecisionTree, DecisionTreeConfig};
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
use super::knn::{KnnClassifier, KnnConfig};
use super::logistic::{LogisticRegression, LogisticRegressionConfig};
use super::models::Classifier;
use super::naive_bayes::{GaussianNaiveBayes, NaiveBayesConfig};
use super::neural_network::{MlpClassifier, MlpConfig};
use super::random_forest::{RandomForest, RandomForestConfig};
use super::svm::{SvmClassifier, SvmConfig};
use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Built-in model families with their hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelFamily {
    LogisticRegression(LogisticRegressionConfig),
    GaussianNaiveBayes(NaiveBayesConfig),
    Knn(KnnConfig),
    DecisionTree(DecisionTreeConfig),
    RandomForest(RandomForestConfig),
    GradientBoosting(GradientBoostingConfig),
    Svm(SvmConfig),
    NeuralNetwork(MlpConfig),
}

impl ModelFamily {
    /// Fresh, untrained instance; stochastic families are seeded with `seed`
    pub fn build(&self, seed: u64) -> Box<dyn Classifier> {
        match self {
            ModelFamily::LogisticRegression(c) => Box::new(LogisticRegression::new(c.clone())),
            ModelFamily::GaussianNaiveBayes(c) => Box::new(GaussianNaiveBayes::new(c.clone())),
            ModelFamily::Knn(c) => Box::new(KnnClassifier::new(c.clone())),
            ModelFamily::DecisionTree(c) => {
                Box::new(DecisionTree::new(c.clone()).with_random_state(seed))
            }
            ModelFamily::RandomForest(c) => {
                Box::new(RandomForest::new(c.clone()).with_random_state(seed))
            }
            ModelFamily::GradientBoosting(c) => {
                Box::new(GradientBoostingClassifier::new(c.clone()).with_random_state(seed))
            }
            ModelFamily::Svm(c) => Box::new(SvmClassifier::new(c.clone()).with_random_state(seed)),
            ModelFamily::NeuralNetwork(c) => {
                Box::new(MlpClassifier::new(c.clone()).with_random_state(seed))
            }
        }
    }

    /// Family name, matching [`Classifier::name`] of the built model
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::LogisticRegression(_) => "logistic_regression",
            ModelFamily::GaussianNaiveBayes(_) => "gaussian_naive_bayes",
            ModelFamily::Knn(_) => "knn",
            ModelFamily::DecisionTree(_) => "decision_tree",
            ModelFamily::RandomForest(_) => "random_forest",
            ModelFamily::GradientBoosting(_) => "gradient_boosting",
            ModelFamily::Svm(_) => "svm",
            ModelFamily::NeuralNetwork(_) => "neural_network",
        }
    }
}

type Builder = Arc<dyn Fn(u64) -> Box<dyn Classifier> + Send + Sync>;

/// Identifier, seeded constructor and seed for one registry entry
#[derive(Clone)]
pub struct ModelSpec {
    id: String,
    seed: u64,
    builder: Builder,
}

impl ModelSpec {
    /// Spec backed by an arbitrary constructor
    pub fn new<F>(id: impl Into<String>, seed: u64, builder: F) -> Self
    where
        F: Fn(u64) -> Box<dyn Classifier> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            seed,
            builder: Arc::new(builder),
        }
    }

    /// Spec for one of the built-in families
    pub fn from_family(id: impl Into<String>, family: ModelFamily, seed: u64) -> Self {
        Self::new(id, seed, move |s| family.build(s))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Construct a fresh, untrained model with this spec's seed
    pub fn build(&self) -> Box<dyn Classifier> {
        (self.builder)(self.seed)
    }
}

impl fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("id", &self.id)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

/// Ordered mapping from identifier to [`ModelSpec`]
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    specs: Vec<ModelSpec>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a spec; identifiers must be unique
    pub fn register(&mut self, spec: ModelSpec) -> Result<()> {
        if self.get(spec.id()).is_some() {
            return Err(HarnessError::DuplicateModel(spec.id().to_string()));
        }
        self.specs.push(spec);
        Ok(())
    }

    /// Builder-style [`ModelRegistry::register`]
    pub fn with(mut self, spec: ModelSpec) -> Result<Self> {
        self.register(spec)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|s| s.id() == id)
    }

    /// Registration position of `id`
    pub fn position(&self, id: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.id() == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModelSpec> {
        self.specs.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl<'a> IntoIterator for &'a ModelRegistry {
    type Item = &'a ModelSpec;
    type IntoIter = std::slice::Iter<'a, ModelSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_preserves_order() {
        let registry = ModelRegistry::new()
            .with(ModelSpec::from_family(
                "zeta",
                ModelFamily::Knn(KnnConfig::default()),
                1,
            ))
            .unwrap()
            .with(ModelSpec::from_family(
                "alpha",
                ModelFamily::GaussianNaiveBayes(NaiveBayesConfig::default()),
                2,
            ))
            .unwrap();

        assert_eq!(registry.ids(), vec!["zeta", "alpha"]);
        assert_eq!(registry.position("alpha"), Some(1));
        assert_eq!(registry.get("zeta").unwrap().seed(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = ModelRegistry::new();
        let spec = ModelSpec::from_family("rf", ModelFamily::RandomForest(Default::default()), 42);
        registry.register(spec.clone()).unwrap();
        assert!(matches!(
            registry.register(spec),
            Err(HarnessError::DuplicateModel(id)) if id == "rf"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_family_build_names_match() {
        let families = vec![
            ModelFamily::LogisticRegression(Default::default()),
            ModelFamily::GaussianNaiveBayes(Default::default()),
            ModelFamily::Knn(Default::default()),
            ModelFamily::DecisionTree(Default::default()),
            ModelFamily::RandomForest(Default::default()),
            ModelFamily::GradientBoosting(Default::default()),
            ModelFamily::Svm(Default::default()),
            ModelFamily::NeuralNetwork(Default::default()),
        ];
        for family in families {
            assert_eq!(family.build(0).name(), family.name());
        }
    }

    #[test]
    fn test_family_from_json() {
        let family: ModelFamily =
            serde_json::from_str(r#"{"type": "random_forest", "n_estimators": 10}"#).unwrap();
        match family {
            ModelFamily::RandomForest(config) => {
                assert_eq!(config.n_estimators, 10);
                assert!(config.bootstrap);
            }
            other => panic!("unexpected family {:?}", other),
        }

        let svm: ModelFamily =
            serde_json::from_str(r#"{"type": "svm", "kernel": {"rbf": {"gamma": 0.5}}}"#).unwrap();
        assert_eq!(
            svm,
            ModelFamily::Svm(SvmConfig {
                kernel: super::super::svm::KernelType::Rbf { gamma: Some(0.5) },
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_custom_builder_receives_seed() {
        let spec = ModelSpec::new("custom", 99, |seed| {
            Box::new(DecisionTree::default().with_random_state(seed))
        });
        assert_eq!(spec.build().name(), "decision_tree");
        assert_eq!(format!("{:?}", spec), "ModelSpec { id: \"custom\", seed: 99, .. }");
    }
}
