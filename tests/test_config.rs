//! Integration test: JSON run configuration

use activity_harness::prelude::*;
use activity_harness::training::{Activation, KernelType};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn shipped_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("configs/drug_activity.json")
}

#[test]
fn test_shipped_drug_activity_config() {
    let config = HarnessConfig::load(shipped_config()).unwrap();
    assert_eq!(config.test_fraction, 0.2);
    assert_eq!(config.cv_folds, 5);
    assert_eq!(config.ranking_metric, RankingMetric::F1);

    let registry = config.to_registry().unwrap();
    assert_eq!(
        registry.ids(),
        vec!["random_forest", "svm", "neural_network", "gradient_boosting"]
    );
    assert!(registry.iter().all(|spec| spec.seed() == 42));

    for entry in &config.models {
        match &entry.family {
            ModelFamily::RandomForest(rf) => assert_eq!(rf.n_estimators, 100),
            ModelFamily::Svm(svm) => assert_eq!(svm.kernel, KernelType::Rbf { gamma: None }),
            ModelFamily::NeuralNetwork(mlp) => {
                assert_eq!(mlp.hidden_layers, vec![100, 50]);
                assert_eq!(mlp.activation, Activation::Relu);
            }
            ModelFamily::GradientBoosting(gb) => assert_eq!(gb.n_estimators, 100),
            other => panic!("unexpected family {}", other.name()),
        }
    }
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.json");

    let config = HarnessConfig::default()
        .with_split_seed(9)
        .with_cv_scoring(ScoringMetric::F1)
        .with_artifact_format(ArtifactFormat::Json)
        .with_model(ModelEntry::new("nb", ModelFamily::GaussianNaiveBayes(Default::default())));
    config.save(&path).unwrap();

    let loaded = HarnessConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_rejects_bad_files() {
    let dir = TempDir::new().unwrap();

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        HarnessConfig::load(&missing),
        Err(HarnessError::ConfigError(_))
    ));

    let malformed = dir.path().join("malformed.json");
    fs::write(&malformed, "{ \"models\": [").unwrap();
    assert!(matches!(
        HarnessConfig::load(&malformed),
        Err(HarnessError::ConfigError(_))
    ));

    let unknown_family = dir.path().join("unknown.json");
    fs::write(
        &unknown_family,
        r#"{"models": [{"id": "x", "family": {"type": "xgboost"}}]}"#,
    )
    .unwrap();
    assert!(matches!(
        HarnessConfig::load(&unknown_family),
        Err(HarnessError::ConfigError(_))
    ));

    let duplicate = dir.path().join("duplicate.json");
    fs::write(
        &duplicate,
        r#"{"models": [
            {"id": "m", "family": {"type": "knn"}},
            {"id": "m", "family": {"type": "decision_tree"}}
        ]}"#,
    )
    .unwrap();
    assert!(matches!(
        HarnessConfig::load(&duplicate),
        Err(HarnessError::DuplicateModel(id)) if id == "m"
    ));
}
