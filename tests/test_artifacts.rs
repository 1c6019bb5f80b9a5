//! Integration test: artifact persistence

use activity_harness::artifacts::{load_artifact, restore_classifier};
use activity_harness::prelude::*;
use activity_harness::training::{DecisionTree, KnnConfig, RandomForestConfig};
use ndarray::Array2;
use std::fs;
use tempfile::TempDir;

fn dataset() -> Dataset {
    let rows: Vec<Vec<f64>> = (0..40)
        .map(|i| {
            let base = if i < 20 { 0.0 } else { 8.0 };
            vec![base + (i % 5) as f64 * 0.3, base - (i % 3) as f64 * 0.2]
        })
        .collect();
    let labels = (0..40).map(|i| if i < 20 { 0 } else { 1 }).collect();
    Dataset::from_rows(rows, labels).unwrap()
}

fn fitted_tree(max_depth: usize) -> DecisionTree {
    let data = dataset();
    let mut tree = DecisionTree::new(activity_harness::training::DecisionTreeConfig {
        max_depth: Some(max_depth),
        ..Default::default()
    });
    tree.fit(data.features(), data.labels()).unwrap();
    tree
}

fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_resave_overwrites_single_artifact() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());

    let first = store.save_classifier("tree", &fitted_tree(1)).unwrap();
    let second_model = fitted_tree(3);
    let second = store.save_classifier("tree", &second_model).unwrap();

    assert_eq!(first, second);
    assert_eq!(second, dir.path().join("tree_model.bin"));
    assert_eq!(files_in(dir.path()), vec!["tree_model.bin".to_string()]);

    let artifact = store.load("tree").unwrap();
    assert_eq!(artifact.payload, second_model.to_bytes().unwrap());
}

#[test]
fn test_directory_creation_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let store = ArtifactStore::new(&nested);

    store.ensure_dir().unwrap();
    store.ensure_dir().unwrap();
    assert!(nested.is_dir());

    std::thread::scope(|scope| {
        for i in 0..4 {
            let store = store.clone();
            scope.spawn(move || {
                let model = fitted_tree(2);
                store.save_classifier(&format!("m{}", i), &model).unwrap();
            });
        }
    });
    assert_eq!(files_in(&nested).len(), 4);
}

#[test]
fn test_harness_persists_and_restores_models() {
    let dir = TempDir::new().unwrap();
    let config = HarnessConfig::default()
        .with_cv_folds(3)
        .with_output_dir(dir.path())
        .with_artifact_format(ArtifactFormat::Json)
        .with_model(ModelEntry::new(
            "forest",
            ModelFamily::RandomForest(RandomForestConfig {
                n_estimators: 10,
                ..Default::default()
            }),
        ))
        .with_model(ModelEntry::new("knn", ModelFamily::Knn(KnnConfig::default())));

    let data = dataset();
    let outcome = Harness::new(config).run(&data).unwrap();
    assert_eq!(outcome.n_saved(), 2);
    assert_eq!(
        files_in(dir.path()),
        vec!["forest_model.json".to_string(), "knn_model.json".to_string()]
    );

    let probe = Array2::from_shape_vec((2, 2), vec![0.2, 0.1, 8.5, 7.9]).unwrap();
    for saved in &outcome.artifacts {
        let path = saved.result.as_ref().unwrap();
        let artifact = load_artifact(path).unwrap();
        assert_eq!(artifact.model_id, saved.model_id);

        let restored = restore_classifier(&artifact).unwrap();
        let original = outcome.run.model(&saved.model_id).unwrap();
        assert_eq!(restored.name(), original.model_type());
        assert_eq!(
            restored.predict(&probe).unwrap(),
            original.predict(&probe).unwrap()
        );
    }
}

#[test]
fn test_corrupted_artifact_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path()).with_format(ArtifactFormat::Json);
    let path = store.save_classifier("tree", &fitted_tree(2)).unwrap();

    let mut artifact = load_artifact(&path).unwrap();
    artifact.payload.push(0);
    fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

    assert!(matches!(
        load_artifact(&path),
        Err(HarnessError::Persistence { .. })
    ));
}

#[test]
fn test_path_like_identifiers_rejected() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    for id in ["", "..", "../escape", "a/b"] {
        assert!(matches!(
            store.save_classifier(id, &fitted_tree(1)),
            Err(HarnessError::Persistence { .. })
        ));
    }
    assert!(files_in(dir.path()).is_empty());
}
