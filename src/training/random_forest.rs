//! Random Forest classifier

use super::decision_tree::{normalize_importances, Criterion, MaxFeatures, Tree, TreeParams};
use super::models::{
    argmax, check_fit_input, check_predict_input, decode_argmax, to_bincode, Classifier,
    LabelEncoder,
};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split (sqrt by default)
    pub max_features: MaxFeatures,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Compute the out-of-bag accuracy after fit
    pub oob_score: bool,
    pub criterion: Criterion,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            oob_score: false,
            criterion: Criterion::Gini,
        }
    }
}

impl RandomForestConfig {
    fn params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            criterion: self.criterion,
        }
    }
}

/// Bagged ensemble of CART trees with per-split feature subsampling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: RandomForestConfig,
    random_state: u64,
    encoder: LabelEncoder,
    trees: Vec<Tree>,
    n_features: usize,
    oob_score_value: Option<f64>,
    feature_importances: Option<Array1<f64>>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(RandomForestConfig::default())
    }
}

impl RandomForest {
    pub fn new(config: RandomForestConfig) -> Self {
        Self {
            config,
            random_state: 42,
            encoder: LabelEncoder::default(),
            trees: Vec::new(),
            n_features: 0,
            oob_score_value: None,
            feature_importances: None,
        }
    }

    /// Create a forest with `n_estimators` trees and default settings
    pub fn with_estimators(n_estimators: usize) -> Self {
        Self::new(RandomForestConfig {
            n_estimators,
            ..Default::default()
        })
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Out-of-bag accuracy, when requested and at least one sample was left out
    pub fn oob_score(&self) -> Option<f64> {
        self.oob_score_value
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    /// Mean of the per-tree class proportions
    fn probabilities(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(HarnessError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;

        let k = self.encoder.n_classes();
        let n_trees = self.trees.len() as f64;
        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                let mut acc = vec![0.0; k];
                for tree in &self.trees {
                    for (c, &p) in tree.predict_row(row).iter().enumerate() {
                        acc[c] += p;
                    }
                }
                acc.into_iter().map(|v| v / n_trees).collect()
            })
            .collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), k), flat)?)
    }

    fn compute_oob_score(
        &self,
        x: &Array2<f64>,
        encoded: &[usize],
        in_bag: &[Vec<bool>],
    ) -> Option<f64> {
        let k = self.encoder.n_classes();
        let mut correct = 0usize;
        let mut counted = 0usize;

        for i in 0..x.nrows() {
            let mut acc = Array1::<f64>::zeros(k);
            let mut voters = 0;
            for (tree, bag) in self.trees.iter().zip(in_bag) {
                if bag[i] {
                    continue;
                }
                voters += 1;
                for (c, &p) in tree.predict_row(x.row(i)).iter().enumerate() {
                    acc[c] += p;
                }
            }
            if voters > 0 {
                counted += 1;
                if argmax(acc.view()) == encoded[i] {
                    correct += 1;
                }
            }
        }

        (counted > 0).then(|| correct as f64 / counted as f64)
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        if self.config.n_estimators == 0 {
            return Err(HarnessError::invalid_parameter(
                "n_estimators",
                0,
                "must be at least 1",
            ));
        }
        let params = self.config.params();
        params.validate()?;
        check_fit_input(x, y)?;

        let encoder = LabelEncoder::fit(y);
        let encoded = encoder.encode(y)?;
        let n_classes = encoder.n_classes();
        let n_samples = x.nrows();
        let bootstrap = self.config.bootstrap;
        let base_seed = self.random_state;

        // Each tree owns a seed derived from its index so the result does not
        // depend on rayon's scheduling
        let grown: Vec<(Tree, Vec<f64>, Vec<bool>)> = (0..self.config.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let mut in_bag = vec![!bootstrap; n_samples];
                let sample_indices: Vec<usize> = if bootstrap {
                    (0..n_samples)
                        .map(|_| {
                            let idx = rng.gen_range(0..n_samples);
                            in_bag[idx] = true;
                            idx
                        })
                        .collect()
                } else {
                    (0..n_samples).collect()
                };

                let mut importances = vec![0.0; x.ncols()];
                let tree = Tree::grow_classification(
                    x,
                    &encoded,
                    n_classes,
                    sample_indices,
                    &params,
                    &mut rng,
                    &mut importances,
                );
                (tree, importances, in_bag)
            })
            .collect();

        let mut total_importances = vec![0.0; x.ncols()];
        let mut trees = Vec::with_capacity(grown.len());
        let mut bags = Vec::with_capacity(grown.len());
        for (tree, importances, in_bag) in grown {
            let normalized = normalize_importances(importances);
            for (total, imp) in total_importances.iter_mut().zip(normalized.iter()) {
                *total += imp;
            }
            trees.push(tree);
            bags.push(in_bag);
        }

        self.encoder = encoder;
        self.trees = trees;
        self.n_features = x.ncols();
        self.feature_importances = Some(normalize_importances(total_importances));
        self.oob_score_value = if self.config.oob_score && bootstrap {
            self.compute_oob_score(x, &encoded, &bags)
        } else {
            None
        };

        tracing::debug!(
            n_trees = self.trees.len(),
            oob_score = ?self.oob_score_value,
            "Random forest fitted"
        );
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let probs = self.probabilities(x)?;
        Ok(decode_argmax(&probs, &self.encoder))
    }

    fn predict_score(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.probabilities(x).map(Some)
    }

    fn classes(&self) -> &[i64] {
        self.encoder.classes()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        to_bincode(self)
    }
}
