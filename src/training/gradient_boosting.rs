//! Gradient Boosting classifier
//!
//! Multinomial deviance boosting: every round fits one least-squares
//! regression tree per class to the softmax residuals and adds its shrunken
//! output to that class's raw score.

use super::decision_tree::{normalize_importances, Criterion, MaxFeatures, Tree, TreeParams};
use super::models::{
    check_fit_input, check_predict_input, decode_argmax, softmax_rows, to_bincode, Classifier,
    LabelEncoder,
};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Gradient Boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Fraction of rows drawn (without replacement) for each round
    pub subsample: f64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
        }
    }
}

impl GradientBoostingConfig {
    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(HarnessError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(HarnessError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must be a positive finite number",
            ));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(HarnessError::invalid_parameter(
                "subsample",
                self.subsample,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: Some(self.max_depth),
            min_samples_split: 2,
            min_samples_leaf: self.min_samples_leaf,
            max_features: MaxFeatures::All,
            criterion: Criterion::Gini,
        }
    }
}

/// Gradient boosted trees for classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    random_state: u64,
    encoder: LabelEncoder,
    /// Log class priors
    initial_scores: Array1<f64>,
    /// One tree per class per round
    stages: Vec<Vec<Tree>>,
    n_features: usize,
    train_loss: Vec<f64>,
    feature_importances: Option<Array1<f64>>,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            random_state: 42,
            encoder: LabelEncoder::default(),
            initial_scores: Array1::zeros(0),
            stages: Vec::new(),
            n_features: 0,
            train_loss: Vec::new(),
            feature_importances: None,
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Training deviance after each round
    pub fn train_loss(&self) -> &[f64] {
        &self.train_loss
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Array2<f64> {
        let k = self.initial_scores.len();
        let mut scores = Array2::zeros((x.nrows(), k));
        for (i, row) in x.rows().into_iter().enumerate() {
            for c in 0..k {
                scores[[i, c]] = self.initial_scores[c];
            }
            for stage in &self.stages {
                for (c, tree) in stage.iter().enumerate() {
                    scores[[i, c]] += self.config.learning_rate * tree.predict_row(row)[0];
                }
            }
        }
        scores
    }

    fn probabilities(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stages.is_empty() {
            return Err(HarnessError::ModelNotFitted);
        }
        check_predict_input(x, self.n_features)?;
        Ok(softmax_rows(&self.raw_scores(x)))
    }
}

impl Classifier for GradientBoostingClassifier {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.config.validate()?;
        let params = self.config.tree_params();
        params.validate()?;
        check_fit_input(x, y)?;

        let encoder = LabelEncoder::fit(y);
        if encoder.n_classes() < 2 {
            return Err(HarnessError::InsufficientData(
                "gradient boosting needs at least 2 classes".to_string(),
            ));
        }
        let encoded = encoder.encode(y)?;
        let targets = encoder.one_hot(&encoded);
        let n_samples = x.nrows();
        let k = encoder.n_classes();

        let mut class_counts = vec![0.0; k];
        for &c in &encoded {
            class_counts[c] += 1.0;
        }
        let initial_scores: Array1<f64> = class_counts
            .iter()
            .map(|&count| (count / n_samples as f64).ln())
            .collect();

        let mut raw = Array2::zeros((n_samples, k));
        for mut row in raw.rows_mut() {
            row.assign(&initial_scores);
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state);
        let n_sub = ((n_samples as f64 * self.config.subsample).round() as usize).clamp(1, n_samples);
        let lr = self.config.learning_rate;
        let mut stages = Vec::with_capacity(self.config.n_estimators);
        let mut train_loss = Vec::with_capacity(self.config.n_estimators);
        let mut importances = vec![0.0; x.ncols()];

        for round in 0..self.config.n_estimators {
            let probs = softmax_rows(&raw);
            let residuals = &targets - &probs;

            let mut rows: Vec<usize> = if n_sub < n_samples {
                rand::seq::index::sample(&mut rng, n_samples, n_sub).into_vec()
            } else {
                (0..n_samples).collect()
            };
            rows.sort_unstable();
            let seeds: Vec<u64> = (0..k).map(|_| rng.gen()).collect();

            let stage: Vec<(Tree, Vec<f64>)> = (0..k)
                .into_par_iter()
                .map(|c| {
                    let target: Vec<f64> = residuals.column(c).to_vec();
                    let mut tree_rng = Xoshiro256PlusPlus::seed_from_u64(seeds[c]);
                    let mut imp = vec![0.0; x.ncols()];
                    let tree = Tree::grow_regression(
                        x,
                        &target,
                        rows.clone(),
                        &params,
                        &mut tree_rng,
                        &mut imp,
                    );
                    (tree, imp)
                })
                .collect();

            let mut trees = Vec::with_capacity(k);
            for (c, (tree, imp)) in stage.into_iter().enumerate() {
                for (total, v) in importances.iter_mut().zip(&imp) {
                    *total += v;
                }
                for (i, row) in x.rows().into_iter().enumerate() {
                    raw[[i, c]] += lr * tree.predict_row(row)[0];
                }
                trees.push(tree);
            }
            stages.push(trees);

            let probs = softmax_rows(&raw);
            let loss = -(&probs.mapv(|p| p.max(1e-15).ln()) * &targets).sum() / n_samples as f64;
            if !loss.is_finite() {
                return Err(HarnessError::ConvergenceError {
                    iterations: round + 1,
                });
            }
            train_loss.push(loss);
        }

        tracing::debug!(
            rounds = stages.len(),
            final_loss = train_loss.last().copied().unwrap_or(f64::NAN),
            "Gradient boosting fitted"
        );

        self.encoder = encoder;
        self.initial_scores = initial_scores;
        self.stages = stages;
        self.n_features = x.ncols();
        self.train_loss = train_loss;
        self.feature_importances = Some(normalize_importances(importances));
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
