//! Cross-validation splitting and scoring

use super::models::Classifier;
use crate::dataset::Dataset;
use crate::error::{HarnessError, Result};
use crate::metrics::{MetricsCollector, ScoringMetric};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold {
            n_splits: 5,
            shuffle: true,
        }
    }
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match *self {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::StratifiedKFold { n_splits, .. } => {
                n_splits
            }
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: u64,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: 0,
        }
    }

    /// Stratified, shuffled k-fold
    pub fn stratified(n_splits: usize) -> Self {
        Self::new(CVStrategy::StratifiedKFold {
            n_splits,
            shuffle: true,
        })
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn strategy(&self) -> CVStrategy {
        self.strategy
    }

    /// Generate train/test splits; every fold's test set is non-empty
    pub fn split(&self, y: &Array1<i64>) -> Result<Vec<CVSplit>> {
        let n_splits = self.strategy.n_splits();
        let n_samples = y.len();
        if n_splits < 2 {
            return Err(HarnessError::invalid_parameter(
                "n_splits",
                n_splits,
                "must be at least 2",
            ));
        }
        if n_samples < n_splits {
            return Err(HarnessError::InsufficientData(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let order: Vec<usize> = match self.strategy {
            CVStrategy::KFold { shuffle, .. } => {
                let mut indices: Vec<usize> = (0..n_samples).collect();
                if shuffle {
                    indices.shuffle(&mut rng);
                }
                indices
            }
            CVStrategy::StratifiedKFold { shuffle, .. } => {
                let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
                for (idx, &label) in y.iter().enumerate() {
                    class_indices.entry(label).or_default().push(idx);
                }
                if let Some((label, members)) =
                    class_indices.iter().find(|(_, m)| m.len() < n_splits)
                {
                    tracing::warn!(
                        class = label,
                        members = members.len(),
                        n_splits,
                        "Least populated class has fewer members than folds"
                    );
                }
                if shuffle {
                    for indices in class_indices.values_mut() {
                        indices.shuffle(&mut rng);
                    }
                }
                // Class-grouped order dealt round-robin keeps every fold's
                // class mix within one sample of the overall proportions
                class_indices.into_values().flatten().collect()
            }
        };

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        match self.strategy {
            CVStrategy::KFold { .. } => {
                let base = n_samples / n_splits;
                let remainder = n_samples % n_splits;
                let mut current = 0;
                for (fold_idx, fold) in folds.iter_mut().enumerate() {
                    let size = if fold_idx < remainder { base + 1 } else { base };
                    fold.extend_from_slice(&order[current..current + size]);
                    current += size;
                }
            }
            CVStrategy::StratifiedKFold { .. } => {
                for (position, idx) in order.into_iter().enumerate() {
                    folds[position % n_splits].push(idx);
                }
            }
        }

        let splits = (0..n_splits)
            .map(|fold_idx| {
                let mut test_indices = folds[fold_idx].clone();
                test_indices.sort_unstable();
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();
                CVSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect();

        Ok(splits)
    }
}

/// Results from cross-validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Population standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        if n_folds == 0 {
            return Self {
                scores,
                mean_score: 0.0,
                std_score: 0.0,
                n_folds,
            };
        }
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance =
            scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;
        let std_score = variance.sqrt();

        Self {
            scores,
            mean_score,
            std_score,
            n_folds,
        }
    }
}

/// Fit a fresh model on every fold's training rows and score it on the
/// fold's held-out rows. Any fold failure fails the whole evaluation.
pub fn cross_val_score<F>(
    build: F,
    dataset: &Dataset,
    validator: &CrossValidator,
    scoring: ScoringMetric,
    collector: &MetricsCollector,
) -> Result<CVResults>
where
    F: Fn() -> Box<dyn Classifier>,
{
    let splits = validator.split(dataset.labels())?;
    let mut scores = Vec::with_capacity(splits.len());

    for split in &splits {
        let train = dataset.subset(&split.train_indices);
        let test = dataset.subset(&split.test_indices);

        let mut model = build();
        model.fit(train.features(), train.labels())?;
        let predictions = model.predict(test.features())?;
        scores.push(collector.score(scoring, test.labels(), &predictions)?);
    }

    Ok(CVResults::from_scores(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::logistic::LogisticRegression;
    use ndarray::array;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold {
            n_splits: 5,
            shuffle: false,
        });
        let y = Array1::from_elem(100, 0i64);
        let splits = cv.split(&y).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_k_fold_preserves_proportions() {
        let labels: Vec<i64> = (0..30).map(|i| if i < 20 { 0 } else { 1 }).collect();
        let y = Array1::from_vec(labels);
        let cv = CrossValidator::stratified(5).with_random_state(42);
        let splits = cv.split(&y).unwrap();

        for split in &splits {
            let ones = split.test_indices.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(split.test_indices.len(), 6);
            assert_eq!(ones, 2);
            let mut covered: Vec<usize> = split
                .train_indices
                .iter()
                .chain(&split.test_indices)
                .copied()
                .collect();
            covered.sort();
            assert_eq!(covered, (0..30).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_split_is_deterministic_for_seed() {
        let y = Array1::from_vec((0..40).map(|i| i % 3).collect());
        let a = CrossValidator::stratified(4).with_random_state(9).split(&y).unwrap();
        let b = CrossValidator::stratified(4).with_random_state(9).split(&y).unwrap();
        let c = CrossValidator::stratified(4).with_random_state(10).split(&y).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalid_fold_counts() {
        let y = array![0, 1, 0, 1];
        assert!(matches!(
            CrossValidator::stratified(1).split(&y),
            Err(HarnessError::InvalidParameter { .. })
        ));
        assert!(matches!(
            CrossValidator::stratified(5).split(&y),
            Err(HarnessError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_cv_results_population_std() {
        let results = CVResults::from_scores(vec![0.8, 0.9, 1.0]);
        assert!((results.mean_score - 0.9).abs() < 1e-12);
        assert!((results.std_score - (0.02f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(results.n_folds, 3);
    }

    #[test]
    fn test_cross_val_score_on_separable_data() {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![if i < 10 { i as f64 * 0.1 } else { 5.0 + i as f64 * 0.1 }])
            .collect();
        let labels: Vec<i64> = (0..20).map(|i| (i >= 10) as i64).collect();
        let dataset = Dataset::from_rows(rows, labels).unwrap();

        let results = cross_val_score(
            || Box::new(LogisticRegression::default()),
            &dataset,
            &CrossValidator::stratified(5).with_random_state(1),
            ScoringMetric::Accuracy,
            &MetricsCollector::default(),
        )
        .unwrap();

        assert_eq!(results.n_folds, 5);
        assert_eq!(results.mean_score, 1.0);
        assert_eq!(results.std_score, 0.0);
    }
}
