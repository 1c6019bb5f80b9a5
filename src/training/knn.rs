//! K-Nearest Neighbors classifier

use super::models::{
    argmax, check_fit_input, check_predict_input, to_bincode, Classifier, LabelEncoder,
};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-Nearest Neighbors classifier; stores the training set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnClassifier {
    config: KnnConfig,
    encoder: LabelEncoder,
    x_train: Option<Array2<f64>>,
    y_train: Vec<usize>,
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self::new(KnnConfig::default())
    }
}

impl KnnClassifier {
    pub fn new(config: KnnConfig) -> Self {
        Self {
            config,
            encoder: LabelEncoder::default(),
            x_train: None,
            y_train: Vec::new(),
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KnnConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    /// Weighted vote share per class, parallelized over query rows
    fn vote_shares(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let x_train = self.x_train.as_ref().ok_or(HarnessError::ModelNotFitted)?;
        check_predict_input(x, x_train.ncols())?;

        let n_classes = self.encoder.n_classes();
        let k = self.config.n_neighbors.min(x_train.nrows());
        let metric = self.config.metric;
        let weights = self.config.weights;

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = k_nearest(x.row(i), x_train, k, metric);
                let mut votes = vec![0.0; n_classes];
                for (idx, dist) in neighbors {
                    let w = match weights {
                        WeightScheme::Uniform => 1.0,
                        WeightScheme::Distance => 1.0 / dist.max(1e-12),
                    };
                    votes[self.y_train[idx]] += w;
                }
                let total: f64 = votes.iter().sum();
                votes.iter().map(|v| v / total).collect()
            })
            .collect();

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        Ok(Array2::from_shape_vec((x.nrows(), n_classes), flat)?)
    }
}

fn distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
    }
}

/// Indices and distances of the `k` closest training rows; ties keep training order
fn k_nearest(
    query: ArrayView1<f64>,
    x_train: &Array2<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(usize, f64)> {
    let mut dists: Vec<(usize, f64)> = x_train
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| (i, distance(query, row, metric)))
        .collect();
    dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    dists.truncate(k);
    dists
}

impl Classifier for KnnClassifier {
    fn name(&self) -> &'static str {
        "knn"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        if self.config.n_neighbors == 0 {
            return Err(HarnessError::invalid_parameter(
                "n_neighbors",
                0,
                "must be at least 1",
            ));
        }
        check_fit_input(x, y)?;

        let encoder = LabelEncoder::fit(y);
        self.y_train = encoder.encode(y)?;
        self.encoder = encoder;
        self.x_train = Some(x.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let shares = self.vote_shares(x)?;
        Ok(shares
            .rows()
            .into_iter()
            .map(|row| self.encoder.decode(argmax(row)))
            .collect())
    }

    fn predict_score(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.vote_shares(x).map(Some)
    }

    fn classes(&self) -> &[i64] {
        self.encoder.classes()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        to_bincode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn line_data() -> (Array2<f64>, Array1<i64>) {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let y = array![0, 0, 0, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_knn_predicts_nearest_cluster() {
        let (x, y) = line_data();
        let mut model = KnnClassifier::with_k(3);
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&array![[0.5], [11.5], [4.0]]).unwrap();
        assert_eq!(preds.to_vec(), vec![0, 1, 0]);
    }

    #[test]
    fn test_k_larger_than_training_set_is_capped() {
        let (x, y) = line_data();
        let mut model = KnnClassifier::with_k(50);
        model.fit(&x, &y).unwrap();
        let shares = model.predict_score(&array![[5.0]]).unwrap().unwrap();
        assert!((shares[[0, 0]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_distance_weighting() {
        let (x, y) = line_data();
        let mut model = KnnClassifier::new(KnnConfig {
            n_neighbors: 6,
            metric: DistanceMetric::Manhattan,
            weights: WeightScheme::Distance,
        });
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&array![[9.0]]).unwrap()[0], 1);
    }

    #[test]
    fn test_zero_neighbors_rejected() {
        let (x, y) = line_data();
        let mut model = KnnClassifier::with_k(0);
        assert!(matches!(
            model.fit(&x, &y),
            Err(HarnessError::InvalidParameter { .. })
        ));
    }
}
