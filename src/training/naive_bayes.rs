//! Gaussian Naive Bayes

use super::models::{
    check_fit_input, check_predict_input, decode_argmax, to_bincode, Classifier, LabelEncoder,
};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Gaussian Naive Bayes hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveBayesConfig {
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
}

impl Default for NaiveBayesConfig {
    fn default() -> Self {
        Self { var_smoothing: 1e-9 }
    }
}

/// Gaussian Naive Bayes classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    config: NaiveBayesConfig,
    encoder: LabelEncoder,
    /// `(n_classes, n_features)`
    means: Array2<f64>,
    /// `(n_classes, n_features)`
    variances: Array2<f64>,
    log_priors: Array1<f64>,
    n_features: usize,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new(NaiveBayesConfig::default())
    }
}

impl GaussianNaiveBayes {
    pub fn new(config: NaiveBayesConfig) -> Self {
        Self {
            config,
            encoder: LabelEncoder::default(),
            means: Array2::zeros((0, 0)),
            variances: Array2::zeros((0, 0)),
            log_priors: Array1::zeros(0),
            n_features: 0,
        }
    }

    /// Joint log-likelihood per class, `(n_samples, n_classes)`
    fn joint_log_likelihood(&self, x: &Array2<f64>) -> Array2<f64> {
        let n_classes = self.encoder.n_classes();
        let mut out = Array2::zeros((x.nrows(), n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for c in 0..n_classes {
                let log_likelihood: f64 = row
                    .iter()
                    .zip(self.means.row(c).iter())
                    .zip(self.variances.row(c).iter())
                    .map(|((&xi, &mean), &var)| {
                        -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln())
                    })
                    .sum();
                out[[i, c]] = self.log_priors[c] + log_likelihood;
            }
        }
        out
    }

    /// Normalized class probabilities via log-sum-exp
    fn probabilities(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_predict_input(x, self.n_features)?;
        let mut log_probs = self.joint_log_likelihood(x);
        for mut row in log_probs.rows_mut() {
            let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f64>().ln();
            row.mapv_inplace(|v| (v - max_val - log_sum).exp());
        }
        Ok(log_probs)
    }
}

impl Classifier for GaussianNaiveBayes {
    fn name(&self) -> &'static str {
        "gaussian_naive_bayes"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        if !(self.config.var_smoothing.is_finite() && self.config.var_smoothing >= 0.0) {
            return Err(HarnessError::invalid_parameter(
                "var_smoothing",
                self.config.var_smoothing,
                "must be >= 0",
            ));
        }
        check_fit_input(x, y)?;

        let encoder = LabelEncoder::fit(y);
        let encoded = encoder.encode(y)?;
        let n_classes = encoder.n_classes();
        let n_features = x.ncols();

        let epsilon = self.config.var_smoothing
            * x.var_axis(Axis(0), 0.0).iter().cloned().fold(0.0, f64::max);

        let mut means = Array2::zeros((n_classes, n_features));
        let mut m2 = Array2::<f64>::zeros((n_classes, n_features));
        let mut counts = vec![0usize; n_classes];

        // Welford's single-pass mean/variance per class
        for (row, &c) in x.rows().into_iter().zip(encoded.iter()) {
            counts[c] += 1;
            let n = counts[c] as f64;
            for (j, &val) in row.iter().enumerate() {
                let delta = val - means[[c, j]];
                means[[c, j]] += delta / n;
                m2[[c, j]] += delta * (val - means[[c, j]]);
            }
        }

        let mut variances = Array2::zeros((n_classes, n_features));
        for c in 0..n_classes {
            for j in 0..n_features {
                variances[[c, j]] = m2[[c, j]] / counts[c] as f64 + epsilon;
            }
        }
        if variances.iter().any(|&v| v <= 0.0) {
            // A zero-variance feature inside a class with no smoothing
            let floor = f64::EPSILON;
            variances.mapv_inplace(|v| v.max(floor));
        }

        let total = x.nrows() as f64;
        self.log_priors = counts.iter().map(|&c| (c as f64 / total).ln()).collect();
        self.encoder = encoder;
        self.means = means;
        self.variances = variances;
        self.n_features = n_features;
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
