//! Multinomial logistic regression
//!
//! Softmax regression trained with full-batch gradient descent on standardized
//! features. Binary problems are the two-class case of the same model.

use super::models::{
    check_fit_input, check_predict_input, decode_argmax, softmax_rows, to_bincode, Classifier,
    FeatureScaler, LabelEncoder,
};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Logistic regression hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticRegressionConfig {
    /// Gradient descent step size
    pub learning_rate: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// L2 regularization strength
    pub alpha: f64,
    /// Gradient-norm convergence tolerance
    pub tol: f64,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            max_iter: 1000,
            alpha: 1e-4,
            tol: 1e-6,
        }
    }
}

impl LogisticRegressionConfig {
    fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(HarnessError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must be a positive finite number",
            ));
        }
        if self.max_iter == 0 {
            return Err(HarnessError::invalid_parameter("max_iter", 0, "must be at least 1"));
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(HarnessError::invalid_parameter("alpha", self.alpha, "must be >= 0"));
        }
        Ok(())
    }
}

/// Softmax regression classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    config: LogisticRegressionConfig,
    encoder: LabelEncoder,
    scaler: FeatureScaler,
    /// `(n_features, n_classes)`
    coefficients: Option<Array2<f64>>,
    intercepts: Option<Array1<f64>>,
    n_iter: usize,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(LogisticRegressionConfig::default())
    }
}

impl LogisticRegression {
    pub fn new(config: LogisticRegressionConfig) -> Self {
        Self {
            config,
            encoder: LabelEncoder::default(),
            scaler: FeatureScaler::default(),
            coefficients: None,
            intercepts: None,
            n_iter: 0,
        }
    }

    /// Iterations used by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    fn probabilities(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (coef, intercept) = match (&self.coefficients, &self.intercepts) {
            (Some(c), Some(b)) => (c, b),
            _ => return Err(HarnessError::ModelNotFitted),
        };
        check_predict_input(x, self.scaler.n_features())?;
        let z = self.scaler.transform(x);
        Ok(softmax_rows(&(z.dot(coef) + intercept)))
    }
}

impl Classifier for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.config.validate()?;
        check_fit_input(x, y)?;

        let encoder = LabelEncoder::fit(y);
        if encoder.n_classes() < 2 {
            return Err(HarnessError::InsufficientData(
                "logistic regression needs at least 2 classes".to_string(),
            ));
        }
        let targets = encoder.one_hot(&encoder.encode(y)?);
        let scaler = FeatureScaler::fit(x);
        let z = scaler.transform(x);

        let n = z.nrows() as f64;
        let mut weights = Array2::<f64>::zeros((z.ncols(), encoder.n_classes()));
        let mut bias = Array1::<f64>::zeros(encoder.n_classes());
        let lr = self.config.learning_rate;
        let mut n_iter = 0;

        for iter in 0..self.config.max_iter {
            n_iter = iter + 1;
            let probs = softmax_rows(&(z.dot(&weights) + &bias));

            let loss = -(&probs.mapv(|p| p.max(1e-15).ln()) * &targets).sum() / n;
            if !loss.is_finite() {
                return Err(HarnessError::ConvergenceError { iterations: n_iter });
            }

            let errors = (&probs - &targets) / n;
            let dw = z.t().dot(&errors) + self.config.alpha * &weights;
            let db = errors.sum_axis(Axis(0));

            let grad_norm = (dw.mapv(|v| v * v).sum() + db.mapv(|v| v * v).sum()).sqrt();
            if grad_norm < self.config.tol {
                break;
            }

            weights = weights - lr * dw;
            bias = bias - lr * db;
        }

        if weights.iter().any(|w| !w.is_finite()) {
            return Err(HarnessError::ConvergenceError { iterations: n_iter });
        }

        self.encoder = encoder;
        self.scaler = scaler;
        self.coefficients = Some(weights);
        self.intercepts = Some(bias);
        self.n_iter = n_iter;
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
