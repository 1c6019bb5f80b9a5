//! Neural Network (Multi-Layer Perceptron) classifier
//!
//! Fully connected feedforward network with a softmax output layer, trained
//! with mini-batch Adam on standardized features.

use super::models::{
    check_fit_input, check_predict_input, decode_argmax, softmax_rows, to_bincode, Classifier,
    FeatureScaler, LabelEncoder,
};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Hidden-layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Rectified Linear Unit
    #[default]
    Relu,
    /// Hyperbolic tangent
    Tanh,
    /// Logistic sigmoid
    Logistic,
}

impl Activation {
    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Logistic => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }

    /// Derivative expressed through the activation output `a`
    fn derivative(&self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Relu => a.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Tanh => a.mapv(|v| 1.0 - v * v),
            Activation::Logistic => a.mapv(|v| v * (1.0 - v)),
        }
    }
}

/// Neural Network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpConfig {
    /// Hidden layer sizes
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    /// Adam step size
    pub learning_rate: f64,
    /// Maximum epochs
    pub max_iter: usize,
    pub batch_size: usize,
    /// L2 regularization
    pub alpha: f64,
    /// Minimum loss improvement that resets the patience counter
    pub tol: f64,
    /// Epochs without improvement before stopping
    pub n_iter_no_change: usize,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100, 50],
            activation: Activation::Relu,
            learning_rate: 0.001,
            max_iter: 200,
            batch_size: 32,
            alpha: 0.0001,
            tol: 1e-4,
            n_iter_no_change: 10,
        }
    }
}

impl MlpConfig {
    fn validate(&self) -> Result<()> {
        if let Some(pos) = self.hidden_layers.iter().position(|&h| h == 0) {
            return Err(HarnessError::invalid_parameter(
                "hidden_layers",
                format!("{:?}", self.hidden_layers),
                format!("layer {} has zero units", pos),
            ));
        }
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
        if self.batch_size == 0 {
            return Err(HarnessError::invalid_parameter("batch_size", 0, "must be at least 1"));
        }
        if !(self.alpha.is_finite() && self.alpha >= 0.0) {
            return Err(HarnessError::invalid_parameter("alpha", self.alpha, "must be >= 0"));
        }
        Ok(())
    }
}

/// First and second moment estimates for one parameter tensor
#[derive(Debug, Clone)]
struct AdamState {
    m: Vec<f64>,
    v: Vec<f64>,
}

impl AdamState {
    const BETA1: f64 = 0.9;
    const BETA2: f64 = 0.999;
    const EPS: f64 = 1e-8;

    fn new(len: usize) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }

    /// Bias-corrected update; `param` and `grad` must iterate in the same order
    fn step<'p, 'g>(
        &mut self,
        param: impl Iterator<Item = &'p mut f64>,
        grad: impl Iterator<Item = &'g f64>,
        lr: f64,
        t: i32,
    ) {
        let lr_t = lr * (1.0 - Self::BETA2.powi(t)).sqrt() / (1.0 - Self::BETA1.powi(t));
        for (((p, &g), m), v) in param.zip(grad).zip(&mut self.m).zip(&mut self.v) {
            *m = Self::BETA1 * *m + (1.0 - Self::BETA1) * g;
            *v = Self::BETA2 * *v + (1.0 - Self::BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + Self::EPS);
        }
    }
}

/// Multi-Layer Perceptron classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpClassifier {
    config: MlpConfig,
    random_state: u64,
    encoder: LabelEncoder,
    scaler: FeatureScaler,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    loss_curve: Vec<f64>,
}

impl Default for MlpClassifier {
    fn default() -> Self {
        Self::new(MlpConfig::default())
    }
}

impl MlpClassifier {
    pub fn new(config: MlpConfig) -> Self {
        Self {
            config,
            random_state: 42,
            encoder: LabelEncoder::default(),
            scaler: FeatureScaler::default(),
            weights: Vec::new(),
            biases: Vec::new(),
            loss_curve: Vec::new(),
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Mean training loss per epoch
    pub fn loss_curve(&self) -> &[f64] {
        &self.loss_curve
    }

    /// Epochs run by the last fit
    pub fn n_iter(&self) -> usize {
        self.loss_curve.len()
    }

    /// Glorot-uniform initialization
    fn initialize_weights<R: Rng>(&mut self, n_inputs: usize, n_outputs: usize, rng: &mut R) {
        let mut sizes = vec![n_inputs];
        sizes.extend(&self.config.hidden_layers);
        sizes.push(n_outputs);

        self.weights.clear();
        self.biases.clear();
        for pair in sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
            self.weights
                .push(Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit)));
            self.biases
                .push(Array1::from_shape_fn(fan_out, |_| rng.gen_range(-limit..limit)));
        }
    }

    /// Activations of every layer; the last entry holds the softmax output
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.weights.len() + 1);
        activations.push(x.clone());
        let last = self.weights.len() - 1;
        for (l, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = activations[l].dot(w) + b;
            let a = if l == last {
                softmax_rows(&z)
            } else {
                self.config.activation.apply(&z)
            };
            activations.push(a);
        }
        activations
    }

    fn probabilities(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.weights.is_empty() {
            return Err(HarnessError::ModelNotFitted);
        }
        check_predict_input(x, self.scaler.n_features())?;
        let z = self.scaler.transform(x);
        let mut activations = self.forward(&z);
        activations.pop().ok_or(HarnessError::ModelNotFitted)
    }
}

impl Classifier for MlpClassifier {
    fn name(&self) -> &'static str {
        "neural_network"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.config.validate()?;
        check_fit_input(x, y)?;

        let encoder = LabelEncoder::fit(y);
        if encoder.n_classes() < 2 {
            return Err(HarnessError::InsufficientData(
                "neural network needs at least 2 classes".to_string(),
            ));
        }
        let targets = encoder.one_hot(&encoder.encode(y)?);
        let scaler = FeatureScaler::fit(x);
        let z = scaler.transform(x);
        self.scaler = scaler;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state);
        self.initialize_weights(z.ncols(), encoder.n_classes(), &mut rng);

        let mut adam_w: Vec<AdamState> = self.weights.iter().map(|w| AdamState::new(w.len())).collect();
        let mut adam_b: Vec<AdamState> = self.biases.iter().map(|b| AdamState::new(b.len())).collect();

        let n_samples = z.nrows();
        let batch_size = self.config.batch_size.min(n_samples);
        let n_layers = self.weights.len();
        let mut indices: Vec<usize> = (0..n_samples).collect();
        let mut best_loss = f64::INFINITY;
        let mut no_improvement = 0;
        let mut step = 0i32;
        self.loss_curve.clear();

        for epoch in 0..self.config.max_iter {
            indices.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in indices.chunks(batch_size) {
                let x_batch = z.select(Axis(0), batch);
                let y_batch = targets.select(Axis(0), batch);
                let bs = batch.len() as f64;

                let activations = self.forward(&x_batch);
                let output = &activations[n_layers];
                epoch_loss -= (&output.mapv(|p| p.max(1e-15).ln()) * &y_batch).sum();

                // Softmax + cross-entropy gradient
                let mut delta = (output - &y_batch) / bs;
                step = step.saturating_add(1);
                for l in (0..n_layers).rev() {
                    let grad_w = activations[l].t().dot(&delta) + &self.weights[l] * (self.config.alpha / bs);
                    let grad_b = delta.sum_axis(Axis(0));
                    if l > 0 {
                        delta = delta.dot(&self.weights[l].t())
                            * self.config.activation.derivative(&activations[l]);
                    }
                    let lr = self.config.learning_rate;
                    adam_w[l].step(self.weights[l].iter_mut(), grad_w.iter(), lr, step);
                    adam_b[l].step(self.biases[l].iter_mut(), grad_b.iter(), lr, step);
                }
            }

            let loss = epoch_loss / n_samples as f64;
            if !loss.is_finite() {
                return Err(HarnessError::ConvergenceError {
                    iterations: epoch + 1,
                });
            }
            self.loss_curve.push(loss);

            if loss > best_loss - self.config.tol {
                no_improvement += 1;
            } else {
                no_improvement = 0;
            }
            best_loss = best_loss.min(loss);
            if no_improvement >= self.config.n_iter_no_change {
                tracing::debug!(epoch = epoch + 1, loss, "MLP training stopped early");
                break;
            }
        }

        self.encoder = encoder;
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

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn blobs() -> (Array2<f64>, Array1<i64>) {
        let x = array![
            [0.0, 0.0], [0.3, 0.2], [0.1, 0.4], [0.2, 0.1], [-0.2, 0.3],
            [4.0, 4.0], [4.2, 3.9], [3.8, 4.1], [4.1, 4.3], [3.9, 3.7]
        ];
        let y = array![0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        (x, y)
    }

    #[test]
    fn test_mlp_learns_blobs() {
        let (x, y) = blobs();
        let mut mlp = MlpClassifier::new(MlpConfig {
            hidden_layers: vec![16],
            learning_rate: 0.01,
            ..Default::default()
        });
        mlp.fit(&x, &y).unwrap();

        assert_eq!(mlp.predict(&x).unwrap(), y);
        let curve = mlp.loss_curve();
        assert!(curve[curve.len() - 1] < curve[0]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = blobs();
        let mut mlp = MlpClassifier::new(MlpConfig {
            hidden_layers: vec![8, 4],
            activation: Activation::Tanh,
            max_iter: 5,
            ..Default::default()
        });
        mlp.fit(&x, &y).unwrap();
        assert!(mlp.n_iter() <= 5);

        let probs = mlp.predict_score(&x).unwrap().unwrap();
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_width_layer_rejected() {
        let (x, y) = blobs();
        let mut mlp = MlpClassifier::new(MlpConfig {
            hidden_layers: vec![10, 0],
            ..Default::default()
        });
        assert!(matches!(
            mlp.fit(&x, &y),
            Err(HarnessError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let (x, y) = blobs();
        let config = MlpConfig {
            hidden_layers: vec![4],
            max_iter: 3,
            ..Default::default()
        };
        let mut a = MlpClassifier::new(config.clone()).with_random_state(11);
        let mut b = MlpClassifier::new(config).with_random_state(11);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.loss_curve(), b.loss_curve());
    }
}
