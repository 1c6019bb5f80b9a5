//! Support Vector Machine classifier
//!
//! Soft-margin SVM trained with simplified SMO (Sequential Minimal
//! Optimization) on standardized features. More than two classes are handled
//! one-vs-rest, one binary machine per class.

use super::models::{
    check_fit_input, check_predict_input, decode_argmax, to_bincode, Classifier, FeatureScaler,
    LabelEncoder,
};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Maximum number of samples for eager kernel matrix computation.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Consecutive sweeps without an update before SMO stops
const MAX_QUIET_PASSES: usize = 5;

/// Kernel function type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelType {
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = exp(-γ ||x - y||²); `None` uses 1 / n_features
    Rbf { gamma: Option<f64> },
}

impl Default for KernelType {
    fn default() -> Self {
        KernelType::Rbf { gamma: None }
    }
}

/// SVM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: KernelType,
    /// KKT violation tolerance
    pub tol: f64,
    /// Maximum SMO sweeps over the training set
    pub max_iter: usize,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::default(),
            tol: 1e-3,
            max_iter: 1000,
        }
    }
}

impl SvmConfig {
    fn validate(&self) -> Result<()> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(HarnessError::invalid_parameter("c", self.c, "must be positive"));
        }
        if self.max_iter == 0 {
            return Err(HarnessError::invalid_parameter("max_iter", 0, "must be at least 1"));
        }
        if let KernelType::Rbf { gamma: Some(g) } = self.kernel {
            if !(g.is_finite() && g > 0.0) {
                return Err(HarnessError::invalid_parameter("gamma", g, "must be positive"));
            }
        }
        Ok(())
    }
}

/// Kernel with its parameters resolved against the training data
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum Kernel {
    Linear,
    Rbf(f64),
}

impl Kernel {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match *self {
            Kernel::Linear => a.dot(&b),
            Kernel::Rbf(gamma) => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * sq).exp()
            }
        }
    }

    fn matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| self.eval(x.row(i), x.row(j))).collect())
            .collect();
        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, v) in row.into_iter().enumerate() {
                k[[i, j]] = v;
            }
        }
        k
    }
}

/// One fitted binary machine: `f(x) = Σ coef_i K(sv_i, x) + bias`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinaryMachine {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i
    dual_coef: Array1<f64>,
    bias: f64,
}

impl BinaryMachine {
    fn decision(&self, kernel: &Kernel, row: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, &coef)| coef * kernel.eval(sv, row))
            .sum::<f64>()
            + self.bias
    }
}

/// Support vector classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmClassifier {
    config: SvmConfig,
    random_state: u64,
    encoder: LabelEncoder,
    scaler: FeatureScaler,
    kernel: Option<Kernel>,
    /// One machine for binary problems, one per class otherwise
    machines: Vec<BinaryMachine>,
}

impl Default for SvmClassifier {
    fn default() -> Self {
        Self::new(SvmConfig::default())
    }
}

impl SvmClassifier {
    pub fn new(config: SvmConfig) -> Self {
        Self {
            config,
            random_state: 42,
            encoder: LabelEncoder::default(),
            scaler: FeatureScaler::default(),
            kernel: None,
            machines: Vec::new(),
        }
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.support_vectors.nrows()).sum()
    }

    /// Decision values, one column per class
    fn decision_scores(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let kernel = self.kernel.ok_or(HarnessError::ModelNotFitted)?;
        check_predict_input(x, self.scaler.n_features())?;
        let z = self.scaler.transform(x);
        let k = self.encoder.n_classes();
        let mut scores = Array2::zeros((z.nrows(), k));

        for (i, row) in z.rows().into_iter().enumerate() {
            if let [machine] = self.machines.as_slice() {
                let f = machine.decision(&kernel, row);
                scores[[i, 0]] = -f;
                scores[[i, 1]] = f;
            } else {
                for (c, machine) in self.machines.iter().enumerate() {
                    scores[[i, c]] = machine.decision(&kernel, row);
                }
            }
        }
        Ok(scores)
    }

    fn smo_train(
        &self,
        z: &Array2<f64>,
        kernel_matrix: &Array2<f64>,
        y: &Array1<f64>,
        seed: u64,
    ) -> Result<BinaryMachine> {
        let n = z.nrows();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let decision = |alphas: &Array1<f64>, bias: f64, idx: usize| -> f64 {
            let mut sum = 0.0;
            for i in 0..n {
                if alphas[i] != 0.0 {
                    sum += alphas[i] * y[i] * kernel_matrix[[i, idx]];
                }
            }
            sum + bias
        };

        let mut passes = 0;
        let mut total_iter = 0;

        while passes < MAX_QUIET_PASSES && total_iter < self.config.max_iter {
            let mut num_changed = 0;

            for i in 0..n {
                let e_i = decision(&alphas, bias, i) - y[i];
                if !((y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0))
                {
                    continue;
                }

                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = decision(&alphas, bias, j) - y[j];
                let alpha_i_old = alphas[i];
                let alpha_j_old = alphas[j];

                let (l, h) = if y[i] != y[j] {
                    ((alpha_j_old - alpha_i_old).max(0.0), (c + alpha_j_old - alpha_i_old).min(c))
                } else {
                    ((alpha_i_old + alpha_j_old - c).max(0.0), (alpha_i_old + alpha_j_old).min(c))
                };
                if (l - h).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * kernel_matrix[[i, j]] - kernel_matrix[[i, i]] - kernel_matrix[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                alphas[j] = (alpha_j_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                    continue;
                }
                alphas[i] = alpha_i_old + y[i] * y[j] * (alpha_j_old - alphas[j]);

                let b1 = bias
                    - e_i
                    - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, i]]
                    - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[i, j]];
                let b2 = bias
                    - e_j
                    - y[i] * (alphas[i] - alpha_i_old) * kernel_matrix[[i, j]]
                    - y[j] * (alphas[j] - alpha_j_old) * kernel_matrix[[j, j]];

                bias = if alphas[i] > 0.0 && alphas[i] < c {
                    b1
                } else if alphas[j] > 0.0 && alphas[j] < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                if !bias.is_finite() {
                    return Err(HarnessError::ConvergenceError {
                        iterations: total_iter + 1,
                    });
                }
                num_changed += 1;
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > 1e-8).collect();
        Ok(BinaryMachine {
            support_vectors: z.select(ndarray::Axis(0), &support),
            dual_coef: support.iter().map(|&i| alphas[i] * y[i]).collect(),
            bias,
        })
    }
}

impl Classifier for SvmClassifier {
    fn name(&self) -> &'static str {
        "svm"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        self.config.validate()?;
        check_fit_input(x, y)?;

        let n = x.nrows();
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(HarnessError::DataError(format!(
                "Dataset has {} samples, exceeding the maximum {} for the SVM kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        let encoder = LabelEncoder::fit(y);
        if encoder.n_classes() < 2 {
            return Err(HarnessError::InsufficientData(
                "SVM needs at least 2 classes".to_string(),
            ));
        }
        let encoded = encoder.encode(y)?;
        let scaler = FeatureScaler::fit(x);
        let z = scaler.transform(x);

        let kernel = match self.config.kernel {
            KernelType::Linear => Kernel::Linear,
            KernelType::Rbf { gamma } => Kernel::Rbf(gamma.unwrap_or(1.0 / z.ncols() as f64)),
        };
        let kernel_matrix = kernel.matrix(&z);

        // Binary problems train a single machine for the higher class
        let positives: Vec<usize> = if encoder.n_classes() == 2 {
            vec![1]
        } else {
            (0..encoder.n_classes()).collect()
        };

        let machines = positives
            .par_iter()
            .map(|&positive| {
                let targets: Array1<f64> = encoded
                    .iter()
                    .map(|&c| if c == positive { 1.0 } else { -1.0 })
                    .collect();
                let seed = self.random_state.wrapping_add(positive as u64);
                self.smo_train(&z, &kernel_matrix, &targets, seed)
            })
            .collect::<Result<Vec<_>>>()?;

        self.encoder = encoder;
        self.scaler = scaler;
        self.kernel = Some(kernel);
        self.machines = machines;
        tracing::debug!(
            n_machines = self.machines.len(),
            n_support_vectors = self.n_support_vectors(),
            "SVM fitted"
        );
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let scores = self.decision_scores(x)?;
        Ok(decode_argmax(&scores, &self.encoder))
    }

    fn predict_score(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.decision_scores(x).map(Some)
    }

    fn classes(&self) -> &[i64] {
        self.encoder.classes()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        to_bincode(self)
    }
}
