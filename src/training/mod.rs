//! Model training module
//!
//! Provides the classifier capability, the built-in model families and the
//! orchestration that trains and evaluates them:
//! - Logistic regression
//! - Gaussian Naive Bayes
//! - K-Nearest Neighbors
//! - Decision trees, Random Forests and Gradient Boosting
//! - Support Vector Machines
//! - Neural networks (MLP)

mod models;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod logistic;
pub mod naive_bayes;
pub mod neural_network;
pub mod orchestrator;
pub mod random_forest;
pub mod registry;
pub mod svm;

pub use models::{Classifier, FeatureScaler, LabelEncoder, TrainedModel};
pub use cross_validation::{cross_val_score, CVResults, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{Criterion, DecisionTree, DecisionTreeConfig, MaxFeatures, TreeNode};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use knn::{DistanceMetric, KnnClassifier, KnnConfig, WeightScheme};
pub use logistic::{LogisticRegression, LogisticRegressionConfig};
pub use naive_bayes::{GaussianNaiveBayes, NaiveBayesConfig};
pub use neural_network::{Activation, MlpClassifier, MlpConfig};
pub use orchestrator::{
    MetricReport, ModelStatus, OrchestratorConfig, TrainingOrchestrator, TrainingRun,
};
pub use random_forest::{RandomForest, RandomForestConfig};
pub use registry::{ModelFamily, ModelRegistry, ModelSpec};
pub use svm::{KernelType, SvmClassifier, SvmConfig};
