//! Activity Harness - train, compare and persist classifiers on one shared split
//!
//! The harness takes a labelled feature matrix (for example molecular
//! descriptors with an active/inactive label), splits it once, trains every
//! configured model family on the same training subset, evaluates each one on
//! the same held-out subset and with cross-validation, picks a winner and
//! writes the trained models to disk.
//!
//! # Modules
//!
//! ## Data
//! - [`dataset`] - Feature matrix + integer labels, CSV / DataFrame ingestion
//! - [`split`] - Stratified, seeded train/test splitting
//!
//! ## Training and evaluation
//! - [`training`] - Classifier capability, model families, registry, orchestration
//! - [`metrics`] - Accuracy, weighted precision/recall/F1, ROC-AUC
//! - [`selection`] - Best-model selection
//!
//! ## Output
//! - [`artifacts`] - Model persistence
//! - [`report`] - Text summaries
//!
//! ## Running
//! - [`config`] - JSON run configuration
//! - [`pipeline`] - End-to-end harness
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod dataset;
pub mod split;

// Training and evaluation
pub mod metrics;
pub mod selection;
pub mod training;

// Output
pub mod artifacts;
pub mod report;

// Running
pub mod cli;
pub mod config;
pub mod pipeline;

pub use error::{HarnessError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{HarnessError, Result};

    // Data
    pub use crate::dataset::Dataset;
    pub use crate::split::{train_test_split, DatasetSplitter};

    // Training
    pub use crate::training::{
        Classifier, ModelFamily, ModelRegistry, ModelSpec, MetricReport, ModelStatus,
        OrchestratorConfig, TrainedModel, TrainingOrchestrator, TrainingRun,
    };

    // Metrics and selection
    pub use crate::metrics::{AveragePolicy, HoldoutMetrics, MetricsCollector, ScoringMetric};
    pub use crate::selection::{ModelSelector, RankingMetric, SelectionResult};

    // Output
    pub use crate::artifacts::{ArtifactFormat, ArtifactStore, ModelArtifact};
    pub use crate::report::ReportGenerator;

    // Running
    pub use crate::config::{HarnessConfig, ModelEntry};
    pub use crate::pipeline::{BestModel, Harness, HarnessOutcome};
}
