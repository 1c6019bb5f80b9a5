//! Artifact persistence
//!
//! Every trained model is written to `{output_dir}/{id}_model.{bin|json}` as
//! an envelope around the model's own serialized state. Writes go through a
//! temporary file in the same directory and an atomic rename, so saving an
//! identifier again replaces the earlier artifact in place.

use crate::error::{HarnessError, Result};
use crate::training::decision_tree::DecisionTree;
use crate::training::gradient_boosting::GradientBoostingClassifier;
use crate::training::knn::KnnClassifier;
use crate::training::logistic::LogisticRegression;
use crate::training::naive_bayes::GaussianNaiveBayes;
use crate::training::neural_network::MlpClassifier;
use crate::training::random_forest::RandomForest;
use crate::training::svm::SvmClassifier;
use crate::training::{Classifier, TrainedModel, TrainingRun};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// On-disk encoding of the artifact envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// bincode (compact)
    #[default]
    Binary,
    /// JSON (portable, human-readable)
    Json,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Binary => "bin",
            ArtifactFormat::Json => "json",
        }
    }

    /// Format implied by a file extension; anything but `.json` is binary
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ArtifactFormat::Json,
            _ => ArtifactFormat::Binary,
        }
    }
}

/// Serialized model with integrity metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Magic bytes for format detection
    pub magic: [u8; 4],
    pub format_version: u32,
    /// Family name, as reported by [`Classifier::name`]
    pub model_type: String,
    pub model_id: String,
    /// RFC 3339 timestamp
    pub saved_at: String,
    /// The model's own serialized state
    pub payload: Vec<u8>,
    /// FNV-1a hash of `payload`
    pub checksum: u64,
}

impl ModelArtifact {
    /// Magic bytes for harness model files
    pub const MAGIC: [u8; 4] = *b"AHMD";
    /// Current format version
    pub const VERSION: u32 = 1;

    pub fn new(model_id: impl Into<String>, model_type: impl Into<String>, payload: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(&payload);
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            model_type: model_type.into(),
            model_id: model_id.into(),
            saved_at: Utc::now().to_rfc3339(),
            payload,
            checksum,
        }
    }

    /// FNV-1a hash
    fn compute_checksum(data: &[u8]) -> u64 {
        const FNV_OFFSET: u64 = 14695981039346656037;
        const FNV_PRIME: u64 = 1099511628211;

        let mut hash = FNV_OFFSET;
        for byte in data {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.payload) == self.checksum
    }

    fn verify(&self, path: &Path) -> Result<()> {
        let fail = |reason: String| HarnessError::Persistence {
            path: path.display().to_string(),
            reason,
        };
        if self.magic != Self::MAGIC {
            return Err(fail(format!("unrecognized magic bytes {:?}", self.magic)));
        }
        if self.format_version > Self::VERSION {
            return Err(fail(format!(
                "format version {} is newer than supported version {}",
                self.format_version,
                Self::VERSION
            )));
        }
        if !self.verify_checksum() {
            return Err(fail(
                "checksum verification failed - file may be corrupted".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of persisting one model in a batch
#[derive(Debug)]
pub struct SavedArtifact {
    pub model_id: String,
    pub result: Result<PathBuf>,
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes and reads model artifacts under one output directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    format: ArtifactFormat,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            format: ArtifactFormat::default(),
        }
    }

    pub fn with_format(mut self, format: ArtifactFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Create the output directory if absent; safe to call concurrently
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir).map_err(|e| HarnessError::Persistence {
            path: self.output_dir.display().to_string(),
            reason: format!("Failed to create directory: {}", e),
        })
    }

    /// Deterministic artifact path for an identifier
    pub fn artifact_path(&self, model_id: &str) -> Result<PathBuf> {
        let invalid = model_id.is_empty()
            || model_id == "."
            || model_id == ".."
            || model_id.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
        if invalid {
            return Err(HarnessError::Persistence {
                path: self.output_dir.display().to_string(),
                reason: format!("'{}' is not a valid artifact identifier", model_id),
            });
        }
        Ok(self
            .output_dir
            .join(format!("{}_model.{}", model_id, self.format.extension())))
    }

    /// Persist a trained model under its identifier
    pub fn save(&self, model: &TrainedModel) -> Result<PathBuf> {
        self.save_classifier(model.id(), model.classifier())
    }

    /// Persist any fitted classifier under `model_id`, replacing an existing artifact
    pub fn save_classifier(&self, model_id: &str, model: &dyn Classifier) -> Result<PathBuf> {
        let path = self.artifact_path(model_id)?;
        self.ensure_dir()?;

        let artifact = ModelArtifact::new(model_id, model.name(), model.to_bytes()?);
        let bytes = match self.format {
            ArtifactFormat::Binary => bincode::serialize(&artifact)?,
            ArtifactFormat::Json => serde_json::to_vec_pretty(&artifact)?,
        };
        write_atomic(&path, &bytes)?;

        info!(model = %model_id, path = %path.display(), bytes = bytes.len(), "Saved artifact");
        Ok(path)
    }

    /// Persist every trained model of a run. Directory creation failure is
    /// returned as an error; individual save failures are reported per model.
    pub fn save_all(&self, run: &TrainingRun) -> Result<Vec<SavedArtifact>> {
        self.ensure_dir()?;
        let saved: Vec<SavedArtifact> = run
            .models()
            .iter()
            .map(|model| {
                let result = self.save(model);
                if let Err(e) = &result {
                    warn!(model = %model.id(), error = %e, "Failed to save artifact");
                }
                SavedArtifact {
                    model_id: model.id().to_string(),
                    result,
                }
            })
            .collect();
        Ok(saved)
    }

    /// Read and verify the artifact stored for `model_id`
    pub fn load(&self, model_id: &str) -> Result<ModelArtifact> {
        load_artifact(self.artifact_path(model_id)?)
    }
}

/// Read and verify an artifact file; the encoding follows the file extension
pub fn load_artifact(path: impl AsRef<Path>) -> Result<ModelArtifact> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| HarnessError::Persistence {
        path: path.display().to_string(),
        reason: format!("Failed to open file: {}", e),
    })?;
    let mut reader = BufReader::new(file);

    let artifact: ModelArtifact = match ArtifactFormat::from_path(path) {
        ArtifactFormat::Binary => {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            bincode::deserialize(&bytes)?
        }
        ArtifactFormat::Json => serde_json::from_reader(&mut reader)?,
    };
    artifact.verify(path)?;
    debug!(model = %artifact.model_id, model_type = %artifact.model_type, "Loaded artifact");
    Ok(artifact)
}

/// Rebuild a built-in model family from its artifact
pub fn restore_classifier(artifact: &ModelArtifact) -> Result<Box<dyn Classifier>> {
    fn decode<M: Classifier + DeserializeOwned + 'static>(payload: &[u8]) -> Result<Box<dyn Classifier>> {
        let model: M = bincode::deserialize(payload).map_err(|e| {
            HarnessError::SerializationError(format!("Failed to deserialize model: {}", e))
        })?;
        Ok(Box::new(model))
    }

    let payload = artifact.payload.as_slice();
    match artifact.model_type.as_str() {
        "logistic_regression" => decode::<LogisticRegression>(payload),
        "gaussian_naive_bayes" => decode::<GaussianNaiveBayes>(payload),
        "knn" => decode::<KnnClassifier>(payload),
        "decision_tree" => decode::<DecisionTree>(payload),
        "random_forest" => decode::<RandomForest>(payload),
        "gradient_boosting" => decode::<GradientBoostingClassifier>(payload),
        "svm" => decode::<SvmClassifier>(payload),
        "neural_network" => decode::<MlpClassifier>(payload),
        other => Err(HarnessError::SerializationError(format!(
            "no built-in model family named '{}'",
            other
        ))),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let persistence = |reason: String| HarnessError::Persistence {
        path: path.display().to_string(),
        reason,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| persistence("artifact path has no file name".to_string()))?;
    let tmp = dir.join(format!(
        ".{}.{}-{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let written = (|| -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })()
    .and_then(|_| fs::rename(&tmp, path));

    written.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        persistence(format!("Failed to write artifact: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn fitted_knn() -> KnnClassifier {
        let mut model = KnnClassifier::with_k(1);
        model
            .fit(&array![[0.0], [1.0], [5.0]], &array![0, 0, 1])
            .unwrap();
        model
    }

    #[test]
    fn test_artifact_checksum() {
        let artifact = ModelArtifact::new("m", "knn", vec![1, 2, 3, 4, 5]);
        assert!(artifact.verify_checksum());

        let mut corrupted = artifact.clone();
        corrupted.payload[0] = 99;
        assert!(!corrupted.verify_checksum());
    }

    #[test]
    fn test_save_load_restore() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested").join("models"));
        let model = TrainedModel::new("knn", Box::new(fitted_knn()));

        let path = store.save(&model).unwrap();
        assert_eq!(path, store.output_dir().join("knn_model.bin"));

        let artifact = store.load("knn").unwrap();
        assert_eq!(artifact.model_type, "knn");
        assert_eq!(artifact.model_id, "knn");
        assert!(chrono::DateTime::parse_from_rfc3339(&artifact.saved_at).is_ok());

        let restored = restore_classifier(&artifact).unwrap();
        let probe = array![[0.2], [4.0]];
        assert_eq!(restored.predict(&probe).unwrap(), model.predict(&probe).unwrap());
    }

    #[test]
    fn test_json_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).with_format(ArtifactFormat::Json);
        let path = store.save_classifier("nn", &fitted_knn()).unwrap();
        assert!(path.ends_with("nn_model.json"));

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"model_type\": \"knn\""));
        assert_eq!(load_artifact(&path).unwrap().model_id, "nn");
    }

    #[test]
    fn test_corrupted_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).with_format(ArtifactFormat::Json);
        let path = store.save_classifier("m", &fitted_knn()).unwrap();

        let mut artifact: ModelArtifact =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        artifact.checksum ^= 1;
        fs::write(&path, serde_json::to_vec(&artifact).unwrap()).unwrap();

        assert!(matches!(
            store.load("m"),
            Err(HarnessError::Persistence { .. })
        ));
    }

    #[test]
    fn test_identifier_with_separator_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        for bad in ["../escape", "a/b", "", ".."] {
            assert!(matches!(
                store.artifact_path(bad),
                Err(HarnessError::Persistence { .. })
            ));
        }
    }

    #[test]
    fn test_unknown_family_not_restorable() {
        let artifact = ModelArtifact::new("x", "custom_family", vec![]);
        assert!(restore_classifier(&artifact).is_err());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        store.save_classifier("a", &fitted_knn()).unwrap();
        store.save_classifier("a", &fitted_knn()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_model.bin".to_string()]);
    }
}
