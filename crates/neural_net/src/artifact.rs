//! Serializable trained model
//!
//! Bundles the network with everything needed to score a new row the same
//! way the training rows were scored: feature scaling, the label encoding
//! (including the vocabulary of string labels) and column names.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dataset::{Dataset, FeatureScaling, LabelEncoding, Task};
use crate::errors::{Result, TrainerError};
use crate::model::Mlp;

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub version: u32,
    /// Unix timestamp (seconds)
    pub created_at: i64,
    pub dataset_fingerprint: String,
    pub feature_names: Vec<String>,
    pub label_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ArtifactMetadata,
    pub labels: LabelEncoding,
    pub scaling: Option<FeatureScaling>,
    pub model: Mlp,
}

/// Model output for one row
#[derive(Clone, Debug, PartialEq)]
pub enum Prediction {
    Value(f64),
    Class {
        index: usize,
        label: String,
        probability: f64,
    },
}

impl ModelArtifact {
    pub fn new(model: Mlp, dataset: &Dataset) -> Self {
        Self {
            metadata: ArtifactMetadata {
                version: ARTIFACT_VERSION,
                created_at: chrono::Utc::now().timestamp(),
                dataset_fingerprint: dataset.fingerprint(),
                feature_names: dataset.feature_names.clone(),
                label_name: dataset.label_name.clone(),
            },
            labels: dataset.labels.clone(),
            scaling: dataset.scaling.clone(),
            model,
        }
    }

    /// Score one row of raw (unscaled) feature values
    pub fn predict(&self, row: &[f64]) -> Result<Prediction> {
        let width = self.model.input_width();
        if row.len() != width {
            return Err(TrainerError::Schema(format!(
                "expected {} features, got {}",
                width,
                row.len()
            )));
        }

        let mut values = row.to_vec();
        if let Some(scaling) = &self.scaling {
            scaling.apply_row(&mut values);
        }
        let x = Array2::from_shape_vec((1, width), values)
            .map_err(|err| TrainerError::Schema(err.to_string()))?;
        let out = self.model.predict(&x);

        match self.model.task {
            Task::Regression => Ok(Prediction::Value(out[[0, 0]])),
            Task::Classification { .. } => {
                let (index, probability) = out
                    .row(0)
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });
                let label = self.labels.decode(index).unwrap_or_else(|| index.to_string());
                Ok(Prediction::Class {
                    index,
                    label,
                    probability,
                })
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TrainerError::Config(format!("failed to serialize model: {}", e)))
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|err| TrainerError::io(path, err))?;
        tracing::info!("Model saved to {}", path.display());
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| TrainerError::io(path, err))?;
        serde_json::from_str(&content)
            .map_err(|e| TrainerError::Format(format!("invalid model file {}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::dataset::{split, SplitConfig};
    use crate::table::Table;
    use crate::trainer::{NoopObserver, Trainer, TrainingConfig};
    use anyhow::Result;

    fn trained(text: &str) -> (ModelArtifact, Dataset) {
        let table = Table::from_reader(std::io::Cursor::new(text.as_bytes().to_vec()), "inline")
            .expect("inline table");
        let dataset = split(&table, &SplitConfig::default()).expect("split");
        let trained = Trainer::new(TrainingConfig {
            epochs: 400,
            learning_rate: 0.5,
            ..Default::default()
        })
        .train(&dataset, &CancellationToken::new(), &mut NoopObserver)
        .expect("train");
        (ModelArtifact::new(trained.model, &dataset), dataset)
    }

    #[test]
    fn test_predict_uses_vocabulary() -> Result<()> {
        let (artifact, _) = trained("x,kind\n0,low\n0.1,low\n0.2,low\n5,high\n5.1,high\n5.2,high\n");

        match artifact.predict(&[5.05])? {
            Prediction::Class { label, probability, .. } => {
                assert_eq!(label, "high");
                assert!(probability > 0.5);
            }
            other => panic!("expected class, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (artifact, _) = trained("a,b,y\n1,2,0\n3,4,1\n");
        assert!(matches!(artifact.predict(&[1.0]), Err(TrainerError::Schema(_))));
    }

    #[test]
    fn test_json_round_trip() -> Result<()> {
        let (artifact, dataset) = trained("a,b,y\n1,2,0\n3,4,1\n5,6,0\n");
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("model.json");

        artifact.save_json(&path)?;
        let loaded = ModelArtifact::load_json(&path)?;

        assert_eq!(loaded, artifact);
        assert_eq!(loaded.metadata.dataset_fingerprint, dataset.fingerprint());
        Ok(())
    }
}
