//! Error types for the training pipeline

use std::path::PathBuf;
use thiserror::Error;

use crate::trainer::TrainingReport;

/// Errors returned by the ingest → split → train pipeline.
#[derive(Debug, Error)]
pub enum TrainerError {
    /// The input file could not be opened or read
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The CSV structure is unusable (e.g. no header line)
    #[error("format error: {0}")]
    Format(String),

    /// No usable rows or columns after splitting
    #[error("schema error: {0}")]
    Schema(String),

    /// Invalid engine configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Loss became non-finite; the report holds every finite epoch before it
    #[error("training diverged at epoch {at_epoch} (loss is not finite)")]
    Diverged {
        at_epoch: usize,
        report: Box<TrainingReport>,
    },
}

impl TrainerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Partial report carried by a divergence, if any.
    pub fn partial_report(&self) -> Option<&TrainingReport> {
        match self {
            Self::Diverged { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, TrainerError>;
