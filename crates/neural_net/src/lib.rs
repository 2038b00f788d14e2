//! Neural-net trainer - small embeddable tabular training engine
//!
//! Reads a headed CSV, splits it into features and label, trains a seeded
//! feed-forward network with full-batch gradient descent and reports the
//! loss curve as text and as a PNG plot. Usable as a Rust library, through
//! the C ABI in [`ffi`], or as the `neural_net_rust` binary.

pub mod artifact;
pub mod cancel;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod ffi;
pub mod model;
pub mod pipeline;
pub mod plot;
pub mod progress;
pub mod report;
pub mod table;
pub mod trainer;

use std::path::Path;

pub use artifact::{ModelArtifact, Prediction};
pub use cancel::CancellationToken;
pub use config::EngineConfig;
pub use dataset::{Dataset, LabelColumn, MalformedRowPolicy, SplitConfig, Task, TaskKind};
pub use errors::{Result, TrainerError};
pub use model::{Activation, Mlp};
pub use pipeline::RunOutcome;
pub use report::PlotStatus;
pub use table::Table;
pub use trainer::{EpochRecord, StopReason, Trainer, TrainingConfig, TrainingObserver, TrainingReport};

/// Train directly from a CSV file with the given configuration, without progress output.
pub fn train_model_from_csv(path: &Path, config: &EngineConfig) -> Result<RunOutcome> {
    pipeline::run(path, config, &CancellationToken::new(), &mut trainer::NoopObserver)
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
