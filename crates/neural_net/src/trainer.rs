//! Full-batch gradient-descent trainer
//!
//! Runs a fixed number of epochs over a [`Dataset`], recording one loss per
//! epoch. Initialization is seeded so identical inputs reproduce identical
//! loss curves. Training stops early on cancellation (checked between
//! epochs) or when the loss stops being finite.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cancel::CancellationToken;
use crate::dataset::{Dataset, Task};
use crate::errors::{Result, TrainerError};
use crate::model::{Activation, Mlp};

/// Training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
    /// Units in the hidden layer, 0 for no hidden layer
    pub hidden_width: usize,
    pub activation: Activation,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            learning_rate: 0.01,
            seed: 42,
            hidden_width: 16,
            activation: Activation::Tanh,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(TrainerError::Config("epochs must be positive".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainerError::Config(format!(
                "learning_rate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based
    pub epoch: usize,
    pub loss: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Cancelled { after_epoch: usize },
    Diverged { at_epoch: usize },
}

/// What the trainer saw of its input
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub features: usize,
    pub input_rows: usize,
    pub dropped_rows: usize,
    pub task: Task,
    pub fingerprint: String,
}

impl DatasetSummary {
    pub fn of(dataset: &Dataset) -> Self {
        Self {
            rows: dataset.len(),
            features: dataset.feature_count(),
            input_rows: dataset.input_rows,
            dropped_rows: dataset.dropped_rows,
            task: dataset.task(),
            fingerprint: dataset.fingerprint(),
        }
    }
}

/// Per-epoch loss curve plus final metrics of one run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub dataset: DatasetSummary,
    pub configured_epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub epochs: Vec<EpochRecord>,
    pub stop: StopReason,
    /// Training-set accuracy in [0, 1], classification only
    pub accuracy: Option<f64>,
    /// Set by the reporter once the loss plot has been written
    pub plot_path: Option<PathBuf>,
}

impl TrainingReport {
    fn new(dataset: &Dataset, config: &TrainingConfig) -> Self {
        Self {
            dataset: DatasetSummary::of(dataset),
            configured_epochs: config.epochs,
            learning_rate: config.learning_rate,
            seed: config.seed,
            epochs: Vec::with_capacity(config.epochs),
            stop: StopReason::Completed,
            accuracy: None,
            plot_path: None,
        }
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.epochs.last().map(|r| r.loss)
    }

    pub fn losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|r| r.loss).collect()
    }
}

/// Receives each epoch as soon as it is recorded
pub trait TrainingObserver {
    fn on_epoch(&mut self, record: &EpochRecord, total_epochs: usize);
}

/// Observer that ignores progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TrainingObserver for NoopObserver {
    fn on_epoch(&mut self, _record: &EpochRecord, _total_epochs: usize) {}
}

impl<F> TrainingObserver for F
where
    F: FnMut(&EpochRecord, usize),
{
    fn on_epoch(&mut self, record: &EpochRecord, total_epochs: usize) {
        self(record, total_epochs)
    }
}

/// Trained parameters with the report of the run that produced them
#[derive(Clone, Debug)]
pub struct Trained {
    pub model: Mlp,
    pub report: TrainingReport,
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Train a model on the given dataset.
    ///
    /// Divergence returns [`TrainerError::Diverged`] carrying the report of
    /// every finite epoch; cancellation returns the partial report as `Ok`.
    pub fn train(
        &self,
        dataset: &Dataset,
        cancel: &CancellationToken,
        observer: &mut dyn TrainingObserver,
    ) -> Result<Trained> {
        self.config.validate()?;
        if dataset.is_empty() {
            return Err(TrainerError::Schema("dataset has no rows".into()));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut model = Mlp::new(
            dataset.feature_count(),
            self.config.hidden_width,
            self.config.activation,
            dataset.task(),
            &mut rng,
        );
        let mut report = TrainingReport::new(dataset, &self.config);

        tracing::info!(
            "Training {} parameters for {} epochs (lr={}, seed={})",
            model.parameter_count(),
            self.config.epochs,
            self.config.learning_rate,
            self.config.seed
        );

        for epoch in 1..=self.config.epochs {
            if cancel.is_cancelled() {
                tracing::info!("Training cancelled after epoch {}", epoch - 1);
                report.stop = StopReason::Cancelled {
                    after_epoch: epoch - 1,
                };
                break;
            }

            let (loss, grads) = model.loss_and_gradients(&dataset.features, &dataset.targets);
            if !loss.is_finite() {
                tracing::warn!(
                    "Loss is not finite at epoch {}, keeping {} finite epochs",
                    epoch,
                    report.epochs_run()
                );
                report.stop = StopReason::Diverged { at_epoch: epoch };
                return Err(TrainerError::Diverged {
                    at_epoch: epoch,
                    report: Box::new(report),
                });
            }
            model.apply_gradients(&grads, self.config.learning_rate);

            let record = EpochRecord { epoch, loss };
            report.epochs.push(record);
            tracing::debug!("epoch {}/{} loss={}", epoch, self.config.epochs, loss);
            observer.on_epoch(&record, self.config.epochs);
        }

        report.accuracy = model.accuracy(&dataset.features, &dataset.targets);
        tracing::info!(
            "Training stopped after {} epochs, final loss {:?}",
            report.epochs_run(),
            report.final_loss()
        );

        Ok(Trained { model, report })
    }
}
