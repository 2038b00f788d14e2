//! Ingest → split → train → report, shared by the library call and the binary

use std::path::Path;
use tracing::info;

use crate::artifact::ModelArtifact;
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::dataset;
use crate::errors::{Result, TrainerError};
use crate::report::{PlotStatus, Reporter};
use crate::table;
use crate::trainer::{StopReason, Trainer, TrainingObserver, TrainingReport};

/// Everything a finished run produced
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub summary: String,
    pub plot: PlotStatus,
    pub report: TrainingReport,
    /// Absent when training diverged
    pub model: Option<ModelArtifact>,
}

impl RunOutcome {
    pub fn diverged(&self) -> bool {
        matches!(self.report.stop, StopReason::Diverged { .. })
    }
}

/// Run the full pipeline on `path`.
///
/// Divergence is not an error here: the outcome carries the partial report,
/// its summary and a plot of the finite epochs. Ingest, schema and config
/// failures are returned as errors.
pub fn run(
    path: &Path,
    config: &EngineConfig,
    cancel: &CancellationToken,
    observer: &mut dyn TrainingObserver,
) -> Result<RunOutcome> {
    config.validate()?;

    let table = table::ingest(path)?;
    let dataset = dataset::split(&table, &config.split)?;
    drop(table);

    let trainer = Trainer::new(config.training.clone());
    let (mut report, model) = match trainer.train(&dataset, cancel, observer) {
        Ok(trained) => (trained.report, Some(trained.model)),
        Err(TrainerError::Diverged { report, .. }) => (*report, None),
        Err(err) => return Err(err),
    };

    let reporter = Reporter::new(&config.output.plot_path).with_plot_size(config.plot_size());
    let output = reporter.report(&mut report);
    info!("Run finished: {:?}", report.stop);

    Ok(RunOutcome {
        summary: output.summary,
        plot: output.plot,
        report,
        model: model.map(|m| ModelArtifact::new(m, &dataset)),
    })
}

/// Text returned across the library boundary: the summary, or `Error: …`
pub fn boundary_text(result: &Result<RunOutcome>) -> String {
    match result {
        Ok(outcome) => outcome.summary.clone(),
        Err(err) => format!("Error: {}", err),
    }
}
