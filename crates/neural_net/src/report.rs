//! Result reporting: summary text and loss plot

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::plot::{self, PlotError};
use crate::trainer::{StopReason, TrainingReport};

/// Outcome of the plot step, independent of the training outcome
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlotStatus {
    Written(PathBuf),
    Failed { path: PathBuf, reason: String },
    /// Nothing to draw (no finite epochs)
    Skipped,
}

impl PlotStatus {
    pub fn written_path(&self) -> Option<&Path> {
        match self {
            PlotStatus::Written(path) => Some(path),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReportOutput {
    pub summary: String,
    pub plot: PlotStatus,
}

pub struct Reporter {
    plot_path: PathBuf,
    plot_size: (u32, u32),
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(plot::DEFAULT_PLOT_PATH)
    }
}

impl Reporter {
    pub fn new(plot_path: impl Into<PathBuf>) -> Self {
        Self {
            plot_path: plot_path.into(),
            plot_size: plot::DEFAULT_PLOT_SIZE,
        }
    }

    pub fn with_plot_size(mut self, size: (u32, u32)) -> Self {
        self.plot_size = size;
        self
    }

    /// Render the plot, record its path on the report and build the summary
    pub fn report(&self, report: &mut TrainingReport) -> ReportOutput {
        let plot = match plot::render_loss_curve(&report.epochs, &self.plot_path, self.plot_size) {
            Ok(()) => PlotStatus::Written(self.plot_path.clone()),
            Err(PlotError::Empty) => PlotStatus::Skipped,
            Err(err) => {
                tracing::warn!("Plot not written: {}", err);
                PlotStatus::Failed {
                    path: self.plot_path.clone(),
                    reason: err.to_string(),
                }
            }
        };
        report.plot_path = plot.written_path().map(Path::to_path_buf);

        ReportOutput {
            summary: summary(report, &plot),
            plot,
        }
    }
}

/// Plain-text summary; contains no timestamps so identical runs match
pub fn summary(report: &TrainingReport, plot: &PlotStatus) -> String {
    let mut out = String::new();

    let status = match report.stop {
        StopReason::Completed => format!(
            "Training complete! {}/{} epochs",
            report.epochs_run(),
            report.configured_epochs
        ),
        StopReason::Cancelled { after_epoch } => format!(
            "Training cancelled after epoch {} of {}",
            after_epoch, report.configured_epochs
        ),
        StopReason::Diverged { at_epoch } => format!(
            "Training diverged at epoch {} of {} ({} finite epochs kept)",
            at_epoch,
            report.configured_epochs,
            report.epochs_run()
        ),
    };
    let _ = writeln!(out, "{}", status);

    match report.final_loss() {
        Some(loss) => {
            let _ = writeln!(out, "Final loss: {:.6}", loss);
        }
        None => {
            let _ = writeln!(out, "Final loss: n/a");
        }
    }
    if let Some(accuracy) = report.accuracy {
        let _ = writeln!(out, "Accuracy: {:.2}%", accuracy * 100.0);
    }

    let ds = &report.dataset;
    let _ = writeln!(out, "Task: {}", ds.task);
    let _ = writeln!(
        out,
        "Rows: {} used, {} dropped of {} ({} features)",
        ds.rows, ds.dropped_rows, ds.input_rows, ds.features
    );

    match plot {
        PlotStatus::Written(path) => {
            let _ = write!(out, "Plot: {}", path.display());
        }
        PlotStatus::Failed { path, reason } => {
            let _ = write!(out, "Plot not written to {}: {}", path.display(), reason);
        }
        PlotStatus::Skipped => {
            let _ = write!(out, "Plot skipped: no finite epochs");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Task;
    use crate::trainer::{DatasetSummary, EpochRecord};

    fn report(stop: StopReason, losses: &[f64], accuracy: Option<f64>) -> TrainingReport {
        TrainingReport {
            dataset: DatasetSummary {
                rows: 3,
                features: 2,
                input_rows: 4,
                dropped_rows: 1,
                task: Task::Classification { classes: 2 },
                fingerprint: "00".into(),
            },
            configured_epochs: 10,
            learning_rate: 0.01,
            seed: 42,
            epochs: losses
                .iter()
                .enumerate()
                .map(|(i, &loss)| EpochRecord { epoch: i + 1, loss })
                .collect(),
            stop,
            accuracy,
            plot_path: None,
        }
    }

    #[test]
    fn test_summary_for_completed_classification() {
        let r = report(StopReason::Completed, &[0.9, 0.5], Some(2.0 / 3.0));
        let text = summary(&r, &PlotStatus::Written("output.png".into()));

        assert!(text.starts_with("Training complete! 2/10 epochs"));
        assert!(text.contains("Final loss: 0.500000"));
        assert!(text.contains("Accuracy: 66.67%"));
        assert!(text.contains("Rows: 3 used, 1 dropped of 4 (2 features)"));
        assert!(text.ends_with("Plot: output.png"));
    }

    #[test]
    fn test_summary_for_divergence() {
        let r = report(StopReason::Diverged { at_epoch: 3 }, &[1.0, 50.0], None);
        let text = summary(&r, &PlotStatus::Skipped);
        assert!(text.starts_with("Training diverged at epoch 3 of 10 (2 finite epochs kept)"));
        assert!(!text.contains("Accuracy"));
    }

    #[test]
    fn test_summary_without_epochs() {
        let r = report(StopReason::Cancelled { after_epoch: 0 }, &[], None);
        let text = summary(&r, &PlotStatus::Skipped);
        assert!(text.contains("cancelled after epoch 0 of 10"));
        assert!(text.contains("Final loss: n/a"));
        assert!(text.contains("Plot skipped"));
    }

    #[test]
    fn test_report_sets_plot_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("curve.png");
        let mut r = report(StopReason::Completed, &[0.9, 0.7, 0.6], Some(1.0));

        let out = Reporter::new(&path).report(&mut r);

        assert_eq!(out.plot, PlotStatus::Written(path.clone()));
        assert_eq!(r.plot_path.as_deref(), Some(path.as_path()));
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_plot_failure_does_not_fail_report() {
        let mut r = report(StopReason::Completed, &[0.9, 0.7], Some(0.5));
        let out = Reporter::new("/nonexistent-dir/plots/curve.png").report(&mut r);

        assert!(matches!(out.plot, PlotStatus::Failed { .. }));
        assert!(out.summary.starts_with("Training complete!"));
        assert!(out.summary.contains("Plot not written to /nonexistent-dir/plots/curve.png"));
        assert_eq!(r.plot_path, None);
    }
}
