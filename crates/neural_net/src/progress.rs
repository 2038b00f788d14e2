//! Line-oriented progress output

use std::io::Write;

use crate::trainer::{EpochRecord, TrainingObserver};

/// Writes `epoch N/M loss=…` every `every` epochs (and on the last one),
/// flushing after each line so a reading process sees it immediately.
pub struct ProgressWriter<W: Write> {
    out: W,
    every: usize,
    failed: bool,
}

impl<W: Write> ProgressWriter<W> {
    /// `every == 0` disables progress lines
    pub fn new(out: W, every: usize) -> Self {
        Self {
            out,
            every,
            failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

pub fn progress_line(record: &EpochRecord, total_epochs: usize) -> String {
    format!("epoch {}/{} loss={:.6}", record.epoch, total_epochs, record.loss)
}

impl<W: Write> TrainingObserver for ProgressWriter<W> {
    fn on_epoch(&mut self, record: &EpochRecord, total_epochs: usize) {
        if self.every == 0 || self.failed {
            return;
        }
        if record.epoch % self.every != 0 && record.epoch != total_epochs {
            return;
        }
        let line = progress_line(record, total_epochs);
        if let Err(err) = writeln!(self.out, "{}", line).and_then(|_| self.out.flush()) {
            // A closed pipe must not abort training
            tracing::warn!("Progress output stopped: {}", err);
            self.failed = true;
        }
    }
}
