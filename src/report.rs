//! Progress reporting during training.
//!
//! The training loop only computes numbers. Anything that wants to render
//! them implements [`ProgressReporter`]; [`LogReporter`] sends them to
//! `tracing` and [`SilentReporter`] drops them.

use tracing::{debug, info};

/// Loss and accuracy of one mini-batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOutcome {
    pub loss: f64,
    /// `None` unless the network tracks accuracy.
    pub accuracy: Option<f64>,
}

/// Mean loss and accuracy over the batches of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// Zero-based epoch index.
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: Option<f64>,
}

/// Receives training progress as it happens.
pub trait ProgressReporter {
    fn epoch_started(&mut self, _epoch: usize, _epochs: usize) {}

    fn batch_finished(&mut self, _epoch: usize, _batch: usize, _batches: usize, _outcome: &BatchOutcome) {}

    fn epoch_finished(&mut self, _report: &EpochReport) {}
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Logs epoch summaries at `info` and batches at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter {
    epochs: usize,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for LogReporter {
    fn epoch_started(&mut self, epoch: usize, epochs: usize) {
        self.epochs = epochs;
        info!("epoch {}/{}", epoch + 1, epochs);
    }

    fn batch_finished(&mut self, _epoch: usize, batch: usize, batches: usize, outcome: &BatchOutcome) {
        match outcome.accuracy {
            Some(acc) => debug!(
                "batch {}/{} loss={:.6} accuracy={:.4}",
                batch + 1,
                batches,
                outcome.loss,
                acc
            ),
            None => debug!("batch {}/{} loss={:.6}", batch + 1, batches, outcome.loss),
        }
    }

    fn epoch_finished(&mut self, report: &EpochReport) {
        match report.accuracy {
            Some(acc) => info!(
                "epoch {}/{} done: loss={:.6} accuracy={:.4}",
                report.epoch + 1,
                self.epochs,
                report.loss,
                acc
            ),
            None => info!(
                "epoch {}/{} done: loss={:.6}",
                report.epoch + 1,
                self.epochs,
                report.loss
            ),
        }
    }
}

/// Accumulates batch outcomes into an [`EpochReport`].
#[derive(Debug, Default)]
pub(crate) struct EpochAccumulator {
    batches: usize,
    loss: f64,
    accuracy: Option<f64>,
}

impl EpochAccumulator {
    pub(crate) fn add(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        self.loss += outcome.loss;
        if let Some(acc) = outcome.accuracy {
            *self.accuracy.get_or_insert(0.0) += acc;
        }
    }

    pub(crate) fn finish(self, epoch: usize) -> EpochReport {
        let n = self.batches.max(1) as f64;
        EpochReport {
            epoch,
            loss: self.loss / n,
            accuracy: self.accuracy.map(|a| a / n),
        }
    }
}
