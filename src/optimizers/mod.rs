//! Optimizers and the training loop
//!
//! An optimizer decides how a parameter gradient becomes a parameter change.
//! It does so by producing an [`UpdateRule`] for each epoch, which the
//! network applies to every trainable layer right after that layer's
//! gradient is computed.
//!
//! # Available Optimizers
//!
//! - [`MiniBatch`]: plain gradient descent, `w += -learn_rate * grad`
//! - [`Adam`]: adaptive moment estimation with bias correction
//!
//! The optimizer does not hold a reference to the network it trains.
//! [`Optimizer::train`] receives the network explicitly on every call.
//!
//! # Example
//!
//! ```ignore
//! use sequential_nn::optimizers::{Adam, Optimizer};
//! use sequential_nn::report::SilentReporter;
//!
//! let adam = Adam::default();
//! let reports = adam.train(&mut network, &images, &labels, 32, 5, &mut SilentReporter)?;
//! ```

pub mod adam;
pub mod minibatch;

pub use adam::Adam;
pub use minibatch::MiniBatch;

use tracing::info;

use crate::error::{NetworkError, Result};
use crate::layers::UpdateRule;
use crate::matrix::Matrix;
use crate::network::Network;
use crate::report::{EpochAccumulator, EpochReport, ProgressReporter};
use crate::tensor::Tensor4;

/// Core trait for gradient-descent optimizers.
pub trait Optimizer {
    /// Name used in the model file (`mini`, `adam`).
    fn name(&self) -> &'static str;

    /// The rule applied to every trainable layer during `epoch` (zero-based).
    fn update_rule(&self, epoch: usize) -> UpdateRule;

    /// Base step size.
    fn learning_rate(&self) -> f64;

    /// Optimizer line of the model file, e.g. `mini 0.01`.
    fn header(&self) -> String;

    /// Train `network` on `inputs` / one-hot `labels` for `epochs` passes.
    ///
    /// The corpus is cut into batches of `batch_size` examples (a trailing
    /// partial batch is dropped with a warning). For every batch the network
    /// runs forward, seeds backpropagation with the loss gradient and updates
    /// each trainable layer as soon as its gradient is known.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the network is not compiled or `batch_size` is
    /// invalid, `Dimension` if the inputs or labels do not fit the network.
    fn train(
        &self,
        network: &mut Network,
        inputs: &Tensor4,
        labels: &Matrix,
        batch_size: usize,
        epochs: usize,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<Vec<EpochReport>> {
        network.ensure_compiled()?;
        network.check_inputs(inputs)?;
        let batches = inputs.split_batches(labels, batch_size)?;
        info!(
            "training with {} for {} epochs, {} batches of {}",
            self.header(),
            epochs,
            batches.len(),
            batch_size
        );

        let mut reports = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            let rule = self.update_rule(epoch);
            reporter.epoch_started(epoch, epochs);

            let mut totals = EpochAccumulator::default();
            for (index, (x, y)) in batches.iter().enumerate() {
                let outcome = network.train_batch(x, y, &rule)?;
                reporter.batch_finished(epoch, index, batches.len(), &outcome);
                totals.add(&outcome);
            }

            let report = totals.finish(epoch);
            reporter.epoch_finished(&report);
            reports.push(report);
        }
        Ok(reports)
    }
}

/// The optimizer a network is compiled with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerKind {
    MiniBatch(MiniBatch),
    Adam(Adam),
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adam(Adam::default())
    }
}

impl From<MiniBatch> for OptimizerKind {
    fn from(opt: MiniBatch) -> Self {
        OptimizerKind::MiniBatch(opt)
    }
}

impl From<Adam> for OptimizerKind {
    fn from(opt: Adam) -> Self {
        OptimizerKind::Adam(opt)
    }
}

impl OptimizerKind {
    fn inner(&self) -> &dyn Optimizer {
        match self {
            OptimizerKind::MiniBatch(o) => o,
            OptimizerKind::Adam(o) => o,
        }
    }

    /// Parse the whitespace-split optimizer line of a model file.
    ///
    /// # Errors
    ///
    /// `InvalidFormat` naming the unknown optimizer, or the value that is
    /// missing or not a number.
    pub fn from_tokens(tokens: &[&str]) -> Result<Self> {
        let (name, values) = tokens
            .split_first()
            .ok_or_else(|| NetworkError::invalid_format("missing optimizer line"))?;
        let numbers = values
            .iter()
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| NetworkError::invalid_format(format!("'{}' is not a number", v)))
            })
            .collect::<Result<Vec<f64>>>()?;

        let expect = |count: usize| -> Result<()> {
            if numbers.len() == count {
                Ok(())
            } else {
                Err(NetworkError::invalid_format(format!(
                    "optimizer '{}' takes {} values, found {}",
                    name,
                    count,
                    numbers.len()
                )))
            }
        };
        match *name {
            "mini" => {
                expect(1)?;
                Ok(MiniBatch::new(numbers[0]).into())
            }
            "adam" => {
                expect(4)?;
                Ok(Adam::new(numbers[0], numbers[1], numbers[2], numbers[3]).into())
            }
            other => Err(NetworkError::invalid_format(format!(
                "optimizer '{}' not found",
                other
            ))),
        }
    }
}

impl Optimizer for OptimizerKind {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn update_rule(&self, epoch: usize) -> UpdateRule {
        self.inner().update_rule(epoch)
    }

    fn learning_rate(&self) -> f64 {
        self.inner().learning_rate()
    }

    fn header(&self) -> String {
        self.inner().header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_adam() {
        let opt = OptimizerKind::default();
        assert_eq!(opt.name(), "adam");
        assert_eq!(opt.learning_rate(), 0.001);
    }

    #[test]
    fn test_from_tokens() {
        let mini = OptimizerKind::from_tokens(&["mini", "0.5"]).unwrap();
        assert_eq!(mini, OptimizerKind::MiniBatch(MiniBatch::new(0.5)));

        let adam = OptimizerKind::from_tokens(&["adam", "0.01", "0.8", "0.99", "1e-7"]).unwrap();
        assert_eq!(adam, OptimizerKind::Adam(Adam::new(0.01, 0.8, 0.99, 1e-7)));
    }

    #[test]
    fn test_from_tokens_errors() {
        for tokens in [
            vec!["sgd", "0.1"],
            vec!["mini"],
            vec!["mini", "fast"],
            vec!["adam", "0.1", "0.9"],
        ] {
            assert!(matches!(
                OptimizerKind::from_tokens(&tokens),
                Err(NetworkError::InvalidFormat(_))
            ));
        }
        let err = OptimizerKind::from_tokens(&["sgd"]).unwrap_err();
        assert!(err.to_string().contains("sgd"));
    }

    #[test]
    fn test_header_round_trips() {
        for opt in [
            OptimizerKind::from(MiniBatch::new(0.25)),
            OptimizerKind::from(Adam::new(0.002, 0.85, 0.995, 1e-9)),
        ] {
            let header = opt.header();
            let tokens: Vec<&str> = header.split_whitespace().collect();
            assert_eq!(OptimizerKind::from_tokens(&tokens).unwrap(), opt);
        }
    }

    #[test]
    fn test_dispatch_reaches_inner_optimizer() {
        let opt = OptimizerKind::from(MiniBatch::new(0.3));
        assert_eq!(opt.learning_rate(), 0.3);
        assert_eq!(opt.update_rule(4), UpdateRule::MiniBatch { learn_rate: 0.3 });
    }
}
