//! Mini-batch gradient descent
//!
//! The simplest optimizer: every parameter moves against its gradient by a
//! fixed step.

use crate::layers::UpdateRule;
use crate::optimizers::Optimizer;

/// Mini-batch gradient descent.
///
/// ```text
/// parameter = parameter - learn_rate * gradient
/// ```
///
/// The gradient of each batch is already divided by the batch size when the
/// loss seeds backpropagation, so `learn_rate` does not need rescaling when
/// the batch size changes. A learn rate of zero leaves every parameter
/// exactly as it was.
///
/// # Example
///
/// ```
/// use sequential_nn::optimizers::{MiniBatch, Optimizer};
///
/// let opt = MiniBatch::new(0.05);
/// assert_eq!(opt.header(), "mini 0.05");
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MiniBatch {
    learn_rate: f64,
}

impl MiniBatch {
    pub fn new(learn_rate: f64) -> Self {
        Self { learn_rate }
    }
}

impl Default for MiniBatch {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Optimizer for MiniBatch {
    fn name(&self) -> &'static str {
        "mini"
    }

    fn update_rule(&self, _epoch: usize) -> UpdateRule {
        UpdateRule::MiniBatch {
            learn_rate: self.learn_rate,
        }
    }

    fn learning_rate(&self) -> f64 {
        self.learn_rate
    }

    fn header(&self) -> String {
        format!("mini {}", self.learn_rate)
    }
}
