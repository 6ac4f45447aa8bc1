//! Adam (Adaptive Moment Estimation) optimizer
//!
//! The moment estimates live with each layer's parameters (see
//! [`Parameters`](crate::layers::Parameters)); this type only carries the
//! hyperparameters and computes the bias-correction powers.

use crate::layers::UpdateRule;
use crate::optimizers::Optimizer;

/// Adam optimizer.
///
/// For every parameter, with gradient `g`:
///
/// ```text
/// m = β1 * m + (1 - β1) * g
/// v = β2 * v + (1 - β2) * g²
/// parameter -= α * sqrt(1 - β2^t) / (1 - β1^t) * m / (sqrt(v) + ε)
/// ```
///
/// `t` is the one-based epoch number. All batches of one epoch share the same
/// bias-correction powers `β1^t` and `β2^t`.
///
/// # Example
///
/// ```
/// use sequential_nn::layers::UpdateRule;
/// use sequential_nn::optimizers::{Adam, Optimizer};
///
/// let adam = Adam::default();
/// match adam.update_rule(1) {
///     UpdateRule::Adam { beta1_power, .. } => assert!((beta1_power - 0.81).abs() < 1e-12),
///     _ => unreachable!(),
/// }
/// ```
///
/// # Reference
///
/// Kingma, D. P., & Ba, J. (2014). Adam: A method for stochastic optimization.
/// arXiv preprint arXiv:1412.6980.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adam {
    alpha: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
}

impl Adam {
    pub fn new(alpha: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            alpha,
            beta1,
            beta2,
            epsilon,
        }
    }

    /// Default betas and epsilon with a custom step size.
    pub fn with_alpha(alpha: f64) -> Self {
        Self {
            alpha,
            ..Self::default()
        }
    }

    pub fn beta1(&self) -> f64 {
        self.beta1
    }

    pub fn beta2(&self) -> f64 {
        self.beta2
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.001, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "adam"
    }

    fn update_rule(&self, epoch: usize) -> UpdateRule {
        let t = i32::try_from(epoch + 1).unwrap_or(i32::MAX);
        UpdateRule::Adam {
            alpha: self.alpha,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            beta1_power: self.beta1.powi(t),
            beta2_power: self.beta2.powi(t),
        }
    }

    fn learning_rate(&self) -> f64 {
        self.alpha
    }

    fn header(&self) -> String {
        format!(
            "adam {} {} {} {}",
            self.alpha, self.beta1, self.beta2, self.epsilon
        )
    }
}
