//! Parameter matrices with Adam moment state, and the update rules applied to them.

use crate::error::{NetworkError, Result};
use crate::matrix::Matrix;

/// How a parameter gradient is turned into a parameter change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateRule {
    /// `params += -learn_rate * grad`
    MiniBatch { learn_rate: f64 },
    /// Adam with the bias-correction powers `beta1^t` and `beta2^t` for the
    /// current step already computed by the caller.
    Adam {
        alpha: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
        beta1_power: f64,
        beta2_power: f64,
    },
}

/// A layer's parameter matrix plus its first and second moment estimates.
///
/// Moments are zero at construction and change only through Adam updates.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    values: Matrix,
    first_moment: Matrix,
    second_moment: Matrix,
}

impl Parameters {
    pub fn new(values: Matrix) -> Self {
        let (rows, cols) = values.shape();
        Self {
            values,
            first_moment: Matrix::zeros(rows, cols),
            second_moment: Matrix::zeros(rows, cols),
        }
    }

    pub fn values(&self) -> &Matrix {
        &self.values
    }

    pub fn first_moment(&self) -> &Matrix {
        &self.first_moment
    }

    pub fn second_moment(&self) -> &Matrix {
        &self.second_moment
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace the values, keeping the shape. Moments are left untouched.
    pub fn replace(&mut self, values: Matrix) -> Result<()> {
        if values.shape() != self.values.shape() {
            return Err(NetworkError::dimension(format!(
                "parameter matrix must be {}x{}, got {}x{}",
                self.values.rows(),
                self.values.cols(),
                values.rows(),
                values.cols()
            )));
        }
        self.values = values;
        Ok(())
    }

    /// Apply `rule` using `grad`, which must have the parameter shape.
    pub fn apply(&mut self, grad: &Matrix, rule: &UpdateRule) -> Result<()> {
        if grad.shape() != self.values.shape() {
            return Err(NetworkError::dimension(format!(
                "parameter gradient is {}x{}, parameters are {}x{}",
                grad.rows(),
                grad.cols(),
                self.values.rows(),
                self.values.cols()
            )));
        }
        match *rule {
            UpdateRule::MiniBatch { learn_rate } => {
                let mut step = grad.clone();
                step.scale(-learn_rate);
                self.values.add_assign_elementwise(&step)
            }
            UpdateRule::Adam {
                alpha,
                beta1,
                beta2,
                epsilon,
                beta1_power,
                beta2_power,
            } => {
                let step_size = alpha * (1.0 - beta2_power).sqrt() / (1.0 - beta1_power);
                let values = self.values.as_mut_slice();
                let m = self.first_moment.as_mut_slice();
                let v = self.second_moment.as_mut_slice();
                for (i, &g) in grad.as_slice().iter().enumerate() {
                    m[i] = beta1 * m[i] + (1.0 - beta1) * g;
                    v[i] = beta2 * v[i] + (1.0 - beta2) * g * g;
                    values[i] -= step_size * m[i] / (v[i].sqrt() + epsilon);
                }
                Ok(())
            }
        }
    }
}
