//! Loss functions and their derivatives with respect to network outputs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};
use crate::matrix::Matrix;

/// Loss functions a network can be compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LossFunction {
    /// `mean((expected - actual)^2)` over the output vector.
    #[default]
    MeanSquaredError,
    /// `-Σ expected · ln(actual)`; expects probabilities (softmax output).
    CrossEntropy,
}

/// Smallest probability cross entropy will take the log of or divide by.
/// Saturated softmax outputs underflow to exactly 0.
const PROBABILITY_FLOOR: f64 = 1e-15;

fn check_lengths(expected: &[f64], actual: &[f64]) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(NetworkError::dimension(format!(
            "expected vector has {} values but the network produced {}",
            expected.len(),
            actual.len()
        )));
    }
    Ok(())
}

impl LossFunction {
    /// Token used in the model file.
    pub fn name(self) -> &'static str {
        match self {
            LossFunction::MeanSquaredError => "meanSquaredError",
            LossFunction::CrossEntropy => "crossEntropy",
        }
    }

    /// Scalar loss of one example.
    pub fn loss(self, expected: &[f64], actual: &[f64]) -> Result<f64> {
        check_lengths(expected, actual)?;
        let value = match self {
            LossFunction::MeanSquaredError => {
                let total: f64 = expected
                    .iter()
                    .zip(actual)
                    .map(|(e, a)| (e - a).powi(2))
                    .sum();
                total / expected.len() as f64
            }
            LossFunction::CrossEntropy => -expected
                .iter()
                .zip(actual)
                // zero targets contribute nothing, even where actual is 0
                .filter(|(e, _)| **e != 0.0)
                .map(|(e, a)| e * a.max(PROBABILITY_FLOOR).ln())
                .sum::<f64>(),
        };
        Ok(value)
    }

    /// Partial derivative of [`loss`](Self::loss) with respect to each output.
    pub fn partial_derivatives(self, expected: &[f64], actual: &[f64]) -> Result<Vec<f64>> {
        check_lengths(expected, actual)?;
        let n = expected.len() as f64;
        let grads = expected
            .iter()
            .zip(actual)
            .map(|(&e, &a)| match self {
                LossFunction::MeanSquaredError => -2.0 * (e - a) / n,
                LossFunction::CrossEntropy if e == 0.0 => 0.0,
                LossFunction::CrossEntropy => -e / a.max(PROBABILITY_FLOOR),
            })
            .collect();
        Ok(grads)
    }

    /// Mean loss over a batch (one example per row).
    pub fn batch_loss(self, expected: &Matrix, actual: &Matrix) -> Result<f64> {
        check_batch(expected, actual)?;
        let mut total = 0.0;
        for (e, a) in expected.row_iter().zip(actual.row_iter()) {
            total += self.loss(e, a)?;
        }
        Ok(total / actual.rows() as f64)
    }

    /// Gradient seed for backpropagation: per-row partial derivatives
    /// divided by the batch size.
    pub fn batch_gradient(self, expected: &Matrix, actual: &Matrix) -> Result<Matrix> {
        check_batch(expected, actual)?;
        let batch = actual.rows() as f64;
        let mut grad = Matrix::zeros(actual.rows(), actual.cols());
        for (r, (e, a)) in expected.row_iter().zip(actual.row_iter()).enumerate() {
            let row = self.partial_derivatives(e, a)?;
            for (slot, g) in grad.row_mut(r).iter_mut().zip(row) {
                *slot = g / batch;
            }
        }
        Ok(grad)
    }
}

fn check_batch(expected: &Matrix, actual: &Matrix) -> Result<()> {
    if expected.shape() != actual.shape() {
        return Err(NetworkError::dimension(format!(
            "expected batch is {}x{} but outputs are {}x{}",
            expected.rows(),
            expected.cols(),
            actual.rows(),
            actual.cols()
        )));
    }
    if actual.rows() == 0 {
        return Err(NetworkError::dimension("empty batch"));
    }
    Ok(())
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LossFunction {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "meanSquaredError" => Ok(LossFunction::MeanSquaredError),
            "crossEntropy" => Ok(LossFunction::CrossEntropy),
            other => Err(NetworkError::invalid_format(format!(
                "loss function '{}' not found",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mse_values() {
        let mse = LossFunction::MeanSquaredError;
        assert_relative_eq!(mse.loss(&[1.0, 0.0], &[0.5, 0.5]).unwrap(), 0.25);
        assert_eq!(
            mse.partial_derivatives(&[1.0, 0.0], &[0.5, 0.5]).unwrap(),
            vec![-0.5, 0.5]
        );
    }

    #[test]
    fn test_cross_entropy_values() {
        let ce = LossFunction::CrossEntropy;
        assert_relative_eq!(
            ce.loss(&[0.0, 1.0, 0.0], &[0.2, 0.5, 0.3]).unwrap(),
            -(0.5f64).ln()
        );
        assert_eq!(
            ce.partial_derivatives(&[0.0, 1.0, 0.0], &[0.2, 0.5, 0.3]).unwrap(),
            vec![0.0, -2.0, 0.0]
        );
        // a zero probability on a zero target is not a NaN
        assert!(ce.loss(&[0.0, 1.0], &[0.0, 1.0]).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        let err = LossFunction::MeanSquaredError.loss(&[1.0], &[1.0, 2.0]);
        assert!(matches!(err, Err(NetworkError::Dimension(_))));
    }

    #[test]
    fn test_batch_gradient_divides_by_batch() {
        let expected = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let actual = Matrix::from_rows(&[vec![0.5, 0.5], vec![0.5, 0.5]]).unwrap();
        let grad = LossFunction::MeanSquaredError
            .batch_gradient(&expected, &actual)
            .unwrap();
        assert_eq!(grad.as_slice(), &[-0.25, 0.25, 0.25, -0.25]);
        assert_relative_eq!(
            LossFunction::MeanSquaredError
                .batch_loss(&expected, &actual)
                .unwrap(),
            0.25
        );
    }

    #[test]
    fn test_parse_names() {
        for loss in [LossFunction::MeanSquaredError, LossFunction::CrossEntropy] {
            assert_eq!(loss.name().parse::<LossFunction>().unwrap(), loss);
        }
        assert!(matches!(
            "hinge".parse::<LossFunction>(),
            Err(NetworkError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_cross_entropy_stays_finite_at_zero_probability() {
        let loss = LossFunction::CrossEntropy;
        let value = loss.loss(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(value.is_finite());
        assert!(value > 30.0);
        let grads = loss.partial_derivatives(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(grads.iter().all(|g| g.is_finite()));
        assert!(grads[0] < 0.0);
        assert_eq!(grads[1], 0.0);
    }
}
