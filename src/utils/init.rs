//! He-normal weight initialization.

use crate::error::{NetworkError, Result};
use crate::matrix::Matrix;
use crate::utils::SimpleRng;

/// He-normal sampler: `N(0, 2 / fan_in)`.
///
/// # Example
///
/// ```
/// use sequential_nn::utils::{HeNormal, SimpleRng};
///
/// let mut rng = SimpleRng::new(7);
/// let init = HeNormal::new(784);
/// let w = init.sample(&mut rng).unwrap();
/// assert!(w.is_finite());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HeNormal {
    fan_in: usize,
}

impl HeNormal {
    pub fn new(fan_in: usize) -> Self {
        Self { fan_in }
    }

    pub fn fan_in(&self) -> usize {
        self.fan_in
    }

    pub fn set_fan_in(&mut self, fan_in: usize) {
        self.fan_in = fan_in;
    }

    /// Standard deviation `sqrt(2 / fan_in)`.
    pub fn std_dev(&self) -> f64 {
        (2.0 / self.fan_in as f64).sqrt()
    }

    /// Draw one weight.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the fan-in has not been set.
    pub fn sample(&self, rng: &mut SimpleRng) -> Result<f64> {
        if self.fan_in == 0 {
            return Err(NetworkError::invalid_operation(
                "weight initialization attempted before fan-in was set",
            ));
        }
        Ok(rng.next_gaussian() * self.std_dev())
    }

    /// Parameter matrix of `rows × cols` whose last row (the bias row) is
    /// zero and whose other rows are He-normal samples.
    pub fn parameter_matrix(&self, rows: usize, cols: usize, rng: &mut SimpleRng) -> Result<Matrix> {
        let mut params = Matrix::try_zeros(rows, cols)?;
        for r in 0..rows.saturating_sub(1) {
            for value in params.row_mut(r) {
                *value = self.sample(rng)?;
            }
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fan_in_fails() {
        let mut rng = SimpleRng::new(1);
        let init = HeNormal::default();
        assert!(matches!(
            init.sample(&mut rng),
            Err(NetworkError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_parameter_matrix_bias_row_zero() {
        let mut rng = SimpleRng::new(42);
        let params = HeNormal::new(10).parameter_matrix(11, 4, &mut rng).unwrap();

        assert_eq!(params.shape(), (11, 4));
        assert!(params.row(10).iter().all(|&b| b == 0.0));
        assert!(params.row(0).iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_sample_spread_matches_fan_in() {
        let mut rng = SimpleRng::new(99);
        let init = HeNormal::new(50);
        let n = 10_000;
        let var = (0..n)
            .map(|_| init.sample(&mut rng).unwrap().powi(2))
            .sum::<f64>()
            / n as f64;
        assert!((var - 2.0 / 50.0).abs() < 0.005, "variance {}", var);
    }
}
