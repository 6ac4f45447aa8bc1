//! Training and evaluation metrics beyond the loss itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};
use crate::matrix::{argmax, Matrix};

/// Metrics a network can track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Fraction of examples whose highest output matches the one-hot label.
    Accuracy,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("accuracy") {
            Ok(Metric::Accuracy)
        } else {
            Err(NetworkError::invalid_format(format!("metric '{}' not found", s)))
        }
    }
}

/// Whether the highest entry of `actual` sits where `expected` holds a 1.
pub fn is_correct(actual: &[f64], expected: &[f64]) -> Result<bool> {
    if actual.len() != expected.len() || actual.is_empty() {
        return Err(NetworkError::dimension(format!(
            "cannot score {} outputs against {} labels",
            actual.len(),
            expected.len()
        )));
    }
    Ok(expected[argmax(actual)] == 1.0)
}

/// Fraction of correctly classified rows.
pub fn batch_accuracy(actual: &Matrix, expected: &Matrix) -> Result<f64> {
    if actual.shape() != expected.shape() || actual.rows() == 0 {
        return Err(NetworkError::dimension(format!(
            "outputs are {}x{} but labels are {}x{}",
            actual.rows(),
            actual.cols(),
            expected.rows(),
            expected.cols()
        )));
    }
    let mut correct = 0usize;
    for (a, e) in actual.row_iter().zip(expected.row_iter()) {
        if is_correct(a, e)? {
            correct += 1;
        }
    }
    Ok(correct as f64 / actual.rows() as f64)
}
