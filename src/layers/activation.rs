//! Activation layers: ReLU, sigmoid and softmax.
//!
//! None of these own parameters or change shape. ReLU and sigmoid act
//! element-wise and differentiate at the pre-activation input; softmax acts
//! per row and differentiates through its own output.

use crate::error::{NetworkError, Result};
use crate::layers::{ForwardPass, Gradients, Layer, LayerKind};
use crate::matrix::Matrix;
use crate::tensor::Shape3;

/// Logistic function `1 / (1 + e^-x)`.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Normalized exponential of one row. Subtracting the row maximum keeps
/// `exp` finite without changing the result.
pub fn softmax(row: &[f64]) -> Vec<f64> {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = row.iter().map(|&v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Softmax Jacobian for one output row: `J[i][j] = s_i (δ_ij - s_j)`.
pub fn softmax_jacobian(s: &[f64]) -> Matrix {
    let n = s.len();
    let mut jacobian = Matrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let value = if i == j {
                s[i] * (1.0 - s[i])
            } else {
                -s[i] * s[j]
            };
            jacobian.set(i, j, value);
        }
    }
    jacobian
}

fn check_input(shape: Shape3, input: &Matrix, name: &str) -> Result<()> {
    if input.cols() != shape.size() {
        return Err(NetworkError::dimension(format!(
            "{} layer expects rows of length {}, got {}",
            name,
            shape.size(),
            input.cols()
        )));
    }
    Ok(())
}

fn check_same_shape(grad: &Matrix, other: &Matrix, name: &str) -> Result<()> {
    if grad.shape() != other.shape() {
        return Err(NetworkError::dimension(format!(
            "{}: gradient is {}x{} but layer input is {}x{}",
            name,
            grad.rows(),
            grad.cols(),
            other.rows(),
            other.cols()
        )));
    }
    Ok(())
}

/// Rectified linear unit, `max(0, x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReluLayer {
    shape: Shape3,
}

impl ReluLayer {
    pub fn new(shape: Shape3) -> Self {
        Self { shape }
    }
}

impl Layer for ReluLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Relu
    }

    fn in_shape(&self) -> Shape3 {
        self.shape
    }

    fn out_shape(&self) -> Shape3 {
        self.shape
    }

    fn forward(&self, input: &Matrix) -> Result<ForwardPass> {
        check_input(self.shape, input, "relu")?;
        Ok(ForwardPass::new(input.map(|v| v.max(0.0))))
    }

    fn backward(&self, grad_output: &Matrix, input: &Matrix, _pass: &ForwardPass) -> Result<Gradients> {
        check_same_shape(grad_output, input, "relu")?;
        let mut grad = grad_output.clone();
        for (g, &x) in grad.as_mut_slice().iter_mut().zip(input.as_slice()) {
            if x <= 0.0 {
                *g = 0.0;
            }
        }
        Ok(Gradients::input_only(grad))
    }

    fn describe(&self) -> String {
        format!("Relu activation: {}", self.shape)
    }
}

/// Logistic sigmoid.
#[derive(Debug, Clone, PartialEq)]
pub struct SigmoidLayer {
    shape: Shape3,
}

impl SigmoidLayer {
    pub fn new(shape: Shape3) -> Self {
        Self { shape }
    }
}

impl Layer for SigmoidLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Sigmoid
    }

    fn in_shape(&self) -> Shape3 {
        self.shape
    }

    fn out_shape(&self) -> Shape3 {
        self.shape
    }

    fn forward(&self, input: &Matrix) -> Result<ForwardPass> {
        check_input(self.shape, input, "sigmoid")?;
        Ok(ForwardPass::new(input.map(sigmoid)))
    }

    fn backward(&self, grad_output: &Matrix, input: &Matrix, _pass: &ForwardPass) -> Result<Gradients> {
        check_same_shape(grad_output, input, "sigmoid")?;
        let mut grad = grad_output.clone();
        for (g, &x) in grad.as_mut_slice().iter_mut().zip(input.as_slice()) {
            let s = sigmoid(x);
            *g *= s * (1.0 - s);
        }
        Ok(Gradients::input_only(grad))
    }

    fn describe(&self) -> String {
        format!("Sigmoid activation: {}", self.shape)
    }
}

/// Row-wise softmax.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxLayer {
    shape: Shape3,
}

impl SoftmaxLayer {
    pub fn new(shape: Shape3) -> Self {
        Self { shape }
    }
}

impl Layer for SoftmaxLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Softmax
    }

    fn in_shape(&self) -> Shape3 {
        self.shape
    }

    fn out_shape(&self) -> Shape3 {
        self.shape
    }

    fn forward(&self, input: &Matrix) -> Result<ForwardPass> {
        check_input(self.shape, input, "softmax")?;
        let mut out = Matrix::zeros(input.rows(), input.cols());
        for (r, row) in input.row_iter().enumerate() {
            out.row_mut(r).copy_from_slice(&softmax(row));
        }
        Ok(ForwardPass::new(out))
    }

    fn backward(&self, grad_output: &Matrix, _input: &Matrix, pass: &ForwardPass) -> Result<Gradients> {
        let output = pass.output();
        check_same_shape(grad_output, output, "softmax")?;
        let mut grad = Matrix::zeros(grad_output.rows(), grad_output.cols());
        for r in 0..output.rows() {
            let jacobian = softmax_jacobian(output.row(r));
            let upstream = Matrix::row_vector(grad_output.row(r).to_vec());
            let row = upstream.multiply(&jacobian)?;
            grad.row_mut(r).copy_from_slice(row.as_slice());
        }
        Ok(Gradients::input_only(grad))
    }

    fn describe(&self) -> String {
        format!("Softmax activation: {}", self.shape)
    }
}
