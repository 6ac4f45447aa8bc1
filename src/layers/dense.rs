//! Dense (fully connected) layer implementation
//!
//! The bias is folded into the weight matrix as its last row, so the forward
//! pass is a single product: `[x | 1] · W`.

use crate::error::{NetworkError, Result};
use crate::layers::params::{Parameters, UpdateRule};
use crate::layers::{ForwardPass, Gradients, Layer, LayerKind};
use crate::matrix::Matrix;
use crate::tensor::Shape3;
use crate::utils::{HeNormal, SimpleRng};

/// Dense layer with weights and biases in one `(fan_in + 1) × nodes` matrix.
///
/// # Example
///
/// ```
/// use sequential_nn::layers::{DenseLayer, Layer};
/// use sequential_nn::tensor::Shape3;
/// use sequential_nn::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DenseLayer::new(10, Shape3::new(1, 28, 28), &mut rng).unwrap();
/// assert_eq!(layer.out_shape(), Shape3::new(1, 1, 10));
/// assert_eq!(layer.parameter_count(), 785 * 10);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DenseLayer {
    in_shape: Shape3,
    nodes: usize,
    params: Parameters,
}

impl DenseLayer {
    /// Create a dense layer with He-normal weights (fan-in = input size) and
    /// zero biases.
    ///
    /// # Errors
    ///
    /// `Dimension` if `nodes` or the input size is zero.
    pub fn new(nodes: usize, in_shape: Shape3, rng: &mut SimpleRng) -> Result<Self> {
        let fan_in = in_shape.checked_size()?;
        if nodes == 0 || fan_in == 0 {
            return Err(NetworkError::dimension(format!(
                "dense layer needs positive sizes, got {} nodes from input {}",
                nodes, in_shape
            )));
        }
        let weights = HeNormal::new(fan_in).parameter_matrix(fan_in + 1, nodes, rng)?;
        Ok(Self {
            in_shape,
            nodes,
            params: Parameters::new(weights),
        })
    }

    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Weight matrix; the last row holds the biases.
    pub fn weights(&self) -> &Matrix {
        self.params.values()
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Overwrite the weight matrix (shape must match).
    pub fn set_weights(&mut self, weights: Matrix) -> Result<()> {
        self.params.replace(weights)
    }

    /// Apply a parameter gradient from [`Layer::backward`].
    pub fn update(&mut self, grad: &Matrix, rule: &UpdateRule) -> Result<()> {
        self.params.apply(grad, rule)
    }
}

impl Layer for DenseLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Dense
    }

    fn in_shape(&self) -> Shape3 {
        self.in_shape
    }

    fn out_shape(&self) -> Shape3 {
        Shape3::new(1, 1, self.nodes)
    }

    fn forward(&self, input: &Matrix) -> Result<ForwardPass> {
        if input.cols() != self.in_shape.size() {
            return Err(NetworkError::dimension(format!(
                "dense layer expects rows of length {}, got {}",
                self.in_shape.size(),
                input.cols()
            )));
        }
        let output = input.append_ones_column().multiply(self.params.values())?;
        Ok(ForwardPass::new(output))
    }

    fn backward(&self, grad_output: &Matrix, input: &Matrix, _pass: &ForwardPass) -> Result<Gradients> {
        if grad_output.rows() != input.rows() {
            return Err(NetworkError::dimension(format!(
                "dense: gradient batch of {} rows but input batch of {}",
                grad_output.rows(),
                input.rows()
            )));
        }
        let weights = self.params.values();
        let input_grad = grad_output.multiply(&weights.without_last_row().transpose())?;
        let param_grad = input.append_ones_column().transpose().multiply(grad_output)?;
        Ok(Gradients {
            input: input_grad,
            parameters: Some(param_grad),
        })
    }

    fn parameter_count(&self) -> usize {
        self.params.len()
    }

    fn header(&self) -> String {
        format!("dense -n {}", self.nodes)
    }

    fn describe(&self) -> String {
        format!(
            "Dense layer: {} nodes. In: {} Out: {}",
            self.nodes,
            self.in_shape,
            self.out_shape()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_layer() -> DenseLayer {
        let mut rng = SimpleRng::new(42);
        let mut layer = DenseLayer::new(2, Shape3::new(1, 1, 3), &mut rng).unwrap();
        let weights = Matrix::from_rows(&[
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, -1.0],
            vec![0.5, 0.25],
        ])
        .unwrap();
        layer.set_weights(weights).unwrap();
        layer
    }

    #[test]
    fn test_dense_layer_creation() {
        let mut rng = SimpleRng::new(42);
        let layer = DenseLayer::new(5, Shape3::new(1, 1, 10), &mut rng).unwrap();

        assert_eq!(layer.in_shape().size(), 10);
        assert_eq!(layer.out_shape(), Shape3::new(1, 1, 5));
        assert_eq!(layer.weights().shape(), (11, 5));
        assert!(layer.weights().row(10).iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_deterministic_initialization() {
        let mut rng1 = SimpleRng::new(42);
        let layer1 = DenseLayer::new(5, Shape3::new(1, 1, 10), &mut rng1).unwrap();

        let mut rng2 = SimpleRng::new(42);
        let layer2 = DenseLayer::new(5, Shape3::new(1, 1, 10), &mut rng2).unwrap();

        assert_eq!(layer1.weights(), layer2.weights());
    }

    #[test]
    fn test_forward_known_values() {
        let layer = fixed_layer();
        let input = Matrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![0.0, 0.0, 0.0]]).unwrap();
        let pass = layer.forward(&input).unwrap();

        assert_eq!(pass.output().shape(), (2, 2));
        assert_eq!(pass.output().row(0), &[4.5, -0.75]);
        assert_eq!(pass.output().row(1), &[0.5, 0.25]);
    }

    #[test]
    fn test_backward_gradients() {
        let layer = fixed_layer();
        let input = Matrix::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        let pass = layer.forward(&input).unwrap();
        let grad = Matrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let back = layer.backward(&grad, &input, &pass).unwrap();

        assert_eq!(back.input.as_slice(), &[1.0, 2.0, -1.0]);
        let params = back.parameters.unwrap();
        assert_eq!(params.shape(), (4, 2));
        assert_eq!(params.row(3), &[1.0, 2.0]);
        assert_eq!(params.row(2), &[3.0, 6.0]);
    }

    #[test]
    fn test_backward_batch_mismatch() {
        let layer = fixed_layer();
        let input = Matrix::zeros(2, 3);
        let pass = layer.forward(&input).unwrap();
        assert!(matches!(
            layer.backward(&Matrix::zeros(1, 2), &input, &pass),
            Err(NetworkError::Dimension(_))
        ));
    }

    #[test]
    fn test_zero_nodes_rejected() {
        let mut rng = SimpleRng::new(1);
        assert!(DenseLayer::new(0, Shape3::new(1, 1, 3), &mut rng).is_err());
    }
}
