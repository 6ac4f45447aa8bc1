//! Layer capability trait and the values threaded between forward and backward.
//!
//! A forward call returns a [`ForwardPass`] instead of mutating the layer. The
//! caller keeps it and hands it back to [`Layer::backward`] together with the
//! batch that produced it, which makes the "backward needs the matching
//! forward" contract visible in the types.

use crate::error::Result;
use crate::matrix::Matrix;
use crate::tensor::Shape3;

/// Tag identifying a layer variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Relu,
    Sigmoid,
    Softmax,
    Dense,
    Conv,
    MaxPool,
}

impl LayerKind {
    /// Pure element/row-wise activations carry no parameters and never
    /// change the shape.
    pub fn is_activation(self) -> bool {
        matches!(self, LayerKind::Relu | LayerKind::Sigmoid | LayerKind::Softmax)
    }

    /// Layers holding a parameter matrix.
    pub fn is_trainable(self) -> bool {
        matches!(self, LayerKind::Dense | LayerKind::Conv)
    }

    /// Dense, Conv and MaxPool: the layers that transform shape.
    pub fn is_transformation(self) -> bool {
        !self.is_activation()
    }

    /// Token used in the model file.
    pub fn token(self) -> &'static str {
        match self {
            LayerKind::Relu => "relu",
            LayerKind::Sigmoid => "sigmoid",
            LayerKind::Softmax => "softmax",
            LayerKind::Dense => "dense",
            LayerKind::Conv => "conv",
            LayerKind::MaxPool => "maxpool",
        }
    }
}

/// Output of one layer for one batch.
///
/// Valid only for the batch it was produced from. Max-pooling layers also
/// record which window column won each output position; backward routes
/// gradient through exactly those positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardPass {
    output: Matrix,
    argmax: Option<Vec<usize>>,
}

impl ForwardPass {
    pub fn new(output: Matrix) -> Self {
        Self {
            output,
            argmax: None,
        }
    }

    pub(crate) fn with_argmax(output: Matrix, argmax: Vec<usize>) -> Self {
        Self {
            output,
            argmax: Some(argmax),
        }
    }

    /// Layer output, one row per batch example.
    pub fn output(&self) -> &Matrix {
        &self.output
    }

    pub fn into_output(self) -> Matrix {
        self.output
    }

    /// Winning window column per `(batch row, output position)`, row-major.
    pub fn argmax(&self) -> Option<&[usize]> {
        self.argmax.as_deref()
    }
}

/// Result of a backward call.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    /// Gradient of the loss with respect to the layer input (batch × in size).
    pub input: Matrix,
    /// Gradient with respect to the parameter matrix, for layers that have one.
    pub parameters: Option<Matrix>,
}

impl Gradients {
    pub fn input_only(input: Matrix) -> Self {
        Self {
            input,
            parameters: None,
        }
    }
}

/// Capabilities shared by every layer variant.
///
/// Inputs and outputs are batches: one flattened example per matrix row,
/// depth-major (`depth`, then `row`, then `col`).
pub trait Layer {
    /// Variant tag.
    fn kind(&self) -> LayerKind;

    /// Shape of one incoming example. Fixed at construction.
    fn in_shape(&self) -> Shape3;

    /// Shape of one outgoing example.
    fn out_shape(&self) -> Shape3;

    /// Forward propagation of a batch.
    ///
    /// # Errors
    ///
    /// `Dimension` if `input.cols()` does not match `in_shape().size()`.
    fn forward(&self, input: &Matrix) -> Result<ForwardPass>;

    /// Backward propagation of a batch.
    ///
    /// # Arguments
    ///
    /// * `grad_output` - Gradient of the loss w.r.t. this layer's output
    /// * `input` - The batch given to the matching `forward` call
    /// * `pass` - The value that `forward` returned for `input`
    ///
    /// # Errors
    ///
    /// `Dimension` on any shape mismatch between the three arguments.
    fn backward(&self, grad_output: &Matrix, input: &Matrix, pass: &ForwardPass) -> Result<Gradients>;

    /// Number of trainable scalars, including biases.
    fn parameter_count(&self) -> usize {
        0
    }

    /// Model-file header line for this layer (without trailing newline).
    fn header(&self) -> String {
        self.kind().token().to_string()
    }

    /// One-line human readable summary.
    fn describe(&self) -> String;
}
