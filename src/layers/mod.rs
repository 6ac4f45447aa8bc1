//! Layer abstractions for sequential networks
//!
//! Every layer implements the [`Layer`] capability trait. A network stores
//! them as [`NetLayer`], a tagged enum that dispatches on the variant and
//! gives the optimizers access to the trainable ones.

mod r#trait;
pub mod activation;
pub mod conv;
pub mod dense;
pub mod index_map;
pub mod params;
pub mod pool;

pub use activation::{ReluLayer, SigmoidLayer, SoftmaxLayer};
pub use conv::ConvLayer;
pub use dense::DenseLayer;
pub use index_map::{IndexMap, MapEntry, Window};
pub use params::{Parameters, UpdateRule};
pub use pool::MaxPoolLayer;
pub use r#trait::{ForwardPass, Gradients, Layer, LayerKind};

use crate::error::Result;
use crate::matrix::Matrix;
use crate::tensor::Shape3;

/// Activation choices accepted when assembling a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Sigmoid,
    Softmax,
}

impl Activation {
    /// Build the activation layer for `shape`.
    pub fn layer(self, shape: Shape3) -> NetLayer {
        match self {
            Activation::Relu => NetLayer::Relu(ReluLayer::new(shape)),
            Activation::Sigmoid => NetLayer::Sigmoid(SigmoidLayer::new(shape)),
            Activation::Softmax => NetLayer::Softmax(SoftmaxLayer::new(shape)),
        }
    }
}

/// One layer of a network, tagged by variant.
#[derive(Debug, Clone, PartialEq)]
pub enum NetLayer {
    Relu(ReluLayer),
    Sigmoid(SigmoidLayer),
    Softmax(SoftmaxLayer),
    Dense(DenseLayer),
    Conv(ConvLayer),
    MaxPool(MaxPoolLayer),
}

impl NetLayer {
    fn as_layer(&self) -> &dyn Layer {
        match self {
            NetLayer::Relu(l) => l,
            NetLayer::Sigmoid(l) => l,
            NetLayer::Softmax(l) => l,
            NetLayer::Dense(l) => l,
            NetLayer::Conv(l) => l,
            NetLayer::MaxPool(l) => l,
        }
    }

    /// Parameter matrix of a Dense or Conv layer.
    pub fn parameters(&self) -> Option<&Matrix> {
        match self {
            NetLayer::Dense(l) => Some(l.weights()),
            NetLayer::Conv(l) => Some(l.filters()),
            _ => None,
        }
    }

    /// Full parameter state (values and moments) of a Dense or Conv layer.
    pub fn parameter_state(&self) -> Option<&Parameters> {
        match self {
            NetLayer::Dense(l) => Some(l.params()),
            NetLayer::Conv(l) => Some(l.params()),
            _ => None,
        }
    }

    /// Replace the parameter matrix. Layers without parameters accept only
    /// an empty matrix.
    pub fn set_parameters(&mut self, values: Matrix) -> Result<()> {
        match self {
            NetLayer::Dense(l) => l.set_weights(values),
            NetLayer::Conv(l) => l.set_filters(values),
            _ if values.is_empty() => Ok(()),
            _ => Err(crate::error::NetworkError::invalid_operation(format!(
                "{} layers have no parameters",
                self.kind().token()
            ))),
        }
    }

    /// Apply a parameter gradient. No-op for layers without parameters.
    pub fn update(&mut self, grad: &Matrix, rule: &UpdateRule) -> Result<()> {
        match self {
            NetLayer::Dense(l) => l.update(grad, rule),
            NetLayer::Conv(l) => l.update(grad, rule),
            _ => Ok(()),
        }
    }
}

impl Layer for NetLayer {
    fn kind(&self) -> LayerKind {
        self.as_layer().kind()
    }

    fn in_shape(&self) -> Shape3 {
        self.as_layer().in_shape()
    }

    fn out_shape(&self) -> Shape3 {
        self.as_layer().out_shape()
    }

    fn forward(&self, input: &Matrix) -> Result<ForwardPass> {
        self.as_layer().forward(input)
    }

    fn backward(&self, grad_output: &Matrix, input: &Matrix, pass: &ForwardPass) -> Result<Gradients> {
        self.as_layer().backward(grad_output, input, pass)
    }

    fn parameter_count(&self) -> usize {
        self.as_layer().parameter_count()
    }

    fn header(&self) -> String {
        self.as_layer().header()
    }

    fn describe(&self) -> String {
        self.as_layer().describe()
    }
}
