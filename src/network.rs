//! Sequential network container
//!
//! A [`Network`] is an ordered list of layers plus the loss, optimizer and
//! metrics it was compiled with. Assembly enforces a few shape rules:
//!
//! - only the first layer takes an explicit input shape; every later layer
//!   reads it from its predecessor's output shape,
//! - the first layer cannot be an activation,
//! - a Dense, Conv or MaxPool layer added directly after a Dense or Conv
//!   layer gets a Relu inserted in between,
//! - compiling a network whose last layer is Dense appends a Softmax.
//!
//! Training fuses backpropagation and the parameter update: each trainable
//! layer is updated as soon as its gradient is known, walking from the last
//! layer to the first.

use tracing::{debug, info};

use crate::config::{validate_config, TrainingConfig};
use crate::error::{NetworkError, Result};
use crate::layers::{
    Activation, ConvLayer, DenseLayer, ForwardPass, Layer, LayerKind, MaxPoolLayer, NetLayer,
    UpdateRule, Window,
};
use crate::loss::LossFunction;
use crate::matrix::Matrix;
use crate::metrics::{batch_accuracy, Metric};
use crate::optimizers::{Optimizer, OptimizerKind};
use crate::report::{BatchOutcome, EpochReport, LogReporter, ProgressReporter};
use crate::tensor::{Shape3, Tensor4};
use crate::utils::SimpleRng;

/// Loss (and accuracy, when tracked) of a network on a labelled corpus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: Option<f64>,
}

/// A sequential network.
///
/// # Example
///
/// ```
/// use sequential_nn::layers::Window;
/// use sequential_nn::loss::LossFunction;
/// use sequential_nn::metrics::Metric;
/// use sequential_nn::network::Network;
/// use sequential_nn::optimizers::MiniBatch;
/// use sequential_nn::tensor::Shape3;
///
/// let mut net = Network::with_seed(7);
/// net.add_conv(4, Window::new(3, 3), Some(Shape3::new(1, 8, 8)), None, None).unwrap();
/// net.add_max_pool(Window::new(2, 2), None, None).unwrap();
/// net.add_dense(10, None, None).unwrap();
/// net.compile(LossFunction::CrossEntropy, MiniBatch::new(0.1), &[Metric::Accuracy]).unwrap();
///
/// // conv, relu, maxpool, dense, softmax
/// assert_eq!(net.layers().len(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<NetLayer>,
    loss: LossFunction,
    optimizer: OptimizerKind,
    metrics: Vec<Metric>,
    compiled: bool,
    rng: SimpleRng,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    /// Empty network with weights seeded from the clock.
    pub fn new() -> Self {
        Self::from_rng(SimpleRng::from_time())
    }

    /// Empty network with reproducible weight initialization.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(SimpleRng::new(seed))
    }

    fn from_rng(rng: SimpleRng) -> Self {
        Self {
            layers: Vec::new(),
            loss: LossFunction::default(),
            optimizer: OptimizerKind::default(),
            metrics: Vec::new(),
            compiled: false,
            rng,
        }
    }

    // ------------------------------------------------------------------
    // Assembly
    // ------------------------------------------------------------------

    /// Append a dense layer of `nodes` outputs.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if `in_shape` is missing for the first layer or
    /// given for a later one; `Dimension` for zero sizes.
    pub fn add_dense(
        &mut self,
        nodes: usize,
        in_shape: Option<Shape3>,
        activation: Option<Activation>,
    ) -> Result<()> {
        let (in_shape, needs_relu) = self.next_in_shape(in_shape)?;
        let layer = DenseLayer::new(nodes, in_shape, &mut self.rng)?;
        self.push_transformation(NetLayer::Dense(layer), needs_relu);
        self.push_activation(activation);
        Ok(())
    }

    /// Append a convolution layer with `num_filters` filters of `window`.
    /// `stride` defaults to 1×1.
    pub fn add_conv(
        &mut self,
        num_filters: usize,
        window: Window,
        in_shape: Option<Shape3>,
        stride: Option<Window>,
        activation: Option<Activation>,
    ) -> Result<()> {
        let (in_shape, needs_relu) = self.next_in_shape(in_shape)?;
        let stride = stride.unwrap_or(Window::new(1, 1));
        let layer = ConvLayer::new(num_filters, window, stride, in_shape, &mut self.rng)?;
        self.push_transformation(NetLayer::Conv(layer), needs_relu);
        self.push_activation(activation);
        Ok(())
    }

    /// Append a max-pooling layer. `stride` defaults to the window, giving
    /// non-overlapping windows.
    pub fn add_max_pool(
        &mut self,
        window: Window,
        in_shape: Option<Shape3>,
        stride: Option<Window>,
    ) -> Result<()> {
        let (in_shape, needs_relu) = self.next_in_shape(in_shape)?;
        let layer = MaxPoolLayer::new(window, stride.unwrap_or(window), in_shape)?;
        self.push_transformation(NetLayer::MaxPool(layer), needs_relu);
        Ok(())
    }

    pub fn add_relu(&mut self) -> Result<()> {
        self.add_activation(Activation::Relu)
    }

    pub fn add_sigmoid(&mut self) -> Result<()> {
        self.add_activation(Activation::Sigmoid)
    }

    pub fn add_softmax(&mut self) -> Result<()> {
        self.add_activation(Activation::Softmax)
    }

    /// Append an activation layer.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the network is empty: activations cannot be the
    /// first layer.
    pub fn add_activation(&mut self, activation: Activation) -> Result<()> {
        let shape = self
            .layers
            .last()
            .map(|l| l.out_shape())
            .ok_or_else(|| NetworkError::invalid_operation("the first layer cannot be an activation layer"))?;
        self.push(activation.layer(shape));
        Ok(())
    }

    /// Input shape of a new Dense/Conv/MaxPool layer, and whether a Relu
    /// must go in front of it (the previous layer is Dense or Conv).
    fn next_in_shape(&self, in_shape: Option<Shape3>) -> Result<(Shape3, bool)> {
        let Some(last) = self.layers.last() else {
            let shape = in_shape.ok_or_else(|| {
                NetworkError::invalid_operation("the first layer needs an input shape")
            })?;
            return Ok((shape, false));
        };
        if in_shape.is_some() {
            return Err(NetworkError::invalid_operation(
                "an input shape can only be given for the first layer",
            ));
        }
        Ok((last.out_shape(), last.kind().is_trainable()))
    }

    fn push_transformation(&mut self, layer: NetLayer, needs_relu: bool) {
        if needs_relu {
            self.push(Activation::Relu.layer(layer.in_shape()));
        }
        self.push(layer);
    }

    fn push_activation(&mut self, activation: Option<Activation>) {
        let Some(activation) = activation else {
            return;
        };
        if let Some(shape) = self.out_shape() {
            self.push(activation.layer(shape));
        }
    }

    fn push(&mut self, layer: NetLayer) {
        debug!("added {}", layer.describe());
        self.layers.push(layer);
        self.compiled = false;
    }

    /// Fix the loss, optimizer and metrics. Appends a Softmax when the last
    /// layer is Dense. Adding layers afterwards requires compiling again.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the network has no layers.
    pub fn compile(
        &mut self,
        loss: LossFunction,
        optimizer: impl Into<OptimizerKind>,
        metrics: &[Metric],
    ) -> Result<()> {
        let last = self
            .layers
            .last()
            .ok_or_else(|| NetworkError::invalid_operation("cannot compile a network without layers"))?;
        if last.kind() == LayerKind::Dense {
            let shape = last.out_shape();
            self.push(Activation::Softmax.layer(shape));
        }

        self.loss = loss;
        self.optimizer = optimizer.into();
        self.metrics.clear();
        for metric in metrics {
            if !self.metrics.contains(metric) {
                self.metrics.push(*metric);
            }
        }
        self.compiled = true;
        info!(
            "compiled network: {} layers, {} parameters, loss {}, optimizer {}",
            self.layers.len(),
            self.parameter_count(),
            self.loss,
            self.optimizer.header()
        );
        Ok(())
    }

    /// [`compile`](Self::compile) from a JSON training configuration.
    pub fn compile_with_config(&mut self, config: &TrainingConfig) -> Result<()> {
        validate_config(config)?;
        self.compile(config.loss, config.optimizer.build(), &config.metrics)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn layers(&self) -> &[NetLayer] {
        &self.layers
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut NetLayer> {
        self.layers.get_mut(index)
    }

    /// Input shape of the first layer.
    pub fn in_shape(&self) -> Option<Shape3> {
        self.layers.first().map(|l| l.in_shape())
    }

    /// Output shape of the last layer.
    pub fn out_shape(&self) -> Option<Shape3> {
        self.layers.last().map(|l| l.out_shape())
    }

    pub fn loss(&self) -> LossFunction {
        self.loss
    }

    pub fn optimizer(&self) -> &OptimizerKind {
        &self.optimizer
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|l| l.parameter_count()).sum()
    }

    fn tracks(&self, metric: Metric) -> bool {
        self.metrics.contains(&metric)
    }

    /// One line per layer, followed by loss and optimizer when compiled.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .layers
            .iter()
            .enumerate()
            .map(|(i, l)| format!("{:>3}: {}", i, l.describe()))
            .collect();
        lines.push(format!("Total parameters: {}", self.parameter_count()));
        if self.compiled {
            lines.push(format!("Loss: {}", self.loss));
            lines.push(format!("Optimizer: {}", self.optimizer.header()));
            if !self.metrics.is_empty() {
                let names: Vec<&str> = self.metrics.iter().map(|m| m.name()).collect();
                lines.push(format!("Metrics: {}", names.join(" ")));
            }
        }
        lines.join("\n")
    }

    pub(crate) fn ensure_compiled(&self) -> Result<()> {
        if self.compiled {
            Ok(())
        } else {
            Err(NetworkError::invalid_operation("the network must be compiled first"))
        }
    }

    pub(crate) fn check_inputs(&self, inputs: &Tensor4) -> Result<()> {
        let expected = self
            .in_shape()
            .ok_or_else(|| NetworkError::invalid_operation("the network has no layers"))?;
        if inputs.shape() != expected {
            return Err(NetworkError::dimension(format!(
                "network expects inputs of shape {}, got {}",
                expected,
                inputs.shape()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Forward / backward
    // ------------------------------------------------------------------

    /// Run `batch` (one flattened example per row) through every layer and
    /// keep each layer's pass. The last entry holds the network output.
    pub fn forward_trace(&self, batch: &Matrix) -> Result<Vec<ForwardPass>> {
        let mut trace: Vec<ForwardPass> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let input = trace.last().map_or(batch, |p| p.output());
            let pass = layer.forward(input)?;
            trace.push(pass);
        }
        Ok(trace)
    }

    /// Network output for a batch matrix.
    pub fn forward_batch(&self, batch: &Matrix) -> Result<Matrix> {
        self.forward_trace(batch)?
            .pop()
            .map(ForwardPass::into_output)
            .ok_or_else(|| NetworkError::invalid_operation("the network has no layers"))
    }

    /// One optimization step on a batch: forward, loss gradient, then a
    /// backward sweep that updates each trainable layer in place.
    pub fn train_batch(&mut self, x: &Matrix, y: &Matrix, rule: &UpdateRule) -> Result<BatchOutcome> {
        self.ensure_compiled()?;
        let trace = self.forward_trace(x)?;
        let output = trace
            .last()
            .map(|p| p.output())
            .ok_or_else(|| NetworkError::invalid_operation("the network has no layers"))?;

        let loss = self.loss.batch_loss(y, output)?;
        let accuracy = if self.tracks(Metric::Accuracy) {
            Some(batch_accuracy(output, y)?)
        } else {
            None
        };

        let mut grad = self.loss.batch_gradient(y, output)?;
        for index in (0..self.layers.len()).rev() {
            let input = if index == 0 { x } else { trace[index - 1].output() };
            let grads = self.layers[index].backward(&grad, input, &trace[index])?;
            if let Some(param_grad) = &grads.parameters {
                self.layers[index].update(param_grad, rule)?;
            }
            grad = grads.input;
        }
        Ok(BatchOutcome { loss, accuracy })
    }

    // ------------------------------------------------------------------
    // Training and inference
    // ------------------------------------------------------------------

    /// Train with the compiled optimizer, logging progress through `tracing`.
    pub fn fit(
        &mut self,
        inputs: &Tensor4,
        labels: &Matrix,
        batch_size: usize,
        epochs: usize,
    ) -> Result<Vec<EpochReport>> {
        self.fit_with_reporter(inputs, labels, batch_size, epochs, &mut LogReporter::new())
    }

    pub fn fit_with_reporter(
        &mut self,
        inputs: &Tensor4,
        labels: &Matrix,
        batch_size: usize,
        epochs: usize,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<Vec<EpochReport>> {
        let optimizer = self.optimizer;
        optimizer.train(self, inputs, labels, batch_size, epochs, reporter)
    }

    /// Train with the batch size and epoch count of `config`. The network
    /// must already be compiled, e.g. with
    /// [`compile_with_config`](Self::compile_with_config).
    pub fn fit_with_config(
        &mut self,
        inputs: &Tensor4,
        labels: &Matrix,
        config: &TrainingConfig,
    ) -> Result<Vec<EpochReport>> {
        validate_config(config)?;
        self.fit(inputs, labels, config.batch_size, config.epochs)
    }

    /// Loss and tracked metrics over a labelled corpus, in one batched
    /// forward pass.
    pub fn evaluate(&self, inputs: &Tensor4, labels: &Matrix) -> Result<Evaluation> {
        self.ensure_compiled()?;
        if labels.rows() != inputs.len() {
            return Err(NetworkError::dimension(format!(
                "{} input examples but {} label rows",
                inputs.len(),
                labels.rows()
            )));
        }
        let output = self.predict(inputs)?;
        let loss = self.loss.batch_loss(labels, &output)?;
        let accuracy = if self.tracks(Metric::Accuracy) {
            Some(batch_accuracy(&output, labels)?)
        } else {
            None
        };
        Ok(Evaluation { loss, accuracy })
    }

    /// Network outputs, one row per example.
    pub fn predict(&self, inputs: &Tensor4) -> Result<Matrix> {
        self.check_inputs(inputs)?;
        self.forward_batch(&inputs.to_matrix()?)
    }
}
