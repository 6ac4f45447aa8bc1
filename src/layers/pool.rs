//! Max-pooling layer implementation

use crate::error::{NetworkError, Result};
use crate::layers::index_map::{sliding_output, IndexMap, Window};
use crate::layers::{ForwardPass, Gradients, Layer, LayerKind};
use crate::matrix::{argmax, Matrix};
use crate::tensor::Shape3;

/// Max-pooling over each depth slice independently. No parameters.
///
/// Forward records the winning window column of every output position in
/// the returned [`ForwardPass`]; backward sends each output gradient to that
/// single input and nowhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct MaxPoolLayer {
    in_shape: Shape3,
    out_shape: Shape3,
    window: Window,
    stride: Window,
    index_map: IndexMap,
}

impl MaxPoolLayer {
    /// # Errors
    ///
    /// `Dimension` if the window does not fit the input or a window or
    /// stride extent is zero.
    pub fn new(window: Window, stride: Window, in_shape: Shape3) -> Result<Self> {
        let (out_h, out_w) = sliding_output(in_shape, window, stride)?;
        Ok(Self {
            in_shape,
            out_shape: Shape3::new(in_shape.depth, out_h, out_w),
            window,
            stride,
            index_map: IndexMap::pooling(in_shape, window, stride)?,
        })
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn stride(&self) -> Window {
        self.stride
    }

    pub fn index_map(&self) -> &IndexMap {
        &self.index_map
    }
}

impl Layer for MaxPoolLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::MaxPool
    }

    fn in_shape(&self) -> Shape3 {
        self.in_shape
    }

    fn out_shape(&self) -> Shape3 {
        self.out_shape
    }

    fn forward(&self, input: &Matrix) -> Result<ForwardPass> {
        if input.cols() != self.in_shape.size() {
            return Err(NetworkError::dimension(format!(
                "maxpool layer expects rows of length {}, got {}",
                self.in_shape.size(),
                input.cols()
            )));
        }
        let outputs = self.out_shape.size();
        let mut output = Matrix::zeros(input.rows(), outputs);
        let mut winners = Vec::with_capacity(input.rows() * outputs);

        for r in 0..input.rows() {
            let formed = self.index_map.scatter(input.row(r), 0)?;
            let out_row = output.row_mut(r);
            for (position, window_values) in formed.row_iter().enumerate() {
                let best = argmax(window_values);
                out_row[position] = window_values[best];
                winners.push(best);
            }
        }
        Ok(ForwardPass::with_argmax(output, winners))
    }

    fn backward(&self, grad_output: &Matrix, input: &Matrix, pass: &ForwardPass) -> Result<Gradients> {
        let outputs = self.out_shape.size();
        if grad_output.rows() != input.rows() || grad_output.cols() != outputs {
            return Err(NetworkError::dimension(format!(
                "maxpool: gradient is {}x{}, expected {}x{}",
                grad_output.rows(),
                grad_output.cols(),
                input.rows(),
                outputs
            )));
        }
        let winners = pass.argmax().ok_or_else(|| {
            NetworkError::invalid_operation("maxpool backward needs the forward pass of the same batch")
        })?;
        if winners.len() != grad_output.rows() * outputs {
            return Err(NetworkError::dimension(format!(
                "maxpool: forward pass covered {} positions, gradient covers {}",
                winners.len(),
                grad_output.rows() * outputs
            )));
        }

        let mut input_grad = Matrix::zeros(input.rows(), self.in_shape.size());
        for b in 0..grad_output.rows() {
            let grad_row = grad_output.row(b);
            let batch_winners = &winners[b * outputs..(b + 1) * outputs];
            let target = input_grad.row_mut(b);
            for (index, slot) in target.iter_mut().enumerate() {
                *slot = self
                    .index_map
                    .entries(index)
                    .iter()
                    .filter(|e| batch_winners[e.row] == e.col)
                    .map(|e| grad_row[e.row])
                    .sum();
            }
        }
        Ok(Gradients::input_only(input_grad))
    }

    fn header(&self) -> String {
        format!(
            "maxpool -d {} {} -s {} {}",
            self.window.rows, self.window.cols, self.stride.rows, self.stride.cols
        )
    }

    fn describe(&self) -> String {
        format!(
            "MaxPool layer: Window: {}x{} Stride: {}x{} In: {} Out: {}",
            self.window.rows,
            self.window.cols,
            self.stride.rows,
            self.stride.cols,
            self.in_shape,
            self.out_shape
        )
    }
}
