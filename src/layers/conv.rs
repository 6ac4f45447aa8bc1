//! Convolution layer implementation
//!
//! Convolution is evaluated as a matrix product. Each example is scattered
//! through the layer's [`IndexMap`] into a formed matrix with one row per
//! output position and one column per `(depth, window row, window col)`
//! value plus a trailing bias column of ones; multiplying that by the filter
//! matrix yields every filter response at once.
//!
//! Output rows are laid out filter-major: all positions of filter 0, then
//! all positions of filter 1, matching the `(filters, height, width)` output
//! shape seen by the next layer.

use rayon::prelude::*;

use crate::error::{NetworkError, Result};
use crate::layers::index_map::{sliding_output, IndexMap, Window};
use crate::layers::params::{Parameters, UpdateRule};
use crate::layers::{ForwardPass, Gradients, Layer, LayerKind};
use crate::matrix::Matrix;
use crate::tensor::Shape3;
use crate::utils::{HeNormal, SimpleRng};

/// 2D convolution with learnable filters, no padding.
///
/// The filter matrix is `(depth · window rows · window cols + 1) × filters`
/// with biases in the last row.
///
/// # Example
///
/// ```
/// use sequential_nn::layers::{ConvLayer, Layer, Window};
/// use sequential_nn::tensor::Shape3;
/// use sequential_nn::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = ConvLayer::new(8, Window::new(3, 3), Window::new(1, 1), Shape3::new(1, 28, 28), &mut rng)
///     .unwrap();
/// assert_eq!(layer.out_shape(), Shape3::new(8, 26, 26));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConvLayer {
    in_shape: Shape3,
    out_shape: Shape3,
    window: Window,
    stride: Window,
    filters: Parameters,
    index_map: IndexMap,
}

impl ConvLayer {
    /// Create a convolution layer.
    ///
    /// Filter weights are He-normal with fan-in equal to the number of
    /// output spatial positions; biases start at zero.
    ///
    /// # Errors
    ///
    /// `Dimension` if the window does not fit the input, a window or stride
    /// extent is zero, or `num_filters` is zero.
    pub fn new(
        num_filters: usize,
        window: Window,
        stride: Window,
        in_shape: Shape3,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        if num_filters == 0 {
            return Err(NetworkError::dimension("conv layer needs at least one filter"));
        }
        let (out_h, out_w) = sliding_output(in_shape, window, stride)?;
        let out_shape = Shape3::new(num_filters, out_h, out_w);
        out_shape.checked_size()?;
        let index_map = IndexMap::convolution(in_shape, window, stride)?;

        let rows = in_shape.depth * window.area() + 1;
        let filters = HeNormal::new(out_shape.spatial()).parameter_matrix(rows, num_filters, rng)?;

        Ok(Self {
            in_shape,
            out_shape,
            window,
            stride,
            filters: Parameters::new(filters),
            index_map,
        })
    }

    pub fn num_filters(&self) -> usize {
        self.out_shape.depth
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn stride(&self) -> Window {
        self.stride
    }

    /// Filter matrix; the last row holds the biases.
    pub fn filters(&self) -> &Matrix {
        self.filters.values()
    }

    pub fn params(&self) -> &Parameters {
        &self.filters
    }

    pub fn index_map(&self) -> &IndexMap {
        &self.index_map
    }

    /// Overwrite the filter matrix (shape must match).
    pub fn set_filters(&mut self, filters: Matrix) -> Result<()> {
        self.filters.replace(filters)
    }

    /// Apply a parameter gradient from [`Layer::backward`].
    pub fn update(&mut self, grad: &Matrix, rule: &UpdateRule) -> Result<()> {
        self.filters.apply(grad, rule)
    }

    /// Formed matrix for one flattened example, bias column included.
    pub fn formed_input(&self, example: &[f64]) -> Result<Matrix> {
        self.index_map.scatter(example, 1)
    }

    fn check_input(&self, input: &Matrix) -> Result<()> {
        if input.cols() != self.in_shape.size() {
            return Err(NetworkError::dimension(format!(
                "conv layer expects rows of length {}, got {}",
                self.in_shape.size(),
                input.cols()
            )));
        }
        Ok(())
    }

    /// Per-example backward step: `(filter gradient, input gradient row)`.
    fn example_gradients(&self, example: &[f64], grad_row: &[f64]) -> Result<(Matrix, Vec<f64>)> {
        let positions = self.out_shape.spatial();
        // grad_row is filter-major; the block wants one row per position
        let block = Matrix::from_vec(self.num_filters(), positions, grad_row.to_vec())?.transpose();
        let formed = self.formed_input(example)?;
        let filter_grad = formed.transpose().multiply(&block)?;
        let formed_grad = block.multiply(&self.filters.values().transpose())?;
        Ok((filter_grad, self.index_map.gather_sum(&formed_grad)))
    }
}

impl Layer for ConvLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Conv
    }

    fn in_shape(&self) -> Shape3 {
        self.in_shape
    }

    fn out_shape(&self) -> Shape3 {
        self.out_shape
    }

    fn forward(&self, input: &Matrix) -> Result<ForwardPass> {
        self.check_input(input)?;
        let filters = self.filters.values();
        let rows: Vec<Matrix> = (0..input.rows())
            .into_par_iter()
            .map(|r| {
                let response = self.formed_input(input.row(r))?.multiply(filters)?;
                Ok(response.transpose())
            })
            .collect::<Result<_>>()?;

        let mut output = Matrix::zeros(input.rows(), self.out_shape.size());
        for (r, response) in rows.iter().enumerate() {
            output.row_mut(r).copy_from_slice(response.as_slice());
        }
        Ok(ForwardPass::new(output))
    }

    fn backward(&self, grad_output: &Matrix, input: &Matrix, _pass: &ForwardPass) -> Result<Gradients> {
        if grad_output.rows() != input.rows() {
            return Err(NetworkError::dimension(format!(
                "conv: gradient batch of {} rows but input batch of {}",
                grad_output.rows(),
                input.rows()
            )));
        }
        if grad_output.cols() != self.out_shape.size() {
            return Err(NetworkError::dimension(format!(
                "conv: gradient rows of length {}, expected {}",
                grad_output.cols(),
                self.out_shape.size()
            )));
        }
        self.check_input(input)?;

        let per_example: Vec<(Matrix, Vec<f64>)> = (0..input.rows())
            .into_par_iter()
            .map(|r| self.example_gradients(input.row(r), grad_output.row(r)))
            .collect::<Result<_>>()?;

        // Summed in batch order so results do not depend on scheduling.
        let (rows, cols) = self.filters.values().shape();
        let mut filter_grad = Matrix::zeros(rows, cols);
        let mut input_grad = Matrix::zeros(input.rows(), self.in_shape.size());
        for (r, (example_filter_grad, example_input_grad)) in per_example.iter().enumerate() {
            filter_grad.add_assign_elementwise(example_filter_grad)?;
            input_grad.row_mut(r).copy_from_slice(example_input_grad);
        }

        Ok(Gradients {
            input: input_grad,
            parameters: Some(filter_grad),
        })
    }

    fn parameter_count(&self) -> usize {
        self.filters.len()
    }

    fn header(&self) -> String {
        format!(
            "conv -n {} -d {} {} -s {} {}",
            self.num_filters(),
            self.window.rows,
            self.window.cols,
            self.stride.rows,
            self.stride.cols
        )
    }

    fn describe(&self) -> String {
        format!(
            "Conv layer: {} filters. Window: {}x{} Stride: {}x{} In: {} Out: {}",
            self.num_filters(),
            self.window.rows,
            self.window.cols,
            self.stride.rows,
            self.stride.cols,
            self.in_shape,
            self.out_shape
        )
    }
}
