//! Shapes and 4D example tensors
//!
//! Corpus inputs arrive as `examples × depth × height × width` tensors. The
//! network itself only ever sees flattened batches, so this module handles
//! the views between the two: flattening a range of examples into a batch
//! matrix and splitting a whole corpus into batches.

use std::fmt;
use std::ops::Range;

use crate::error::{NetworkError, Result};
use crate::matrix::{checked_len, Matrix};

/// Three-dimensional layer shape: `(depth, height, width)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape3 {
    pub depth: usize,
    pub height: usize,
    pub width: usize,
}

impl Shape3 {
    pub const fn new(depth: usize, height: usize, width: usize) -> Self {
        Self {
            depth,
            height,
            width,
        }
    }

    /// Build a shape from a slice, which must hold exactly three values
    /// whose product fits in memory.
    pub fn from_slice(dims: &[usize]) -> Result<Self> {
        match dims {
            [d, h, w] => {
                let shape = Self::new(*d, *h, *w);
                shape.checked_size()?;
                Ok(shape)
            }
            _ => Err(NetworkError::dimension(format!(
                "layer shapes need exactly 3 dimensions, got {}",
                dims.len()
            ))),
        }
    }

    /// Number of elements in one flattened example.
    pub const fn size(&self) -> usize {
        self.depth * self.height * self.width
    }

    /// [`size`](Self::size) with overflow checking.
    pub fn checked_size(&self) -> Result<usize> {
        checked_len(self.depth, checked_len(self.height, self.width)?)
    }

    /// Number of spatial positions (`height * width`).
    pub const fn spatial(&self) -> usize {
        self.height * self.width
    }
}

impl fmt::Display for Shape3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.depth, self.height, self.width)
    }
}

/// Contiguous `examples × depth × height × width` tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor4 {
    examples: usize,
    shape: Shape3,
    data: Vec<f64>,
}

impl Tensor4 {
    /// Wrap a flat buffer. Fails if its length is not `examples * shape.size()`.
    pub fn new(examples: usize, shape: Shape3, data: Vec<f64>) -> Result<Self> {
        if checked_len(examples, shape.checked_size()?)? != data.len() {
            return Err(NetworkError::dimension(format!(
                "cannot view {} elements as {} examples of shape {}",
                data.len(),
                examples,
                shape
            )));
        }
        Ok(Self {
            examples,
            shape,
            data,
        })
    }

    pub fn zeros(examples: usize, shape: Shape3) -> Self {
        Self {
            examples,
            shape,
            data: vec![0.0; examples * shape.size()],
        }
    }

    /// Build from nested `[example][depth][row][col]` vectors.
    pub fn from_nested(nested: &[Vec<Vec<Vec<f64>>>]) -> Result<Self> {
        let first = nested.first().ok_or_else(|| {
            NetworkError::dimension("cannot infer a shape from an empty tensor")
        })?;
        let depth = first.len();
        let height = first.first().map_or(0, Vec::len);
        let width = first
            .first()
            .and_then(|plane| plane.first())
            .map_or(0, Vec::len);
        let shape = Shape3::new(depth, height, width);

        let mut data = Vec::with_capacity(nested.len() * shape.size());
        for (i, example) in nested.iter().enumerate() {
            if example.len() != depth {
                return Err(NetworkError::dimension(format!(
                    "example {} has depth {}, expected {}",
                    i,
                    example.len(),
                    depth
                )));
            }
            for plane in example {
                if plane.len() != height {
                    return Err(NetworkError::dimension(format!(
                        "example {} has a plane of height {}, expected {}",
                        i,
                        plane.len(),
                        height
                    )));
                }
                for row in plane {
                    if row.len() != width {
                        return Err(NetworkError::dimension(format!(
                            "example {} has a row of width {}, expected {}",
                            i,
                            row.len(),
                            width
                        )));
                    }
                    data.extend_from_slice(row);
                }
            }
        }
        Self::new(nested.len(), shape, data)
    }

    /// Reinterpret a batch matrix (one flattened example per row) as a 4D tensor.
    pub fn from_matrix(matrix: Matrix, shape: Shape3) -> Result<Self> {
        if matrix.cols() != shape.size() {
            return Err(NetworkError::dimension(format!(
                "rows of length {} do not match shape {}",
                matrix.cols(),
                shape
            )));
        }
        let examples = matrix.rows();
        Self::new(examples, shape, matrix.into_vec())
    }

    /// Number of examples (leading dimension).
    pub fn len(&self) -> usize {
        self.examples
    }

    pub fn is_empty(&self) -> bool {
        self.examples == 0
    }

    pub fn shape(&self) -> Shape3 {
        self.shape
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Flattened view of one example.
    pub fn example(&self, index: usize) -> &[f64] {
        let size = self.shape.size();
        &self.data[index * size..(index + 1) * size]
    }

    pub fn get(&self, example: usize, depth: usize, row: usize, col: usize) -> f64 {
        let s = self.shape;
        self.data[example * s.size() + depth * s.spatial() + row * s.width + col]
    }

    /// Flatten the examples in `range` into a batch matrix.
    pub fn flatten_batch(&self, range: Range<usize>) -> Result<Matrix> {
        if range.start > range.end || range.end > self.examples {
            return Err(NetworkError::dimension(format!(
                "batch range {:?} out of bounds for {} examples",
                range, self.examples
            )));
        }
        let size = self.shape.size();
        Matrix::from_vec(
            range.len(),
            size,
            self.data[range.start * size..range.end * size].to_vec(),
        )
    }

    /// Flatten every example into a single batch matrix.
    pub fn to_matrix(&self) -> Result<Matrix> {
        self.flatten_batch(0..self.examples)
    }

    pub fn min(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }

    /// Rescale every element to `[0, 1]` using the global minimum and maximum.
    /// A constant tensor maps to all zeros.
    pub fn min_max_normalize(&mut self) {
        let (Some(min), Some(max)) = (self.min(), self.max()) else {
            return;
        };
        let range = max - min;
        for value in &mut self.data {
            *value = if range > 0.0 { (*value - min) / range } else { 0.0 };
        }
    }

    /// Split inputs and their labels into `(inputs, labels)` batch matrices of
    /// `batch_size` rows each.
    ///
    /// Examples that do not fill a final batch are dropped; a warning is
    /// logged when that happens.
    ///
    /// # Errors
    ///
    /// `Dimension` if `labels.rows()` differs from the number of examples,
    /// `InvalidOperation` if `batch_size` is zero or larger than the corpus.
    pub fn split_batches(&self, labels: &Matrix, batch_size: usize) -> Result<Vec<(Matrix, Matrix)>> {
        if labels.rows() != self.examples {
            return Err(NetworkError::dimension(format!(
                "{} input examples but {} label rows",
                self.examples,
                labels.rows()
            )));
        }
        if batch_size == 0 || batch_size > self.examples {
            return Err(NetworkError::invalid_operation(format!(
                "batch size {} is invalid for {} examples",
                batch_size, self.examples
            )));
        }

        let num_batches = self.examples / batch_size;
        let dropped = self.examples % batch_size;
        if dropped > 0 {
            tracing::warn!(
                "batch size {} does not divide {} examples; dropping the last {}",
                batch_size,
                self.examples,
                dropped
            );
        }

        let label_cols = labels.cols();
        (0..num_batches)
            .map(|b| {
                let range = b * batch_size..(b + 1) * batch_size;
                let x = self.flatten_batch(range.clone())?;
                let y = Matrix::from_vec(
                    batch_size,
                    label_cols,
                    labels.as_slice()[range.start * label_cols..range.end * label_cols].to_vec(),
                )?;
                Ok((x, y))
            })
            .collect()
    }
}
