//! Dense row-major matrix kernel
//!
//! Every layer in the crate reduces its forward and backward computation to
//! the handful of primitives in this module: a plain matrix product,
//! transposition, in-place element-wise arithmetic and reshaping. The
//! product is a straightforward i-k-j loop; there is no BLAS dependency.

use crate::error::{NetworkError, Result};

/// Most `f64` elements a single buffer can address.
const MAX_ELEMENTS: usize = isize::MAX as usize / std::mem::size_of::<f64>();

/// `rows * cols`, failing with `Dimension` when the product overflows or
/// exceeds what one buffer can hold.
pub fn checked_len(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols)
        .filter(|&len| len <= MAX_ELEMENTS)
        .ok_or_else(|| {
            NetworkError::dimension(format!("{} x {} elements exceed the addressable size", rows, cols))
        })
}

/// Dense matrix of `f64` values stored in row-major order.
///
/// A batch of flattened examples is represented as a matrix with one example
/// per row, so most layer code treats `rows` as the batch size.
///
/// # Example
///
/// ```
/// use sequential_nn::matrix::Matrix;
///
/// let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
/// let b = Matrix::from_rows(&[vec![1.0], vec![1.0]]).unwrap();
/// let c = a.multiply(&b).unwrap();
/// assert_eq!(c.as_slice(), &[3.0, 7.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, 0.0)
    }

    /// Matrix with every element set to `value`.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Zero-filled matrix, failing instead of overflowing on absurd sizes.
    pub fn try_zeros(rows: usize, cols: usize) -> Result<Self> {
        checked_len(rows, cols)?;
        Ok(Self::zeros(rows, cols))
    }

    /// Wrap a flat row-major buffer. Fails if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if checked_len(rows, cols)? != data.len() {
            return Err(NetworkError::dimension(format!(
                "cannot view {} elements as a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix from nested rows. All rows must share a length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(NetworkError::dimension(format!(
                    "row {} has {} columns, expected {}",
                    i,
                    row.len(),
                    cols
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Single-row matrix holding `values`.
    pub fn row_vector(values: Vec<f64>) -> Self {
        Self {
            rows: 1,
            cols: values.len(),
            data: values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let cols = self.cols;
        &mut self.data[row * cols..(row + 1) * cols]
    }

    /// Iterate over rows as slices.
    pub fn row_iter(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact(0) panics, and a zero-column matrix has no data anyway
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }

    /// Matrix product `self · other`.
    ///
    /// # Errors
    ///
    /// `Dimension` if `self.cols() != other.rows()`.
    pub fn multiply(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(NetworkError::dimension(format!(
                "cannot multiply {}x{} by {}x{}",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            let lhs_row = self.row(i);
            let out_row = &mut out.data[i * other.cols..(i + 1) * other.cols];
            for (k, &a) in lhs_row.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let rhs_row = &other.data[k * other.cols..(k + 1) * other.cols];
                for (o, &b) in out_row.iter_mut().zip(rhs_row) {
                    *o += a * b;
                }
            }
        }
        Ok(out)
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        out
    }

    fn check_same_shape(&self, other: &Matrix, op: &str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(NetworkError::dimension(format!(
                "{}: {}x{} vs {}x{}",
                op, self.rows, self.cols, other.rows, other.cols
            )));
        }
        Ok(())
    }

    /// `self[i][j] += other[i][j]` for every element.
    pub fn add_assign_elementwise(&mut self, other: &Matrix) -> Result<()> {
        self.check_same_shape(other, "element-wise add")?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
        Ok(())
    }

    /// `self[i][j] *= other[i][j]` for every element.
    pub fn mul_assign_elementwise(&mut self, other: &Matrix) -> Result<()> {
        self.check_same_shape(other, "element-wise multiply")?;
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a *= b;
        }
        Ok(())
    }

    /// Multiply every element by `factor`.
    pub fn scale(&mut self, factor: f64) {
        for value in &mut self.data {
            *value *= factor;
        }
    }

    /// Apply `f` to every element, producing a new matrix of the same shape.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Set every element to `value`.
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Copy of `self` with an extra trailing column of ones (bias input).
    pub fn append_ones_column(&self) -> Matrix {
        let cols = self.cols + 1;
        let mut data = Vec::with_capacity(self.rows * cols);
        for row in self.row_iter() {
            data.extend_from_slice(row);
            data.push(1.0);
        }
        if self.cols == 0 {
            data = vec![1.0; self.rows];
        }
        Matrix {
            rows: self.rows,
            cols,
            data,
        }
    }

    /// Copy of `self` without its last row (strips the bias row of a
    /// parameter matrix).
    pub fn without_last_row(&self) -> Matrix {
        let rows = self.rows.saturating_sub(1);
        Matrix {
            rows,
            cols: self.cols,
            data: self.data[..rows * self.cols].to_vec(),
        }
    }

    /// View the same elements with a different row/column split.
    ///
    /// # Errors
    ///
    /// `Dimension` if `rows * cols` differs from the current element count.
    pub fn reshape(self, rows: usize, cols: usize) -> Result<Matrix> {
        Matrix::from_vec(rows, cols, self.data)
    }

    /// Column sums (length `cols`).
    pub fn col_sum(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.cols];
        for row in self.row_iter() {
            for (s, v) in sums.iter_mut().zip(row) {
                *s += v;
            }
        }
        sums
    }

    /// Index of the maximum element of each row; ties resolve to the first
    /// occurrence.
    pub fn row_argmax(&self) -> Vec<usize> {
        self.row_iter().map(argmax).collect()
    }

    /// Smallest element, or `None` for an empty matrix.
    pub fn min(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::min)
    }

    /// Largest element, or `None` for an empty matrix.
    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }
}

/// Position of the largest value in `values` (first occurrence on ties).
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}
