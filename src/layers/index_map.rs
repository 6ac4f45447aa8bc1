//! Sliding-window index maps (im2col)
//!
//! Convolution and max-pooling both scatter each input value into a "formed"
//! matrix whose rows are window positions and whose columns are offsets
//! inside the window. The map built here records, for every flattened input
//! index, each `(row, column)` cell of that matrix the value lands in. The
//! same table drives the forward scatter and the backward gather, so the two
//! can never disagree.
//!
//! Entries are stored CSR-style: `offsets[i]..offsets[i + 1]` indexes the
//! entries belonging to input `i`.

use crate::error::{NetworkError, Result};
use crate::matrix::{checked_len, Matrix};
use crate::tensor::Shape3;

/// Two-dimensional extent: a window size or a stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub rows: usize,
    pub cols: usize,
}

impl Window {
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Build from a slice, which must hold exactly two values.
    pub fn from_slice(dims: &[usize]) -> Result<Self> {
        match dims {
            [r, c] => Ok(Self::new(*r, *c)),
            _ => Err(NetworkError::dimension(format!(
                "window and stride arrays must have length 2, got {}",
                dims.len()
            ))),
        }
    }

    pub const fn area(&self) -> usize {
        self.rows * self.cols
    }
}

/// Check a window/stride pair against an input shape and return the output
/// spatial extent `(height, width)`.
pub fn sliding_output(in_shape: Shape3, window: Window, stride: Window) -> Result<(usize, usize)> {
    if window.rows == 0 || window.cols == 0 {
        return Err(NetworkError::dimension("window dimensions must be positive"));
    }
    if stride.rows == 0 || stride.cols == 0 {
        return Err(NetworkError::dimension("stride lengths must be positive"));
    }
    in_shape.checked_size()?;
    if window.rows > in_shape.height || window.cols > in_shape.width {
        return Err(NetworkError::dimension(format!(
            "window {}x{} does not fit input {}",
            window.rows, window.cols, in_shape
        )));
    }
    Ok((
        (in_shape.height - window.rows) / stride.rows + 1,
        (in_shape.width - window.cols) / stride.cols + 1,
    ))
}

/// One destination cell of an input value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapEntry {
    pub row: usize,
    pub col: usize,
}

/// Immutable mapping from flattened input index to its formed-matrix cells.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMap {
    offsets: Vec<usize>,
    entries: Vec<MapEntry>,
    formed_rows: usize,
    formed_cols: usize,
}

impl IndexMap {
    /// Map for a convolution: one formed row per output spatial position,
    /// one column per `(depth, window row, window col)` triple.
    pub fn convolution(in_shape: Shape3, window: Window, stride: Window) -> Result<Self> {
        let (out_h, out_w) = sliding_output(in_shape, window, stride)?;
        let formed_rows = out_h * out_w;
        let formed_cols = in_shape.depth * window.area();
        // room for the bias column as well
        checked_len(formed_rows, formed_cols + 1)?;
        let mut lists = vec![Vec::new(); in_shape.size()];

        for i in (0..=in_shape.height - window.rows).step_by(stride.rows) {
            for j in (0..=in_shape.width - window.cols).step_by(stride.cols) {
                let row = (i / stride.rows) * out_w + j / stride.cols;
                for d in 0..in_shape.depth {
                    for r in 0..window.rows {
                        for c in 0..window.cols {
                            let flat = d * in_shape.spatial() + (r + i) * in_shape.width + (c + j);
                            let col = d * window.area() + r * window.cols + c;
                            lists[flat].push(MapEntry { row, col });
                        }
                    }
                }
            }
        }

        Ok(Self::from_lists(lists, formed_rows, formed_cols))
    }

    /// Map for max-pooling: one formed row per `(depth, output position)`,
    /// one column per window offset.
    pub fn pooling(in_shape: Shape3, window: Window, stride: Window) -> Result<Self> {
        let (out_h, out_w) = sliding_output(in_shape, window, stride)?;
        let formed_rows = in_shape.depth * out_h * out_w;
        checked_len(formed_rows, window.area())?;
        let mut lists = vec![Vec::new(); in_shape.size()];

        for d in 0..in_shape.depth {
            for i in (0..=in_shape.height - window.rows).step_by(stride.rows) {
                for j in (0..=in_shape.width - window.cols).step_by(stride.cols) {
                    let row = d * out_h * out_w + (i / stride.rows) * out_w + j / stride.cols;
                    for r in 0..window.rows {
                        for c in 0..window.cols {
                            let flat = d * in_shape.spatial() + (r + i) * in_shape.width + (c + j);
                            lists[flat].push(MapEntry {
                                row,
                                col: r * window.cols + c,
                            });
                        }
                    }
                }
            }
        }

        Ok(Self::from_lists(lists, formed_rows, window.area()))
    }

    fn from_lists(lists: Vec<Vec<MapEntry>>, formed_rows: usize, formed_cols: usize) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        let mut entries = Vec::with_capacity(lists.iter().map(Vec::len).sum());
        offsets.push(0);
        for list in lists {
            entries.extend(list);
            offsets.push(entries.len());
        }
        Self {
            offsets,
            entries,
            formed_rows,
            formed_cols,
        }
    }

    /// Number of flattened input positions covered.
    pub fn input_len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// `(rows, cols)` of the formed matrix, excluding any bias column.
    pub fn formed_shape(&self) -> (usize, usize) {
        (self.formed_rows, self.formed_cols)
    }

    /// Cells fed by input `index`, in construction order.
    pub fn entries(&self, index: usize) -> &[MapEntry] {
        &self.entries[self.offsets[index]..self.offsets[index + 1]]
    }

    /// Scatter one flattened example into a formed matrix with `extra_cols`
    /// trailing columns set to 1 (a bias column when `extra_cols == 1`).
    pub fn scatter(&self, example: &[f64], extra_cols: usize) -> Result<Matrix> {
        if example.len() != self.input_len() {
            return Err(NetworkError::dimension(format!(
                "example has {} values, layer expects {}",
                example.len(),
                self.input_len()
            )));
        }
        let cols = self.formed_cols + extra_cols;
        let mut formed = Matrix::zeros(self.formed_rows, cols);
        for (index, &value) in example.iter().enumerate() {
            for entry in self.entries(index) {
                formed.set(entry.row, entry.col, value);
            }
        }
        for row in 0..self.formed_rows {
            for col in self.formed_cols..cols {
                formed.set(row, col, 1.0);
            }
        }
        Ok(formed)
    }

    /// For every input index, the sum of `formed[row][col]` over its entries.
    pub fn gather_sum(&self, formed: &Matrix) -> Vec<f64> {
        (0..self.input_len())
            .map(|index| {
                self.entries(index)
                    .iter()
                    .map(|e| formed.get(e.row, e.col))
                    .sum()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_from_slice() {
        assert_eq!(Window::from_slice(&[2, 3]).unwrap(), Window::new(2, 3));
        assert!(Window::from_slice(&[2]).is_err());
        assert!(Window::from_slice(&[2, 2, 2]).is_err());
    }

    #[test]
    fn test_sliding_output_validation() {
        let shape = Shape3::new(1, 4, 4);
        assert_eq!(
            sliding_output(shape, Window::new(2, 2), Window::new(1, 1)).unwrap(),
            (3, 3)
        );
        assert_eq!(
            sliding_output(shape, Window::new(2, 2), Window::new(2, 2)).unwrap(),
            (2, 2)
        );
        assert!(sliding_output(shape, Window::new(5, 1), Window::new(1, 1)).is_err());
        assert!(sliding_output(shape, Window::new(2, 2), Window::new(0, 1)).is_err());
    }

    #[test]
    fn test_convolution_map_corner_and_center() {
        // 1x3x3 input, 2x2 window, stride 1 -> 2x2 output
        let map = IndexMap::convolution(Shape3::new(1, 3, 3), Window::new(2, 2), Window::new(1, 1))
            .unwrap();
        assert_eq!(map.formed_shape(), (4, 4));
        // top-left corner only in the first window at column 0
        assert_eq!(map.entries(0), &[MapEntry { row: 0, col: 0 }]);
        // center participates in all four windows
        let center: Vec<_> = map.entries(4).to_vec();
        assert_eq!(
            center,
            vec![
                MapEntry { row: 0, col: 3 },
                MapEntry { row: 1, col: 2 },
                MapEntry { row: 2, col: 1 },
                MapEntry { row: 3, col: 0 },
            ]
        );
    }

    #[test]
    fn test_pooling_map_rows_per_depth() {
        let map = IndexMap::pooling(Shape3::new(2, 2, 2), Window::new(2, 2), Window::new(2, 2))
            .unwrap();
        assert_eq!(map.formed_shape(), (2, 4));
        assert_eq!(map.entries(5), &[MapEntry { row: 1, col: 1 }]);
    }

    #[test]
    fn test_scatter_and_gather() {
        let map = IndexMap::convolution(Shape3::new(1, 3, 3), Window::new(2, 2), Window::new(1, 1))
            .unwrap();
        let example: Vec<f64> = (1..=9).map(f64::from).collect();
        let formed = map.scatter(&example, 1).unwrap();

        assert_eq!(formed.shape(), (4, 5));
        assert_eq!(formed.row(0), &[1.0, 2.0, 4.0, 5.0, 1.0]);
        assert_eq!(formed.row(3), &[5.0, 6.0, 8.0, 9.0, 1.0]);

        // gathering a matrix of ones counts window memberships
        let counts = map.gather_sum(&Matrix::filled(4, 5, 1.0));
        assert_eq!(counts, vec![1.0, 2.0, 1.0, 2.0, 4.0, 2.0, 1.0, 2.0, 1.0]);
        assert!(map.scatter(&example[..8], 1).is_err());
    }

    #[test]
    fn test_strided_map_skips_uncovered_inputs() {
        // 1x3x3 input with 2x2 window and stride 2: only the top-left window fits
        let map = IndexMap::pooling(Shape3::new(1, 3, 3), Window::new(2, 2), Window::new(2, 2))
            .unwrap();
        assert_eq!(map.formed_shape(), (1, 4));
        assert!(map.entries(2).is_empty());
        assert!(map.entries(8).is_empty());
    }
}
