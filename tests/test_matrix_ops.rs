// Tests for the matrix kernel and 4D input tensors: products, transposes,
// the bias-column helpers, reductions, reshapes and batching.

use approx::assert_relative_eq;
use sequential_nn::matrix::Matrix;
use sequential_nn::tensor::{Shape3, Tensor4};
use sequential_nn::NetworkError;

fn m(rows: &[&[f64]]) -> Matrix {
    let rows: Vec<Vec<f64>> = rows.iter().map(|r| r.to_vec()).collect();
    Matrix::from_rows(&rows).unwrap()
}

// ============================================================================
// Products and transposes
// ============================================================================

mod multiply_tests {
    use super::*;

    #[test]
    fn test_basic_multiplication() {
        let a = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let b = m(&[&[7.0, 8.0], &[9.0, 10.0], &[11.0, 12.0]]);
        let c = a.multiply(&b).unwrap();
        assert_eq!(c, m(&[&[58.0, 64.0], &[139.0, 154.0]]));
    }

    #[test]
    fn test_identity_multiplication() {
        let a = m(&[&[1.5, -2.0], &[0.25, 4.0]]);
        let id = m(&[&[1.0, 0.0], &[0.0, 1.0]]);
        assert_eq!(a.multiply(&id).unwrap(), a);
        assert_eq!(id.multiply(&a).unwrap(), a);
    }

    #[test]
    fn test_inner_dimension_mismatch() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(2, 3);
        assert!(matches!(a.multiply(&b), Err(NetworkError::Dimension(_))));
    }

    #[test]
    fn test_vector_products() {
        let row = Matrix::row_vector(vec![1.0, 2.0, 3.0]);
        let col = row.transpose();
        assert_eq!(row.multiply(&col).unwrap().as_slice(), &[14.0]);
        assert_eq!(col.multiply(&row).unwrap().shape(), (3, 3));
    }

    #[test]
    fn test_transpose_twice_is_identity() {
        let a = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let t = a.transpose();
        assert_eq!(t.shape(), (3, 2));
        assert_eq!(t.get(2, 1), 6.0);
        assert_eq!(t.transpose(), a);
    }

    #[test]
    fn test_product_transpose_rule() {
        let a = m(&[&[1.0, -1.0], &[2.0, 0.5], &[0.0, 3.0]]);
        let b = m(&[&[2.0, 1.0, 0.0], &[-1.0, 4.0, 2.0]]);
        let left = a.multiply(&b).unwrap().transpose();
        let right = b.transpose().multiply(&a.transpose()).unwrap();
        assert_eq!(left, right);
    }
}

// ============================================================================
// Element-wise operations and bias helpers
// ============================================================================

mod elementwise_tests {
    use super::*;

    #[test]
    fn test_add_and_multiply_in_place() {
        let mut a = m(&[&[1.0, 2.0], &[3.0, 4.0]]);
        a.add_assign_elementwise(&m(&[&[0.5, 0.5], &[1.0, -1.0]])).unwrap();
        assert_eq!(a, m(&[&[1.5, 2.5], &[4.0, 3.0]]));
        a.mul_assign_elementwise(&m(&[&[2.0, 0.0], &[1.0, -1.0]])).unwrap();
        assert_eq!(a, m(&[&[3.0, 0.0], &[4.0, -3.0]]));
    }

    #[test]
    fn test_elementwise_shape_mismatch() {
        let mut a = Matrix::zeros(2, 2);
        assert!(matches!(
            a.add_assign_elementwise(&Matrix::zeros(1, 4)),
            Err(NetworkError::Dimension(_))
        ));
        assert!(matches!(
            a.mul_assign_elementwise(&Matrix::zeros(2, 3)),
            Err(NetworkError::Dimension(_))
        ));
    }

    #[test]
    fn test_append_ones_column() {
        let a = m(&[&[1.0, 2.0], &[3.0, 4.0]]);
        assert_eq!(a.append_ones_column(), m(&[&[1.0, 2.0, 1.0], &[3.0, 4.0, 1.0]]));
    }

    #[test]
    fn test_without_last_row_drops_bias() {
        let w = m(&[&[1.0, 2.0], &[3.0, 4.0], &[9.0, 9.0]]);
        assert_eq!(w.without_last_row(), m(&[&[1.0, 2.0], &[3.0, 4.0]]));
    }

    #[test]
    fn test_bias_folding_matches_explicit_bias() {
        // [x | 1] . [W ; b] == x . W + b
        let x = m(&[&[0.5, -1.0], &[2.0, 0.25]]);
        let folded = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[0.1, 0.2, 0.3]]);
        let out = x.append_ones_column().multiply(&folded).unwrap();
        let plain = x.multiply(&folded.without_last_row()).unwrap();
        for r in 0..2 {
            for c in 0..3 {
                assert_relative_eq!(out.get(r, c), plain.get(r, c) + folded.get(2, c));
            }
        }
    }

    #[test]
    fn test_col_sum() {
        let a = m(&[&[1.0, -2.0], &[3.0, 4.0], &[0.5, 0.5]]);
        assert_eq!(a.col_sum(), vec![4.5, 2.5]);
    }

    #[test]
    fn test_scale_and_map() {
        let mut a = m(&[&[1.0, -2.0]]);
        a.scale(-0.5);
        assert_eq!(a.as_slice(), &[-0.5, 1.0]);
        assert_eq!(a.map(|v| v * v).as_slice(), &[0.25, 1.0]);
    }
}

// ============================================================================
// Reductions and reshapes
// ============================================================================

mod reduction_tests {
    use super::*;

    #[test]
    fn test_row_argmax_first_on_ties() {
        let a = m(&[&[0.1, 0.7, 0.2], &[5.0, 5.0, 1.0], &[-3.0, -1.0, -2.0]]);
        assert_eq!(a.row_argmax(), vec![1, 0, 1]);
    }

    #[test]
    fn test_min_max() {
        let a = m(&[&[3.0, -7.5], &[2.0, 9.0]]);
        assert_eq!(a.min(), Some(-7.5));
        assert_eq!(a.max(), Some(9.0));
        assert_eq!(Matrix::zeros(0, 0).max(), None);
    }

    #[test]
    fn test_reshape_keeps_row_major_order() {
        let a = m(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let r = a.reshape(3, 2).unwrap();
        assert_eq!(r, m(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]));
    }

    #[test]
    fn test_reshape_count_mismatch() {
        assert!(matches!(
            Matrix::zeros(2, 3).reshape(4, 2),
            Err(NetworkError::Dimension(_))
        ));
    }
}

// ============================================================================
// Tensors
// ============================================================================

mod tensor_tests {
    use super::*;

    fn counting_tensor(examples: usize, shape: Shape3) -> Tensor4 {
        let data = (0..examples * shape.size()).map(|v| v as f64).collect();
        Tensor4::new(examples, shape, data).unwrap()
    }

    #[test]
    fn test_indexing_is_depth_row_col() {
        let t = counting_tensor(2, Shape3::new(2, 3, 4));
        assert_eq!(t.get(0, 0, 0, 1), 1.0);
        assert_eq!(t.get(0, 0, 1, 0), 4.0);
        assert_eq!(t.get(0, 1, 0, 0), 12.0);
        assert_eq!(t.get(1, 0, 0, 0), 24.0);
    }

    #[test]
    fn test_flatten_batch_rows() {
        let t = counting_tensor(4, Shape3::new(1, 1, 3));
        let batch = t.flatten_batch(1..3).unwrap();
        assert_eq!(batch, m(&[&[3.0, 4.0, 5.0], &[6.0, 7.0, 8.0]]));
    }

    #[test]
    fn test_min_max_normalize() {
        let mut t = Tensor4::new(1, Shape3::new(1, 2, 2), vec![2.0, 4.0, 6.0, 10.0]).unwrap();
        t.min_max_normalize();
        assert_eq!(t.as_slice(), &[0.0, 0.25, 0.5, 1.0]);

        let mut flat = Tensor4::new(1, Shape3::new(1, 1, 3), vec![7.0; 3]).unwrap();
        flat.min_max_normalize();
        assert_eq!(flat.as_slice(), &[0.0; 3]);
    }

    #[test]
    fn test_split_batches_drops_remainder() {
        let t = counting_tensor(7, Shape3::new(1, 1, 2));
        let mut labels = Matrix::zeros(7, 2);
        for n in 0..7 {
            labels.set(n, n % 2, 1.0);
        }
        let batches = t.split_batches(&labels, 3).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].0.row(0), &[6.0, 7.0]);
        assert_eq!(batches[1].1.row(2), &[1.0, 0.0]);
    }

    #[test]
    fn test_shape_must_have_three_dims() {
        assert!(Shape3::from_slice(&[1, 2]).is_err());
        assert_eq!(Shape3::from_slice(&[1, 2, 3]).unwrap().size(), 6);
    }

    #[test]
    fn test_data_length_checked() {
        assert!(matches!(
            Tensor4::new(2, Shape3::new(1, 2, 2), vec![0.0; 7]),
            Err(NetworkError::Dimension(_))
        ));
    }
}
