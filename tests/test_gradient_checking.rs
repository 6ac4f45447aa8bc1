//! Numerical gradient checking for losses, layers and whole networks
//!
//! Analytical gradients are compared against central finite differences:
//! `(f(x + eps) - f(x - eps)) / (2 * eps)`.
//!
//! For whole networks the analytical gradient is recovered from a single
//! mini-batch step with learn rate 1: every trainable layer moves by exactly
//! `-gradient`, and the gradients of earlier layers are computed from the
//! weights as they were before the step.

use sequential_nn::layers::{
    Activation, ConvLayer, DenseLayer, Layer, MaxPoolLayer, SigmoidLayer, SoftmaxLayer, Window,
};
use sequential_nn::loss::LossFunction;
use sequential_nn::matrix::Matrix;
use sequential_nn::network::Network;
use sequential_nn::optimizers::{MiniBatch, Optimizer};
use sequential_nn::tensor::Shape3;
use sequential_nn::utils::SimpleRng;

const EPS: f64 = 1e-5;
const TOL: f64 = 1e-6;

fn random_matrix(rows: usize, cols: usize, rng: &mut SimpleRng, low: f64, high: f64) -> Matrix {
    let data = (0..rows * cols).map(|_| rng.gen_range_f64(low, high)).collect();
    Matrix::from_vec(rows, cols, data).unwrap()
}

fn assert_close(analytic: f64, numeric: f64, what: &str) {
    let scale = analytic.abs().max(numeric.abs()).max(1.0);
    assert!(
        (analytic - numeric).abs() <= TOL * scale,
        "{}: analytic {} vs numeric {}",
        what,
        analytic,
        numeric
    );
}

/// Scalar objective `sum(output * weights)` so every output position matters.
fn weighted_sum(output: &Matrix, weights: &Matrix) -> f64 {
    output
        .as_slice()
        .iter()
        .zip(weights.as_slice())
        .map(|(o, w)| o * w)
        .sum()
}

/// Check the input gradient of `layer` against finite differences.
fn check_input_gradient(layer: &dyn Layer, input: &Matrix, rng: &mut SimpleRng) {
    let pass = layer.forward(input).unwrap();
    let upstream = random_matrix(pass.output().rows(), pass.output().cols(), rng, -1.0, 1.0);
    let grads = layer.backward(&upstream, input, &pass).unwrap();

    for i in 0..input.len() {
        let mut plus = input.clone();
        plus.as_mut_slice()[i] += EPS;
        let mut minus = input.clone();
        minus.as_mut_slice()[i] -= EPS;
        let f_plus = weighted_sum(layer.forward(&plus).unwrap().output(), &upstream);
        let f_minus = weighted_sum(layer.forward(&minus).unwrap().output(), &upstream);
        let numeric = (f_plus - f_minus) / (2.0 * EPS);
        assert_close(grads.input.as_slice()[i], numeric, &format!("input {}", i));
    }
}

// ============================================================================
// Loss functions
// ============================================================================

mod loss_gradient_tests {
    use super::*;

    fn check_loss(loss: LossFunction, expected: &[f64], actual: &[f64]) {
        let analytic = loss.partial_derivatives(expected, actual).unwrap();
        for i in 0..actual.len() {
            let mut plus = actual.to_vec();
            plus[i] += EPS;
            let mut minus = actual.to_vec();
            minus[i] -= EPS;
            let numeric = (loss.loss(expected, &plus).unwrap() - loss.loss(expected, &minus).unwrap())
                / (2.0 * EPS);
            assert!(
                (analytic[i] - numeric).abs() < 1e-4,
                "{} output {}: analytic {} vs numeric {}",
                loss,
                i,
                analytic[i],
                numeric
            );
        }
    }

    #[test]
    fn test_cross_entropy_matches_finite_difference() {
        let mut rng = SimpleRng::new(2718);
        for _ in 0..20 {
            let n = 2 + (rng.next_u64() % 6) as usize;
            let actual: Vec<f64> = (0..n).map(|_| rng.gen_range_f64(0.05, 1.0)).collect();
            let mut expected = vec![0.0; n];
            expected[(rng.next_u64() % n as u64) as usize] = 1.0;
            check_loss(LossFunction::CrossEntropy, &expected, &actual);
        }
    }

    #[test]
    fn test_cross_entropy_soft_targets() {
        check_loss(LossFunction::CrossEntropy, &[0.2, 0.3, 0.5], &[0.6, 0.1, 0.3]);
    }

    #[test]
    fn test_mse_matches_finite_difference() {
        let mut rng = SimpleRng::new(31415);
        for _ in 0..20 {
            let n = 1 + (rng.next_u64() % 8) as usize;
            let actual: Vec<f64> = (0..n).map(|_| rng.gen_range_f64(-2.0, 2.0)).collect();
            let expected: Vec<f64> = (0..n).map(|_| rng.gen_range_f64(-2.0, 2.0)).collect();
            check_loss(LossFunction::MeanSquaredError, &expected, &actual);
        }
    }
}

// ============================================================================
// Single layers
// ============================================================================

mod layer_gradient_tests {
    use super::*;

    #[test]
    fn test_dense_input_gradient() {
        let mut rng = SimpleRng::new(1);
        let layer = DenseLayer::new(4, Shape3::new(1, 1, 5), &mut rng).unwrap();
        let input = random_matrix(3, 5, &mut rng, -1.0, 1.0);
        check_input_gradient(&layer, &input, &mut rng);
    }

    #[test]
    fn test_conv_input_gradient() {
        let mut rng = SimpleRng::new(2);
        let layer = ConvLayer::new(
            3,
            Window::new(2, 3),
            Window::new(1, 2),
            Shape3::new(2, 4, 5),
            &mut rng,
        )
        .unwrap();
        let input = random_matrix(2, 40, &mut rng, -1.0, 1.0);
        check_input_gradient(&layer, &input, &mut rng);
    }

    #[test]
    fn test_maxpool_input_gradient() {
        let mut rng = SimpleRng::new(3);
        let layer = MaxPoolLayer::new(Window::new(2, 2), Window::new(1, 1), Shape3::new(2, 3, 3))
            .unwrap();
        // distinct values keep every window's maximum unique
        let input = random_matrix(2, 18, &mut rng, -1.0, 1.0);
        check_input_gradient(&layer, &input, &mut rng);
    }

    #[test]
    fn test_sigmoid_input_gradient() {
        let mut rng = SimpleRng::new(4);
        let layer = SigmoidLayer::new(Shape3::new(1, 1, 6));
        let input = random_matrix(2, 6, &mut rng, -3.0, 3.0);
        check_input_gradient(&layer, &input, &mut rng);
    }

    #[test]
    fn test_softmax_input_gradient() {
        let mut rng = SimpleRng::new(5);
        let layer = SoftmaxLayer::new(Shape3::new(1, 1, 4));
        let input = random_matrix(3, 4, &mut rng, -2.0, 2.0);
        check_input_gradient(&layer, &input, &mut rng);
    }

    #[test]
    fn test_conv_parameter_gradient() {
        let mut rng = SimpleRng::new(6);
        let mut layer = ConvLayer::new(
            2,
            Window::new(2, 2),
            Window::new(1, 1),
            Shape3::new(1, 3, 3),
            &mut rng,
        )
        .unwrap();
        let input = random_matrix(2, 9, &mut rng, -1.0, 1.0);
        let pass = layer.forward(&input).unwrap();
        let upstream = random_matrix(2, pass.output().cols(), &mut rng, -1.0, 1.0);
        let analytic = layer.backward(&upstream, &input, &pass).unwrap().parameters.unwrap();

        let filters = layer.filters().clone();
        for i in 0..filters.len() {
            let mut plus = filters.clone();
            plus.as_mut_slice()[i] += EPS;
            layer.set_filters(plus).unwrap();
            let f_plus = weighted_sum(layer.forward(&input).unwrap().output(), &upstream);

            let mut minus = filters.clone();
            minus.as_mut_slice()[i] -= EPS;
            layer.set_filters(minus).unwrap();
            let f_minus = weighted_sum(layer.forward(&input).unwrap().output(), &upstream);

            let numeric = (f_plus - f_minus) / (2.0 * EPS);
            assert_close(analytic.as_slice()[i], numeric, &format!("filter {}", i));
        }
    }
}

// ============================================================================
// Whole networks
// ============================================================================

mod network_gradient_tests {
    use super::*;

    fn batch_loss(net: &Network, x: &Matrix, y: &Matrix) -> f64 {
        net.loss().batch_loss(y, &net.forward_batch(x).unwrap()).unwrap()
    }

    /// Compare one unit-rate mini-batch step against finite differences of
    /// the batch loss, for every parameter of every trainable layer.
    fn check_network(net: Network, x: &Matrix, y: &Matrix) {
        let mut stepped = net.clone();
        let rule = MiniBatch::new(1.0).update_rule(0);
        stepped.train_batch(x, y, &rule).unwrap();

        for (index, layer) in net.layers().iter().enumerate() {
            let Some(before) = layer.parameters() else {
                continue;
            };
            let after = stepped.layers()[index].parameters().unwrap();

            for i in 0..before.len() {
                let analytic = before.as_slice()[i] - after.as_slice()[i];

                let mut perturbed = net.clone();
                let mut plus = before.clone();
                plus.as_mut_slice()[i] += EPS;
                perturbed.layer_mut(index).unwrap().set_parameters(plus).unwrap();
                let f_plus = batch_loss(&perturbed, x, y);

                let mut minus = before.clone();
                minus.as_mut_slice()[i] -= EPS;
                perturbed.layer_mut(index).unwrap().set_parameters(minus).unwrap();
                let f_minus = batch_loss(&perturbed, x, y);

                let numeric = (f_plus - f_minus) / (2.0 * EPS);
                assert_close(analytic, numeric, &format!("layer {} parameter {}", index, i));
            }
        }
    }

    #[test]
    fn test_mlp_gradients() {
        let mut net = Network::with_seed(17);
        net.add_dense(5, Some(Shape3::new(1, 1, 4)), Some(Activation::Sigmoid))
            .unwrap();
        net.add_dense(3, None, None).unwrap();
        net.compile(LossFunction::CrossEntropy, MiniBatch::new(1.0), &[])
            .unwrap();

        let mut rng = SimpleRng::new(18);
        let x = random_matrix(4, 4, &mut rng, -1.0, 1.0);
        let mut y = Matrix::zeros(4, 3);
        for n in 0..4 {
            y.set(n, n % 3, 1.0);
        }
        check_network(net, &x, &y);
    }

    #[test]
    fn test_cnn_gradients() {
        let mut net = Network::with_seed(23);
        net.add_conv(
            2,
            Window::new(2, 2),
            Some(Shape3::new(1, 5, 5)),
            None,
            Some(Activation::Sigmoid),
        )
        .unwrap();
        net.add_max_pool(Window::new(2, 2), None, None).unwrap();
        net.add_dense(2, None, None).unwrap();
        net.compile(LossFunction::CrossEntropy, MiniBatch::new(1.0), &[])
            .unwrap();

        let mut rng = SimpleRng::new(24);
        let x = random_matrix(3, 25, &mut rng, 0.0, 1.0);
        let y = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        check_network(net, &x, &y);
    }

    #[test]
    fn test_mse_sigmoid_output_gradients() {
        let mut net = Network::with_seed(29);
        net.add_dense(3, Some(Shape3::new(1, 2, 2)), Some(Activation::Sigmoid))
            .unwrap();
        net.add_dense(2, None, Some(Activation::Sigmoid)).unwrap();
        net.compile(LossFunction::MeanSquaredError, MiniBatch::new(1.0), &[])
            .unwrap();

        let mut rng = SimpleRng::new(30);
        let x = random_matrix(2, 4, &mut rng, -1.0, 1.0);
        let y = random_matrix(2, 2, &mut rng, 0.0, 1.0);
        check_network(net, &x, &y);
    }
}
