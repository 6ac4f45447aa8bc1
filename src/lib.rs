//! Sequential Neural Networks Library
//!
//! Feed-forward and convolutional networks with analytically derived
//! backpropagation, built on a small dense matrix kernel.
//!
//! # Modules
//!
//! - `matrix`, `tensor`: row-major matrices, 3D shapes and 4D input tensors
//! - `layers`: Layer trait and implementations (Relu, Sigmoid, Softmax,
//!   Dense, Conv, MaxPool) plus the index maps behind Conv and MaxPool
//! - `network`: the sequential container (assembly, training, inference)
//! - `loss`, `metrics`: loss functions and accuracy
//! - `optimizers`: mini-batch gradient descent and Adam
//! - `serialization`: the plain-text model file format
//! - `config`: JSON training configuration
//! - `report`: training progress callbacks
//! - `utils`: RNG and He-normal initialization
//!
//! # Example
//!
//! ```
//! use sequential_nn::loss::LossFunction;
//! use sequential_nn::metrics::Metric;
//! use sequential_nn::network::Network;
//! use sequential_nn::optimizers::MiniBatch;
//! use sequential_nn::tensor::{Shape3, Tensor4};
//! use sequential_nn::matrix::Matrix;
//!
//! let mut net = Network::with_seed(42);
//! net.add_dense(8, Some(Shape3::new(1, 1, 2)), None).unwrap();
//! net.add_dense(2, None, None).unwrap();
//! net.compile(LossFunction::CrossEntropy, MiniBatch::new(0.1), &[Metric::Accuracy]).unwrap();
//!
//! let x = Tensor4::new(2, Shape3::new(1, 1, 2), vec![0.0, 1.0, 1.0, 0.0]).unwrap();
//! let y = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
//! let reports = net.fit(&x, &y, 2, 3).unwrap();
//! assert_eq!(reports.len(), 3);
//! ```

pub mod config;
pub mod error;
pub mod layers;
pub mod loss;
pub mod matrix;
pub mod metrics;
pub mod network;
pub mod optimizers;
pub mod report;
pub mod serialization;
pub mod tensor;
pub mod utils;

pub use error::{NetworkError, Result};
pub use network::{Evaluation, Network};
