// sequential_train.rs
// Train a small convolutional network on a synthetic "bars" dataset and save it.
//
// Usage:
//   sequential_train [config.json] [model_out.txt]
//
// The dataset holds 6x6 single-channel images with either one vertical or one
// horizontal bar of ones plus noise; the network has to tell them apart.
// Without a config file the run uses the defaults of config/train_bars.json.
// Set RUST_LOG=debug to see per-batch progress.

use std::env;
use std::process;

use sequential_nn::config::{load_config, OptimizerConfig, TrainingConfig};
use sequential_nn::layers::Window;
use sequential_nn::loss::LossFunction;
use sequential_nn::matrix::Matrix;
use sequential_nn::metrics::Metric;
use sequential_nn::network::Network;
use sequential_nn::tensor::{Shape3, Tensor4};
use sequential_nn::utils::SimpleRng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SIDE: usize = 6;
const TRAIN_SAMPLES: usize = 256;
const TEST_SAMPLES: usize = 64;
const NOISE: f64 = 0.2;

/// Images with a random bar and their one-hot labels (0 = vertical, 1 = horizontal).
fn bars_dataset(samples: usize, rng: &mut SimpleRng) -> sequential_nn::Result<(Tensor4, Matrix)> {
    let shape = Shape3::new(1, SIDE, SIDE);
    let mut pixels = Vec::with_capacity(samples * shape.size());
    let mut labels = Matrix::zeros(samples, 2);

    for n in 0..samples {
        let horizontal = rng.next_u64() % 2 == 1;
        let line = (rng.next_u64() % SIDE as u64) as usize;
        for r in 0..SIDE {
            for c in 0..SIDE {
                let on = if horizontal { r == line } else { c == line };
                let base = if on { 1.0 } else { 0.0 };
                pixels.push(base + rng.gen_range_f64(0.0, NOISE));
            }
        }
        labels.set(n, usize::from(horizontal), 1.0);
    }

    let mut images = Tensor4::new(samples, shape, pixels)?;
    images.min_max_normalize();
    Ok((images, labels))
}

fn default_config() -> TrainingConfig {
    TrainingConfig {
        batch_size: 16,
        epochs: 5,
        loss: LossFunction::CrossEntropy,
        metrics: vec![Metric::Accuracy],
        optimizer: OptimizerConfig::Adam {
            alpha: 0.01,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        },
    }
}

fn run() -> sequential_nn::Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => {
            info!("loading config from {}", path);
            load_config(path)?
        }
        None => default_config(),
    };
    let model_path = args.get(2).map(String::as_str).unwrap_or("bars_model.txt");

    let mut rng = SimpleRng::new(2024);
    let (train_x, train_y) = bars_dataset(TRAIN_SAMPLES, &mut rng)?;
    let (test_x, test_y) = bars_dataset(TEST_SAMPLES, &mut rng)?;

    let mut net = Network::with_seed(7);
    net.add_conv(4, Window::new(3, 3), Some(train_x.shape()), None, None)?;
    net.add_max_pool(Window::new(2, 2), None, None)?;
    net.add_dense(2, None, None)?;
    net.compile_with_config(&config)?;
    info!("network:\n{}", net.summary());

    let reports = net.fit_with_config(&train_x, &train_y, &config)?;
    if let Some(last) = reports.last() {
        info!("final training loss {:.4}", last.loss);
    }

    let eval = net.evaluate(&test_x, &test_y)?;
    match eval.accuracy {
        Some(acc) => info!("test loss {:.4}, accuracy {:.2}%", eval.loss, acc * 100.0),
        None => info!("test loss {:.4}", eval.loss),
    }

    net.save(model_path)?;
    let reloaded = Network::load(model_path)?;
    let again = reloaded.evaluate(&test_x, &test_y)?;
    info!("reloaded model test loss {:.4}", again.loss);
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        error!("{}", err);
        process::exit(1);
    }
}
