//! Configuration structures for training
//!
//! A training run can be described by a small JSON file instead of code:
//! batch size, epoch count, loss, metrics and optimizer.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, Result};
use crate::loss::LossFunction;
use crate::metrics::Metric;
use crate::optimizers::{Adam, MiniBatch, OptimizerKind};

/// Optimizer section of a training configuration.
///
/// Tagged by `"type"`; omitted hyperparameters take the optimizer defaults.
///
/// ```json
/// { "type": "mini", "learn_rate": 0.05 }
/// { "type": "adam", "alpha": 0.001 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OptimizerConfig {
    #[serde(rename = "mini")]
    MiniBatch {
        #[serde(default = "default_learn_rate")]
        learn_rate: f64,
    },
    #[serde(rename = "adam")]
    Adam {
        #[serde(default = "default_alpha")]
        alpha: f64,
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
}

fn default_learn_rate() -> f64 {
    0.01
}

fn default_alpha() -> f64 {
    0.001
}

fn default_beta1() -> f64 {
    0.9
}

fn default_beta2() -> f64 {
    0.999
}

fn default_epsilon() -> f64 {
    1e-8
}

fn default_batch_size() -> usize {
    32
}

fn default_epochs() -> usize {
    1
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            alpha: default_alpha(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
        }
    }
}

impl OptimizerConfig {
    /// The optimizer this section describes.
    pub fn build(&self) -> OptimizerKind {
        match *self {
            OptimizerConfig::MiniBatch { learn_rate } => MiniBatch::new(learn_rate).into(),
            OptimizerConfig::Adam {
                alpha,
                beta1,
                beta2,
                epsilon,
            } => Adam::new(alpha, beta1, beta2, epsilon).into(),
        }
    }
}

/// Configuration for one training run.
///
/// # Example
///
/// ```json
/// {
///   "batch_size": 16,
///   "epochs": 3,
///   "loss": "crossEntropy",
///   "metrics": ["accuracy"],
///   "optimizer": { "type": "adam", "alpha": 0.002 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// `"meanSquaredError"` or `"crossEntropy"`
    #[serde(default)]
    pub loss: LossFunction,

    #[serde(default)]
    pub metrics: Vec<Metric>,

    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            loss: LossFunction::default(),
            metrics: Vec::new(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

/// Loads a training configuration from a JSON file.
///
/// # Errors
///
/// `Io` if the file cannot be read, `Config` if the JSON is malformed and
/// `InvalidConfig` if a value is out of range.
///
/// # Examples
///
/// ```no_run
/// use sequential_nn::config::load_config;
///
/// let cfg = load_config("config/train_bars.json").unwrap();
/// assert!(cfg.batch_size > 0);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate a JSON training configuration.
pub fn parse_config(json: &str) -> Result<TrainingConfig> {
    let config: TrainingConfig = serde_json::from_str(json)?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject values no training run can use.
pub fn validate_config(config: &TrainingConfig) -> Result<()> {
    if config.batch_size == 0 {
        return Err(NetworkError::invalid_config("batch_size must be positive"));
    }
    if config.epochs == 0 {
        return Err(NetworkError::invalid_config("epochs must be positive"));
    }

    match config.optimizer {
        OptimizerConfig::MiniBatch { learn_rate } => {
            if !(learn_rate >= 0.0) {
                return Err(NetworkError::invalid_config("learn_rate must be non-negative"));
            }
        }
        OptimizerConfig::Adam {
            alpha,
            beta1,
            beta2,
            epsilon,
        } => {
            if !(alpha >= 0.0) {
                return Err(NetworkError::invalid_config("alpha must be non-negative"));
            }
            for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
                if !(0.0..1.0).contains(&beta) {
                    return Err(NetworkError::invalid_config(format!(
                        "{} must be in [0, 1), got {}",
                        name, beta
                    )));
                }
            }
            if !(epsilon > 0.0) {
                return Err(NetworkError::invalid_config("epsilon must be positive"));
            }
        }
    }
    Ok(())
}
