//! Plain-text model files
//!
//! A model file is line oriented:
//!
//! ```text
//! Inshape: 1 28 28
//! conv -n 8 -d 3 3 -s 1 1
//! <one line of filter values per filter-matrix row>
//! relu
//! maxpool -d 2 2 -s 2 2
//! dense -n 10
//! <one line of weights per weight-matrix row>
//! softmax
//! crossEntropy
//! adam 0.001 0.9 0.999 0.00000001
//! metrics: accuracy
//! ```
//!
//! The loss, optimizer and metrics lines are written only for compiled
//! networks. A file that stops after the layers loads as an uncompiled
//! network. Parameter values use Rust's shortest round-trip float format, so
//! a saved network reloads bit-for-bit.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{NetworkError, Result};
use crate::layers::{Activation, Layer, Window};
use crate::loss::LossFunction;
use crate::matrix::Matrix;
use crate::metrics::Metric;
use crate::network::Network;
use crate::optimizers::{Optimizer, OptimizerKind};
use crate::tensor::Shape3;

const INSHAPE_TAG: &str = "Inshape:";
const METRICS_TAG: &str = "metrics:";

/// Write `network` in model-file form.
///
/// # Errors
///
/// `InvalidOperation` if the network is not compiled, `Io` if writing fails.
pub fn write_network<W: Write>(network: &Network, mut out: W) -> Result<()> {
    network.ensure_compiled()?;
    let shape = network
        .in_shape()
        .ok_or_else(|| NetworkError::invalid_operation("cannot write a network without layers"))?;

    writeln!(out, "{} {} {} {}", INSHAPE_TAG, shape.depth, shape.height, shape.width)?;
    for layer in network.layers() {
        writeln!(out, "{}", layer.header())?;
        if let Some(params) = layer.parameters() {
            for row in params.row_iter() {
                let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                writeln!(out, "{}", values.join(" "))?;
            }
        }
    }
    writeln!(out, "{}", network.loss().name())?;
    writeln!(out, "{}", network.optimizer().header())?;

    write!(out, "{}", METRICS_TAG)?;
    for metric in network.metrics() {
        write!(out, " {}", metric.name())?;
    }
    writeln!(out)?;
    Ok(())
}

/// Model-file form of `network` as a string.
pub fn network_to_string(network: &Network) -> Result<String> {
    let mut buf = Vec::new();
    write_network(network, &mut buf)?;
    String::from_utf8(buf).map_err(|e| NetworkError::invalid_format(e.to_string()))
}

impl Network {
    /// Write the network to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        write_network(self, &mut out)?;
        out.flush()?;
        info!("saved network to {}", path.display());
        Ok(())
    }

    /// Read a network written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Network> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let network = read_network(&text)?;
        info!("loaded network from {}", path.display());
        Ok(network)
    }
}

/// Non-blank, trimmed lines with their one-based line numbers.
fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
}

/// Prefix `err` with the line it came from. Everything raised while reading
/// a model becomes a format error.
fn at_line(line: usize, err: NetworkError) -> NetworkError {
    match err {
        NetworkError::InvalidFormat(msg) => {
            NetworkError::invalid_format(format!("line {}: {}", line, msg))
        }
        other => NetworkError::invalid_format(format!("line {}: {}", line, other)),
    }
}

fn parse_usize(token: &str) -> Result<usize> {
    token
        .parse()
        .map_err(|_| NetworkError::invalid_format(format!("'{}' is not a non-negative integer", token)))
}

fn parse_f64(token: &str) -> Result<f64> {
    token
        .parse()
        .map_err(|_| NetworkError::invalid_format(format!("'{}' is not a number", token)))
}

/// Flags of a layer line: `-n <count>`, `-d <rows> <cols>`, `-s <rows> <cols>`.
#[derive(Debug, Default)]
struct LayerOptions {
    count: Option<usize>,
    window: Option<Window>,
    stride: Option<Window>,
}

impl LayerOptions {
    /// Parse `tokens`, accepting only the flags in `allowed`.
    fn parse(layer: &str, tokens: &[&str], allowed: &[&str]) -> Result<Self> {
        let mut opts = LayerOptions::default();
        let mut rest = tokens;
        while let Some((flag, tail)) = rest.split_first() {
            let arity = match *flag {
                "-n" => 1,
                "-d" | "-s" => 2,
                other => {
                    return Err(NetworkError::invalid_format(format!(
                        "unknown option '{}'",
                        other
                    )))
                }
            };
            if !allowed.contains(flag) {
                return Err(NetworkError::invalid_format(format!(
                    "option '{}' is not valid for {} layers",
                    flag, layer
                )));
            }
            if tail.len() < arity {
                return Err(NetworkError::invalid_format(format!(
                    "option '{}' needs {} values",
                    flag, arity
                )));
            }
            let values = tail[..arity]
                .iter()
                .map(|t| parse_usize(t))
                .collect::<Result<Vec<usize>>>()?;
            match *flag {
                "-n" => opts.count = Some(values[0]),
                "-d" => opts.window = Some(Window::from_slice(&values)?),
                _ => opts.stride = Some(Window::from_slice(&values)?),
            }
            rest = &tail[arity..];
        }
        Ok(opts)
    }

    fn require_count(&self, layer: &str) -> Result<usize> {
        self.count
            .ok_or_else(|| NetworkError::invalid_format(format!("{} layer is missing '-n'", layer)))
    }

    fn require_window(&self, layer: &str) -> Result<Window> {
        self.window
            .ok_or_else(|| NetworkError::invalid_format(format!("{} layer is missing '-d'", layer)))
    }
}

fn parse_in_shape(line: &str) -> Result<Shape3> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.split_first() {
        Some((&INSHAPE_TAG, dims)) if dims.len() == 3 => {
            let dims = dims
                .iter()
                .map(|t| parse_usize(t))
                .collect::<Result<Vec<usize>>>()?;
            Shape3::from_slice(&dims).map_err(|_| {
                NetworkError::invalid_format(format!(
                    "'{}' {} {} {} is too large",
                    INSHAPE_TAG, dims[0], dims[1], dims[2]
                ))
            })
        }
        Some((&INSHAPE_TAG, dims)) => Err(NetworkError::invalid_format(format!(
            "'{}' needs three dimensions, found {}",
            INSHAPE_TAG,
            dims.len()
        ))),
        Some((first, _)) => Err(NetworkError::invalid_format(format!(
            "expected '{}', found '{}'",
            INSHAPE_TAG, first
        ))),
        None => Err(NetworkError::invalid_format(format!("missing '{}' line", INSHAPE_TAG))),
    }
}

/// Read the parameter rows following a Dense or Conv line into the last layer.
fn read_parameters<'a>(
    network: &mut Network,
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    header_line: usize,
) -> Result<()> {
    let index = network.layers().len().saturating_sub(1);
    let (rows, cols) = match network.layers().last().and_then(|l| l.parameters()) {
        Some(p) => p.shape(),
        None => return Ok(()),
    };

    let mut values = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        let (line_no, line) = lines.next().ok_or_else(|| {
            NetworkError::invalid_format(format!(
                "line {}: expected {} parameter rows, file ends after {}",
                header_line, rows, row
            ))
        })?;
        let before = values.len();
        for token in line.split_whitespace() {
            values.push(parse_f64(token).map_err(|e| at_line(line_no, e))?);
        }
        let found = values.len() - before;
        if found != cols {
            return Err(NetworkError::invalid_format(format!(
                "line {}: expected {} parameter values, found {}",
                line_no, cols, found
            )));
        }
    }

    let matrix = Matrix::from_vec(rows, cols, values)?;
    match network.layer_mut(index) {
        Some(layer) => layer.set_parameters(matrix),
        None => Ok(()),
    }
}

/// Add the layer described by `tokens` to `network`.
fn add_layer(network: &mut Network, tokens: &[&str], in_shape: Option<Shape3>) -> Result<()> {
    let (name, args) = tokens
        .split_first()
        .ok_or_else(|| NetworkError::invalid_format("empty layer line"))?;
    let activation = match *name {
        "relu" => Some(Activation::Relu),
        "sigmoid" => Some(Activation::Sigmoid),
        "softmax" => Some(Activation::Softmax),
        _ => None,
    };
    if let Some(activation) = activation {
        if let Some(extra) = args.first() {
            return Err(NetworkError::invalid_format(format!(
                "unexpected '{}' after '{}'",
                extra, name
            )));
        }
        return network.add_activation(activation);
    }

    match *name {
        "dense" => {
            let opts = LayerOptions::parse(name, args, &["-n"])?;
            network.add_dense(opts.require_count(name)?, in_shape, None)
        }
        "conv" => {
            let opts = LayerOptions::parse(name, args, &["-n", "-d", "-s"])?;
            network.add_conv(
                opts.require_count(name)?,
                opts.require_window(name)?,
                in_shape,
                opts.stride,
                None,
            )
        }
        "maxpool" => {
            let opts = LayerOptions::parse(name, args, &["-d", "-s"])?;
            network.add_max_pool(opts.require_window(name)?, in_shape, opts.stride)
        }
        other => Err(NetworkError::invalid_format(format!(
            "unknown layer type '{}'",
            other
        ))),
    }
}

fn parse_metrics(line: &str) -> Result<Vec<Metric>> {
    let rest = line.strip_prefix(METRICS_TAG).ok_or_else(|| {
        NetworkError::invalid_format(format!("expected '{}', found '{}'", METRICS_TAG, line))
    })?;
    rest.split_whitespace().map(|t| t.parse::<Metric>()).collect()
}

fn is_loss_line(tokens: &[&str]) -> bool {
    tokens.len() == 1 && tokens[0].parse::<LossFunction>().is_ok()
}

/// Rebuild a network from model-file text.
///
/// # Errors
///
/// `InvalidFormat` for any malformed line, naming the offending token. No
/// partially read network is ever returned.
pub fn read_network(text: &str) -> Result<Network> {
    let mut lines = content_lines(text);
    let (first_no, first) = lines
        .next()
        .ok_or_else(|| NetworkError::invalid_format(format!("missing '{}' line", INSHAPE_TAG)))?;
    let in_shape = parse_in_shape(first).map_err(|e| at_line(first_no, e))?;

    let mut network = Network::new();
    let mut loss = None;
    while let Some((line_no, line)) = lines.next() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if is_loss_line(&tokens) {
            loss = Some(tokens[0].parse::<LossFunction>().map_err(|e| at_line(line_no, e))?);
            break;
        }
        let shape = network.layers().is_empty().then_some(in_shape);
        add_layer(&mut network, &tokens, shape).map_err(|e| at_line(line_no, e))?;
        read_parameters(&mut network, &mut lines, line_no).map_err(|e| match e {
            NetworkError::InvalidFormat(_) => e,
            other => at_line(line_no, other),
        })?;
        if let Some(layer) = network.layers().last() {
            debug!("read {}", layer.describe());
        }
    }

    let Some(loss) = loss else {
        return Ok(network);
    };

    let (opt_no, opt_line) = lines
        .next()
        .ok_or_else(|| NetworkError::invalid_format("missing optimizer line after the loss"))?;
    let opt_tokens: Vec<&str> = opt_line.split_whitespace().collect();
    let optimizer = OptimizerKind::from_tokens(&opt_tokens).map_err(|e| at_line(opt_no, e))?;

    let (metrics_no, metrics_line) = lines
        .next()
        .ok_or_else(|| NetworkError::invalid_format(format!("missing '{}' line", METRICS_TAG)))?;
    let metrics = parse_metrics(metrics_line).map_err(|e| at_line(metrics_no, e))?;

    if let Some((extra_no, extra)) = lines.next() {
        return Err(NetworkError::invalid_format(format!(
            "line {}: unexpected '{}' after the metrics line",
            extra_no, extra
        )));
    }

    network
        .compile(loss, optimizer, &metrics)
        .map_err(|e| at_line(first_no, e))?;
    debug!("model uses {} with {}", loss, optimizer.name());
    Ok(network)
}
