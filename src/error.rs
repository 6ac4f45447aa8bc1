//! Error types for network assembly, training and persistence.

/// Errors that can occur while building, training or (de)serializing a network.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Two operands have incompatible shapes (matrix product, gradient vs.
    /// cached input, loss vs. expected vector, reshape element count).
    #[error("dimension mismatch: {0}")]
    Dimension(String),

    /// The API was used out of order, e.g. training before `compile`.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A serialized model could not be parsed.
    #[error("invalid network format: {0}")]
    InvalidFormat(String),

    /// Reading or writing a model or config file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON training configuration is malformed.
    #[error("failed to parse config: {0}")]
    Config(#[from] serde_json::Error),

    /// A training configuration parsed but holds unusable values.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetworkError>;

impl NetworkError {
    pub(crate) fn dimension(msg: impl Into<String>) -> Self {
        NetworkError::Dimension(msg.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        NetworkError::InvalidOperation(msg.into())
    }

    pub(crate) fn invalid_format(msg: impl Into<String>) -> Self {
        NetworkError::InvalidFormat(msg.into())
    }

    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        NetworkError::InvalidConfig(msg.into())
    }
}
