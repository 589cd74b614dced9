use thiserror::Error;

use crate::tensor::TensorId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model deserialization error: {0}")]
    Deserialization(#[from] bincode::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// An input item has zero dimensions, an unsupported rank, or an unsupported channel count.
    #[error("Invalid input shape: {reason}")]
    InvalidInputShape { reason: String },

    /// The batch handed to the network, or the output it produced, does not have the
    /// shape the pipeline was built around. This is a programming error, not bad input.
    #[error("Batch shape mismatch: expected {expected:?}, got {actual:?}")]
    BatchShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A tensor was released twice, or was never allocated in this store.
    #[error("Tensor {id} was already disposed or never allocated")]
    ResourceDisposal { id: TensorId },
}

impl Error {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Error::InvalidInputShape {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
