//! Error taxonomy for the container parser, materializer, and inference engine.
//!
//! Mirrors the five classes laid out for this system: format errors surface from
//! the container reader and hyperparameter resolver, resource errors from device
//! buffer/command encoder allocation, numerical errors from dequantization or a
//! debug forward pass, logical errors from out-of-range input, and execution
//! errors from a failed command buffer completion. Every variant carries the
//! offending tensor name or step label so a caller can point at the failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("invalid magic marker (expected \"GGUF\")")]
    InvalidMagic,
    #[error("value of size {size} exceeds the allowed maximum ({max}) while reading {what}")]
    InvalidSize {
        what: &'static str,
        size: u64,
        max: u64,
    },
    #[error("tensor {name:?} has rank {rank}, exceeding the maximum of 16")]
    InvalidRank { name: String, rank: u32 },
    #[error("unsupported element type tag {tag} for tensor {name:?}")]
    UnsupportedType { name: String, tag: u32 },
    #[error("unsupported metadata value tag {tag} for key {key:?}")]
    UnsupportedMetadataType { key: String, tag: u32 },
    #[error("container is truncated while reading {what}")]
    OutOfBounds { what: &'static str },
    #[error("required metadata key {0:?} is missing")]
    MissingMetadata(String),
    #[error("metadata key {key:?} has the wrong type (expected {expected})")]
    InvalidMetadataType { key: String, expected: &'static str },
    #[error("unknown RoPE scaling type {0:?}")]
    UnknownRopeScalingType(String),
    #[error("cannot convert on-disk type {on_disk} to target precision {target}")]
    UnsupportedTensorType {
        on_disk: &'static str,
        target: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to allocate device buffer {label:?} ({bytes} bytes)")]
    BufferAllocation { label: String, bytes: usize },
    #[error("failed to create command encoder for step {step:?}")]
    EncoderCreation { step: String },
}

#[derive(Debug, Error)]
pub enum NumericalError {
    #[error("dequantization of {tensor:?} into {target} produced NaN or Inf")]
    DequantizationFailed { tensor: String, target: &'static str },
    #[error("forward pass step {step:?} produced NaN or Inf")]
    ForwardPassInvalid { step: String },
}

#[derive(Debug, Error)]
pub enum LogicalError {
    #[error("token id {token} is out of range [0, {vocab_size})")]
    TokenOutOfRange { token: i64, vocab_size: usize },
    #[error("position {position} has reached the maximum sequence length {max_sequence_length}")]
    PositionExhausted {
        position: usize,
        max_sequence_length: usize,
    },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("command buffer step {step:?} failed: {source}")]
    CommandFailed {
        step: String,
        #[source]
        source: candle_core::Error,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Numerical(#[from] NumericalError),
    #[error(transparent)]
    Logical(#[from] LogicalError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tensor backend error: {0}")]
    Tensor(#[from] candle_core::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
