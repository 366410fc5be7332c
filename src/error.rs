// Error taxonomy for the classification engine and pipeline.
//
// Mirrors the propagation policy: config errors are fatal and accumulated,
// inference/output/transport errors are scoped to the call that produced
// them and handled by the caller (the pipeline turns them into skips).

use std::path::PathBuf;

use thiserror::Error;

/// Startup/validation failures. Accumulated via `Multiple` so a single
/// run reports every distinct problem instead of failing on the first one.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("missing required file: {path}")]
    MissingFile { path: PathBuf },

    #[error("vocabulary file is empty: {path}")]
    EmptyVocabulary { path: PathBuf },

    #[error("vocabulary at {path} is missing required special token {token:?}")]
    MissingSpecialToken { path: PathBuf, token: &'static str },

    #[error("safetensors file {path} is truncated or malformed: {reason}")]
    MalformedTensorFile { path: PathBuf, reason: String },

    #[error("safetensors tensor {name:?} has dtype {found}, expected F32")]
    UnsupportedDtype { name: String, found: String },

    #[error("safetensors tensor {name:?} has rank {found}, expected 2")]
    UnsupportedRank { name: String, found: usize },

    #[error(
        "embedder output dimension {embedder_dim} does not match projection input dimension {projection_dim}"
    )]
    DimensionMismatch {
        embedder_dim: usize,
        projection_dim: usize,
    },

    #[error("ONNX model at {path} is missing required input {input:?}")]
    MissingModelInput { path: PathBuf, input: &'static str },

    #[error("ONNX model at {path} does not expose a single 3-D float32 output")]
    InvalidModelOutput { path: PathBuf },

    #[error("option {name} = {value:?} is out of range: {reason}")]
    OutOfRange {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("invalid value for {name}: {value:?} is not one of {allowed:?}")]
    InvalidEnum {
        name: &'static str,
        value: String,
        allowed: &'static [&'static str],
    },

    #[error("{name} is required when connector {connector:?} is selected")]
    MissingRequiredOption {
        name: &'static str,
        connector: String,
    },

    #[error("query mode requires `from` <= `to`")]
    InvalidQueryRange,

    #[error("unknown connector {0:?}")]
    UnknownConnector(String),

    #[error("{} configuration problem(s):\n{}", .0.len(), join_multi(.0))]
    Multiple(Vec<ConfigError>),
}

fn join_multi(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("  {}. {e}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ConfigError {
    /// Flatten a list of fallible results into either `Ok(values)` or a
    /// single `ConfigError::Multiple` carrying every failure.
    pub fn collect<T>(results: Vec<Result<T, ConfigError>>) -> Result<Vec<T>, ConfigError> {
        let mut values = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(v) => values.push(v),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            Ok(values)
        } else {
            Err(ConfigError::Multiple(errors))
        }
    }
}

/// Runtime failure in the ONNX forward pass.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("ONNX runtime failed: {0}")]
    Runtime(String),
    #[error("failed to build input tensor: {0}")]
    TensorBuild(String),
    #[error("failed to extract output tensor: {0}")]
    TensorExtract(String),
}

/// Reserved for tokenizer failures. No code path in this crate produces
/// one for well-formed vocabularies, but callers that want to match
/// exhaustively against the engine's error family need the variant to exist.
#[derive(Debug, Error)]
pub enum TokenizationError {
    #[error("tokenization failed: {0}")]
    Failed(String),
}

/// Write/close failure on an output sink.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("write failed: {0}")]
    Write(String),
    #[error("close failed: {0}")]
    Close(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// HTTP-layer failure for the webhook sink.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server error {status}, retries exhausted: {body}")]
    ServerError { status: u16, body: String },
    #[error("client error {status}: {body}")]
    ClientError { status: u16, body: String },
}

/// Processing was aborted by a cancellation signal.
#[derive(Debug, Error)]
#[error("operation canceled")]
pub struct CancellationError;
