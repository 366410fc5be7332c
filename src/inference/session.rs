// Thin wrapper around the ONNX Runtime session for the BERT-family encoder.
// The runtime environment is process-wide and initialized exactly once;
// everything downstream of that is plain `ort` session usage.

use std::path::Path;
use std::sync::{Mutex, OnceLock};

use ort::session::Session;
use ort::value::Tensor;

use crate::error::{ConfigError, InferenceError};

const REQUIRED_INPUTS: [&str; 3] = ["input_ids", "attention_mask", "token_type_ids"];

static RUNTIME_ENV: OnceLock<()> = OnceLock::new();

fn ensure_runtime_initialized() {
    RUNTIME_ENV.get_or_init(|| {
        // Best-effort: a prior call elsewhere in the process (e.g. tests
        // constructing multiple sessions) may have already committed this.
        let _ = ort::init().with_name("logtriage").commit();
    });
}

/// Validated wrapper over an `ort::session::Session`. Construction fails if
/// the model doesn't expose the expected BERT-style signature.
pub struct InferenceSession {
    session: Mutex<Session>,
    hidden_dim: usize,
}

impl InferenceSession {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        ensure_runtime_initialized();

        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.with_inter_threads(1))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|_| ConfigError::MissingFile {
                path: path.to_path_buf(),
            })?;

        for required in REQUIRED_INPUTS {
            if !session.inputs().iter().any(|i| i.name() == required) {
                return Err(ConfigError::MissingModelInput {
                    path: path.to_path_buf(),
                    input: required_static(required),
                });
            }
        }

        let hidden_dim = output_hidden_dim(&session).ok_or_else(|| ConfigError::InvalidModelOutput {
            path: path.to_path_buf(),
        })?;

        Ok(Self {
            session: Mutex::new(session),
            hidden_dim,
        })
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Runs the forward pass for a packed batch, returning the flat
    /// `[batch * seq * hidden_dim]` hidden-state buffer.
    pub fn infer(
        &self,
        input_ids: &[i64],
        attention_mask: &[i64],
        token_type_ids: &[i64],
        batch_size: usize,
        seq_len: usize,
    ) -> Result<Vec<f32>, InferenceError> {
        let shape = [batch_size as i64, seq_len as i64];

        let input_ids_tensor = Tensor::from_array((shape, input_ids.to_vec()))
            .map_err(|e| InferenceError::TensorBuild(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask.to_vec()))
            .map_err(|e| InferenceError::TensorBuild(e.to_string()))?;
        let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids.to_vec()))
            .map_err(|e| InferenceError::TensorBuild(e.to_string()))?;

        let mut session = self.session.lock().expect("inference session mutex poisoned");
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::TensorExtract(e.to_string()))?;

        Ok(data.to_vec())
    }
}

fn output_hidden_dim(session: &Session) -> Option<usize> {
    if session.outputs().len() != 1 {
        return None;
    }
    match session.outputs()[0].dtype() {
        ort::value::ValueType::Tensor { ty, shape, .. } => {
            if *ty != ort::tensor::TensorElementType::Float32 || shape.len() != 3 {
                return None;
            }
            let dim = shape[2];
            if dim <= 0 {
                None
            } else {
                Some(dim as usize)
            }
        }
        _ => None,
    }
}

/// The required-input list is a compile-time array of `&'static str`, so
/// matching back to one of its members is always a static lifetime.
fn required_static(name: &str) -> &'static str {
    REQUIRED_INPUTS
        .iter()
        .find(|&&r| r == name)
        .copied()
        .unwrap_or("input_ids")
}
