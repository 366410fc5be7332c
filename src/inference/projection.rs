// Minimal safetensors reader for a single dense weight matrix. Not built on
// the `safetensors` crate: the on-disk contract here is exactly one fixed
// tensor (`linear.weight`, F32, rank 2), not a general multi-tensor format.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

const TENSOR_NAME: &str = "linear.weight";

#[derive(Debug, Deserialize)]
struct TensorHeaderEntry {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// A loaded dense linear projection with no bias: `out[i] = Σ_j W[i,j]·in[j]`.
#[derive(Debug)]
pub struct Projection {
    weights: Vec<f32>,
    out_dim: usize,
    in_dim: usize,
}

impl Projection {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        if bytes.len() < 8 {
            return Err(truncated(path, "file shorter than the 8-byte header length"));
        }

        let header_len = u64::from_le_bytes(bytes[0..8].try_into().unwrap()) as usize;
        let header_start: usize = 8;
        let header_end = header_start
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| truncated(path, "header length exceeds file size"))?;

        let header_json = std::str::from_utf8(&bytes[header_start..header_end])
            .map_err(|_| truncated(path, "header is not valid UTF-8"))?;
        let header: HashMap<String, serde_json::Value> = serde_json::from_str(header_json)
            .map_err(|e| truncated(path, &format!("header is not valid JSON: {e}")))?;

        let entry_value = header
            .get(TENSOR_NAME)
            .ok_or_else(|| truncated(path, &format!("missing tensor {TENSOR_NAME:?}")))?;
        let entry: TensorHeaderEntry = serde_json::from_value(entry_value.clone())
            .map_err(|e| truncated(path, &format!("malformed tensor entry: {e}")))?;

        if entry.dtype != "F32" {
            return Err(ConfigError::UnsupportedDtype {
                name: TENSOR_NAME.to_string(),
                found: entry.dtype,
            });
        }
        if entry.shape.len() != 2 {
            return Err(ConfigError::UnsupportedRank {
                name: TENSOR_NAME.to_string(),
                found: entry.shape.len(),
            });
        }

        let out_dim = entry.shape[0];
        let in_dim = entry.shape[1];
        let expected_bytes = out_dim * in_dim * 4;
        let [start, end] = entry.data_offsets;
        if end < start || end - start != expected_bytes {
            return Err(truncated(path, "data_offsets do not match shape * 4 bytes"));
        }

        let data_start = header_end + start;
        let data_end = header_end + end;
        if data_end > bytes.len() {
            return Err(truncated(path, "tensor payload extends past end of file"));
        }

        let payload = &bytes[data_start..data_end];
        let mut weights = Vec::with_capacity(out_dim * in_dim);
        for chunk in payload.chunks_exact(4) {
            weights.push(f32::from_le_bytes(chunk.try_into().unwrap()));
        }

        Ok(Self {
            weights,
            out_dim,
            in_dim,
        })
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    /// Validates `input.len() == in_dim` against the embedder's output
    /// dimension at embedder construction time, not per call.
    pub fn apply(&self, input: &[f32]) -> Vec<f32> {
        let mut out = vec![0.0f32; self.out_dim];
        for i in 0..self.out_dim {
            let row = &self.weights[i * self.in_dim..(i + 1) * self.in_dim];
            let mut acc = 0.0f32;
            for j in 0..self.in_dim {
                acc += row[j] * input[j];
            }
            out[i] = acc;
        }
        out
    }
}

fn truncated(path: &Path, reason: &str) -> ConfigError {
    ConfigError::MalformedTensorFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
