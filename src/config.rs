// Typed, validated process configuration. Loaded from environment
// variables (optionally via a `.env` file); every discovered problem is
// accumulated into a single `ConfigError::Multiple` rather than failing
// fast on the first one.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::compactor::Verbosity;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Stream,
    Query,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub connector: String,
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub mode: Mode,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: usize,
    pub verbosity: Verbosity,
    pub pretty: bool,
    pub model_path: PathBuf,
    pub vocab_path: PathBuf,
    pub projection_path: PathBuf,
    pub confidence_threshold: f32,
    pub dedup_window: chrono::Duration,
    pub max_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Loads from the process environment, applying a `.env` file first if
    /// present. Accumulates every validation failure instead of stopping
    /// at the first one.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env(|key| std::env::var(key).ok())
    }

    /// Testable entry point that doesn't touch the real process environment.
    pub fn from_env(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let connector = get("CONNECTOR").unwrap_or_else(|| "memory".to_string());
        let api_key = get("API_KEY");
        let endpoint = get("ENDPOINT");

        let mode_raw = get("MODE").unwrap_or_else(|| "stream".to_string());
        let mode = match mode_raw.as_str() {
            "stream" => Ok(Mode::Stream),
            "query" => Ok(Mode::Query),
            other => Err(ConfigError::InvalidEnum {
                name: "mode",
                value: other.to_string(),
                allowed: &["stream", "query"],
            }),
        };

        let from = parse_optional_timestamp(get("FROM").as_deref());
        let to = parse_optional_timestamp(get("TO").as_deref());
        let limit = parse_with_default(get("LIMIT").as_deref(), 100usize, "limit");

        let verbosity_raw = get("VERBOSITY").unwrap_or_else(|| "standard".to_string());
        let verbosity = match verbosity_raw.as_str() {
            "minimal" => Ok(Verbosity::Minimal),
            "standard" => Ok(Verbosity::Standard),
            "full" => Ok(Verbosity::Full),
            other => Err(ConfigError::InvalidEnum {
                name: "verbosity",
                value: other.to_string(),
                allowed: &["minimal", "standard", "full"],
            }),
        };

        let pretty = get("PRETTY").map(|v| v == "true" || v == "1").unwrap_or(false);

        let model_path = path_option(&get, "MODEL_PATH", "model.onnx");
        let vocab_path = path_option(&get, "VOCAB_PATH", "vocab.txt");
        let projection_path = path_option(&get, "PROJECTION_PATH", "projection.safetensors");

        let confidence_threshold_raw: f32 = parse_with_default(get("CONFIDENCE_THRESHOLD").as_deref(), 0.5, "confidence_threshold");
        let confidence_threshold = validate_range(confidence_threshold_raw, 0.0, 1.0, "confidence_threshold");

        let dedup_window_secs: i64 = parse_with_default(get("DEDUP_WINDOW_SECS").as_deref(), 0i64, "dedup_window");
        let dedup_window = chrono::Duration::seconds(dedup_window_secs.max(0));

        let max_buffer_size: usize = parse_with_default(get("MAX_BUFFER_SIZE").as_deref(), 1000usize, "max_buffer_size");

        let shutdown_timeout_secs: u64 = parse_with_default(get("SHUTDOWN_TIMEOUT_SECS").as_deref(), 10u64, "shutdown_timeout");
        let shutdown_timeout = Duration::from_secs(shutdown_timeout_secs);

        let mut errors = Vec::new();
        if let Err(e) = &mode {
            errors.push(e.clone());
        }
        if let Err(e) = &verbosity {
            errors.push(e.clone());
        }
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                errors.push(ConfigError::InvalidQueryRange);
            }
        }
        if let Err(e) = &confidence_threshold {
            errors.push(e.clone());
        }
        for path_check in [
            ("model_path", &model_path),
            ("vocab_path", &vocab_path),
            ("projection_path", &projection_path),
        ] {
            if !path_check.1.exists() {
                errors.push(ConfigError::MissingFile {
                    path: path_check.1.clone(),
                });
            }
        }
        if connector != "memory" && endpoint.is_none() && matches!(mode, Ok(Mode::Stream)) {
            // Real connectors need an endpoint; the bundled memory connector doesn't.
            errors.push(ConfigError::MissingRequiredOption {
                name: "endpoint",
                connector: connector.clone(),
            });
        }

        if !errors.is_empty() {
            return Err(ConfigError::Multiple(errors));
        }

        Ok(Self {
            connector,
            api_key,
            endpoint,
            mode: mode.unwrap(),
            from,
            to,
            limit,
            verbosity: verbosity.unwrap(),
            pretty,
            model_path,
            vocab_path,
            projection_path,
            confidence_threshold: confidence_threshold.unwrap(),
            dedup_window,
            max_buffer_size,
            shutdown_timeout,
        })
    }
}

/// Platform data directory for bundled model artifacts:
/// `~/.local/share/logtriage/models/` on Linux.
fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("logtriage")
        .join("models")
}

fn path_option(get: &impl Fn(&str) -> Option<String>, key: &str, default_file: &str) -> PathBuf {
    match get(key) {
        Some(explicit) => PathBuf::from(explicit),
        None => default_model_dir().join(default_file),
    }
}

fn parse_optional_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_with_default<T: std::str::FromStr>(raw: Option<&str>, default: T, _name: &'static str) -> T {
    raw.and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn validate_range(value: f32, min: f32, max: f32, name: &'static str) -> Result<f32, ConfigError> {
    if value < min || value > max {
        Err(ConfigError::OutOfRange {
            name,
            value: value.to_string(),
            reason: "must be within [0, 1]",
        })
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn rejects_invalid_mode_and_verbosity_together() {
        let result = Config::from_env(env(&[("MODE", "bogus"), ("VERBOSITY", "loud")]));
        match result {
            Err(ConfigError::Multiple(errors)) => {
                assert!(errors.len() >= 2, "expected mode and verbosity both reported");
            }
            other => panic!("expected accumulated errors, got {other:?}"),
        }
    }

    #[test]
    fn rejects_confidence_threshold_out_of_range() {
        let result = Config::from_env(env(&[("CONFIDENCE_THRESHOLD", "1.5")]));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_inverted_query_range() {
        let result = Config::from_env(env(&[
            ("FROM", "2026-01-02T00:00:00Z"),
            ("TO", "2026-01-01T00:00:00Z"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn accumulates_path_and_enum_errors_together() {
        let result = Config::from_env(env(&[("MODE", "bogus")]));
        match result {
            Err(ConfigError::Multiple(errors)) => {
                assert!(errors.iter().any(|e| matches!(e, ConfigError::InvalidEnum { .. })));
                assert!(errors.iter().any(|e| matches!(e, ConfigError::MissingFile { .. })));
            }
            other => panic!("expected accumulated errors, got {other:?}"),
        }
    }
}
