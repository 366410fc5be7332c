mod async_wrapper;
mod file;
mod multi;
mod stdout;
mod webhook;

pub use async_wrapper::{AsyncOutput, BackpressurePolicy};
pub use file::FileOutput;
pub use multi::MultiOutput;
pub use stdout::StdoutOutput;
pub use webhook::WebhookOutput;

use async_trait::async_trait;

use crate::compactor::Verbosity;
use crate::error::OutputError;
use crate::types::CanonicalEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One JSON object per line.
    Ndjson,
    /// Two-space indented JSON, one document per write.
    Pretty,
}

#[derive(Debug, Clone, Copy)]
pub struct OutputContext {
    pub verbosity: Verbosity,
    pub format: Format,
}

impl Default for OutputContext {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Standard,
            format: Format::Ndjson,
        }
    }
}

/// An event sink. Writes may be called concurrently; implementations
/// synchronize internally if required. `close` must be idempotent.
#[async_trait]
pub trait Output: Send + Sync {
    async fn write(&self, ctx: &OutputContext, event: CanonicalEvent) -> Result<(), OutputError>;
    async fn close(&self) -> Result<(), OutputError>;
}

/// Applies Minimal-verbosity field masking and serializes per `ctx.format`.
/// The event is consumed by value; callers that need it afterward should
/// clone first.
pub fn encode(ctx: &OutputContext, event: CanonicalEvent) -> Result<String, OutputError> {
    let masked = event.masked_for(ctx.verbosity);
    match ctx.format {
        Format::Ndjson => serde_json::to_string(&masked).map_err(|e| OutputError::Write(e.to_string())),
        Format::Pretty => {
            serde_json::to_string_pretty(&masked).map_err(|e| OutputError::Write(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_event() -> CanonicalEvent {
        CanonicalEvent {
            event_type: "ERROR".to_string(),
            category: "connection_failure".to_string(),
            severity: "error".to_string(),
            timestamp: Utc::now(),
            summary: "boom".to_string(),
            confidence: 0.9,
            raw: "boom".to_string(),
            count: 0,
        }
    }

    #[test]
    fn encode_ndjson_is_single_line() {
        let ctx = OutputContext {
            verbosity: Verbosity::Standard,
            format: Format::Ndjson,
        };
        let encoded = encode(&ctx, sample_event()).unwrap();
        assert_eq!(encoded.lines().count(), 1);
    }

    #[test]
    fn encode_minimal_masks_confidence_and_raw() {
        let ctx = OutputContext {
            verbosity: Verbosity::Minimal,
            format: Format::Ndjson,
        };
        let encoded = encode(&ctx, sample_event()).unwrap();
        assert!(!encoded.contains("confidence"));
        assert!(!encoded.contains("\"raw\""));
    }

    #[test]
    fn encode_pretty_is_multi_line() {
        let ctx = OutputContext {
            verbosity: Verbosity::Standard,
            format: Format::Pretty,
        };
        let encoded = encode(&ctx, sample_event()).unwrap();
        assert!(encoded.lines().count() > 1);
    }
}
