// Core record types flowing through the pipeline: RawLog in, CanonicalEvent
// out. CanonicalEvent is a closed record (no untyped map escapes into the
// wire format) — RawLog's metadata is received but never surfaced.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity bucket assigned to a classified event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "info" => Some(Severity::Info),
            "debug" => Some(Severity::Debug),
            _ => None,
        }
    }
}

/// Input to the engine. `raw` is an arbitrary byte sequence intended as
/// text — it may be empty, whitespace-only, non-UTF-8, or binary.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub raw: Vec<u8>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RawLog {
    pub fn new(timestamp: DateTime<Utc>, source: impl Into<String>, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp,
            source: source.into(),
            raw: raw.into(),
            metadata: HashMap::new(),
        }
    }

    /// Lossy UTF-8 view of `raw`, used by everything downstream of ingestion.
    /// Non-UTF-8 bytes are replaced with U+FFFD, which the tokenizer's
    /// cleaning step then drops.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    /// Empty or all-whitespace text short-circuits the engine before the
    /// embedder is ever invoked.
    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty()
    }
}

/// Output of the engine. Omit-when-empty fields match the wire contract in
/// the spec: `confidence`, `raw`, and `count` drop out of the JSON entirely
/// when they carry their zero value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub category: String,
    pub severity: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    #[serde(skip_serializing_if = "is_zero_confidence")]
    pub confidence: f32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw: String,
    #[serde(skip_serializing_if = "is_uncounted")]
    pub count: u32,
}

fn is_zero_confidence(c: &f32) -> bool {
    *c == 0.0
}

fn is_uncounted(count: &u32) -> bool {
    *count <= 1
}

pub const UNCLASSIFIED: &str = "UNCLASSIFIED";
pub const EMPTY_INPUT_CATEGORY: &str = "empty_input";

impl CanonicalEvent {
    /// The special-case event for empty/whitespace-only input. Never
    /// touches the embedder.
    pub fn empty_input(timestamp: DateTime<Utc>) -> Self {
        Self {
            event_type: UNCLASSIFIED.to_string(),
            category: EMPTY_INPUT_CATEGORY.to_string(),
            severity: Severity::Warning.as_str().to_string(),
            timestamp,
            summary: String::new(),
            confidence: 0.0,
            raw: String::new(),
            count: 0,
        }
    }

    /// Field masking at Minimal verbosity: zero `confidence` and `raw`.
    /// Returns a new value — the caller's event is never mutated.
    pub fn masked_for(&self, verbosity: crate::compactor::Verbosity) -> Self {
        let mut masked = self.clone();
        if verbosity == crate::compactor::Verbosity::Minimal {
            masked.confidence = 0.0;
            masked.raw = String::new();
        }
        masked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_log_is_blank_for_empty_and_whitespace() {
        let log = RawLog::new(Utc::now(), "test", Vec::new());
        assert!(log.is_blank());
        let log = RawLog::new(Utc::now(), "test", b"   \t\n  ".to_vec());
        assert!(log.is_blank());
        let log = RawLog::new(Utc::now(), "test", b"hello".to_vec());
        assert!(!log.is_blank());
    }

    #[test]
    fn confidence_raw_and_count_omitted_when_zero() {
        let event = CanonicalEvent::empty_input(Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("confidence"));
        assert!(!obj.contains_key("raw"));
        assert!(!obj.contains_key("count"));
    }

    #[test]
    fn count_emitted_only_when_greater_than_one() {
        let mut event = CanonicalEvent::empty_input(Utc::now());
        event.count = 1;
        let json = serde_json::to_value(&event).unwrap();
        assert!(!json.as_object().unwrap().contains_key("count"));

        event.count = 2;
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["count"], 2);
    }
}
