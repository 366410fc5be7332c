// Type-aware compaction: JSON field stripping, stack-trace or rune-safe
// truncation, and a word-boundary summary, in that order.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Standard,
    Full,
}

const DEFAULT_STRIP_KEYS: [&str; 7] = [
    "trace_id",
    "span_id",
    "request_id",
    "x_request_id",
    "correlation_id",
    "dd.trace_id",
    "dd.span_id",
];

const SUMMARY_CAP_RUNES: usize = 120;

pub struct Compactor {
    strip_keys: Vec<String>,
}

impl Compactor {
    pub fn new() -> Self {
        Self {
            strip_keys: DEFAULT_STRIP_KEYS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_strip_keys(strip_keys: Vec<String>) -> Self {
        Self { strip_keys }
    }

    /// Pure function of `(raw_text, event_type, verbosity)`.
    pub fn compact(&self, raw_text: &str, event_type: &str, verbosity: Verbosity) -> (String, String) {
        let stripped = self.strip_fields(raw_text, verbosity);
        let truncated = self.truncate(&stripped, event_type, verbosity);
        let summary = summarize(&truncated);
        (truncated, summary)
    }

    fn strip_fields(&self, text: &str, verbosity: Verbosity) -> String {
        if !matches!(verbosity, Verbosity::Minimal | Verbosity::Standard) {
            return text.to_string();
        }
        if !text.trim_start().starts_with('{') {
            return text.to_string();
        }
        let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(text) else {
            return text.to_string();
        };

        let mut changed = false;
        for key in &self.strip_keys {
            if map.remove(key).is_some() {
                changed = true;
            }
        }
        if !changed {
            return text.to_string();
        }
        serde_json::to_string(&Value::Object(map)).unwrap_or_else(|_| text.to_string())
    }

    fn truncate(&self, text: &str, event_type: &str, verbosity: Verbosity) -> String {
        if verbosity == Verbosity::Full {
            return text.to_string();
        }

        let max_first = match verbosity {
            Verbosity::Minimal => 5,
            Verbosity::Standard => 10,
            Verbosity::Full => unreachable!(),
        };

        if event_type == "ERROR" {
            if let Some(result) = truncate_stack_trace(text, max_first) {
                return result;
            }
        }

        let cap = match verbosity {
            Verbosity::Minimal => 200,
            Verbosity::Standard => 2000,
            Verbosity::Full => unreachable!(),
        };
        truncate_runes(text, cap)
    }
}

impl Default for Compactor {
    fn default() -> Self {
        Self::new()
    }
}

fn frame_regexes() -> &'static [Regex; 3] {
    static REGEXES: OnceLock<[Regex; 3]> = OnceLock::new();
    REGEXES.get_or_init(|| {
        [
            Regex::new(r"^\s+at .+").unwrap(),
            Regex::new(r"^\s*.*\.go:\d+").unwrap(),
            Regex::new(r"^goroutine \d+").unwrap(),
        ]
    })
}

fn is_frame_line(line: &str) -> bool {
    frame_regexes().iter().any(|re| re.is_match(line))
}

/// Returns `None` if truncation did not change the text (too few frames).
fn truncate_stack_trace(text: &str, max_first: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let frame_indices: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| is_frame_line(l))
        .map(|(i, _)| i)
        .collect();

    if frame_indices.len() <= max_first + 2 {
        return None;
    }

    let first_cutoff = frame_indices[max_first - 1];
    let second_from_last = frame_indices[frame_indices.len() - 2];
    let omitted = frame_indices.len() - max_first - 2;

    let mut out: Vec<&str> = lines[..=first_cutoff].to_vec();
    let omission_line = format!("\t... ({omitted} frames omitted) ...");
    let mut result = out.join("\n");
    result.push('\n');
    result.push_str(&omission_line);
    result.push('\n');
    out = lines[second_from_last..].to_vec();
    result.push_str(&out.join("\n"));
    Some(result)
}

fn truncate_runes(text: &str, cap: usize) -> String {
    let rune_count = text.chars().count();
    if rune_count <= cap {
        return text.to_string();
    }
    let prefix: String = text.chars().take(cap).collect();
    format!("{prefix}...")
}

fn summarize(text: &str) -> String {
    let first_line = text.split('\n').next().unwrap_or("").trim();
    let rune_count = first_line.chars().count();
    if rune_count <= SUMMARY_CAP_RUNES {
        return first_line.to_string();
    }

    let prefix: Vec<char> = first_line.chars().take(SUMMARY_CAP_RUNES).collect();
    let prefix_str: String = prefix.iter().collect();
    match prefix_str.rfind(' ') {
        Some(idx) if idx > 0 => format!("{}...", &prefix_str[..idx]),
        _ => format!("{prefix_str}..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_configured_json_fields() {
        let compactor = Compactor::new();
        let input = r#"{"trace_id":"abc","message":"boom"}"#;
        let (out, _) = compactor.compact(input, "ERROR", Verbosity::Standard);
        assert!(!out.contains("trace_id"));
        assert!(out.contains("boom"));
    }

    #[test]
    fn leaves_unmatched_json_untouched() {
        let compactor = Compactor::new();
        let input = r#"{"message":"boom"}"#;
        let (out, _) = compactor.compact(input, "ERROR", Verbosity::Standard);
        assert_eq!(out, input);
    }

    #[test]
    fn malformed_json_is_left_unchanged() {
        let compactor = Compactor::new();
        let input = "{not json";
        let (out, _) = compactor.compact(input, "ERROR", Verbosity::Standard);
        assert_eq!(out, input);
    }

    #[test]
    fn full_verbosity_skips_strip_and_truncate() {
        let compactor = Compactor::new();
        let input = r#"{"trace_id":"abc","message":"boom"}"#;
        let (out, _) = compactor.compact(input, "ERROR", Verbosity::Full);
        assert_eq!(out, input);
    }

    #[test]
    fn character_truncation_caps_at_200_for_minimal() {
        let compactor = Compactor::new();
        let input = "x".repeat(500);
        let (out, _) = compactor.compact(&input, "REQUEST", Verbosity::Minimal);
        assert_eq!(out.chars().count(), 203); // 200 + "..."
        assert!(out.ends_with("..."));
    }

    #[test]
    fn stack_trace_truncation_fires_over_30_frames() {
        let compactor = Compactor::new();
        let mut lines = vec!["panic: boom".to_string()];
        for i in 0..30 {
            lines.push(format!("\tat com.example.Service.call{i}(Service.java:{i})"));
        }
        let input = lines.join("\n");
        let (out, _) = compactor.compact(&input, "ERROR", Verbosity::Minimal);
        assert!(out.contains("frames omitted"));
        assert!(out.lines().count() < lines.len());
    }

    #[test]
    fn stack_trace_untouched_when_frame_count_within_budget() {
        let compactor = Compactor::new();
        let mut lines = vec!["panic: boom".to_string()];
        for i in 0..3 {
            lines.push(format!("\tat com.example.Service.call{i}(Service.java:{i})"));
        }
        let input = lines.join("\n");
        let (out, _) = compactor.compact(&input, "ERROR", Verbosity::Minimal);
        assert_eq!(out, input);
    }

    #[test]
    fn summary_truncates_at_word_boundary() {
        let words: Vec<String> = (0..30).map(|i| format!("word{i}")).collect();
        let text = words.join(" ");
        let summary = summarize(&text);
        assert!(summary.ends_with("..."));
        assert!(summary.chars().count() <= SUMMARY_CAP_RUNES + 3);
        assert!(!summary.trim_end_matches("...").ends_with(' '));
    }

    #[test]
    fn summary_short_text_passes_through() {
        let summary = summarize("short message");
        assert_eq!(summary, "short message");
    }

    #[test]
    fn summary_uses_first_line_only() {
        let summary = summarize("first line\nsecond line");
        assert_eq!(summary, "first line");
    }
}
