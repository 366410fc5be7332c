// Time-windowed streaming deduplication keyed by "{type}.{category}",
// preserving first-occurrence order. Realized as a Vec of (key, accumulator)
// pairs rather than an IndexMap: nothing else in this crate needs that
// dependency.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::types::CanonicalEvent;

struct Accumulator {
    key: String,
    first_event: CanonicalEvent,
    count: u32,
    first_ts: DateTime<Utc>,
    latest_ts: DateTime<Utc>,
}

pub struct Deduplicator {
    window: ChronoDuration,
}

impl Deduplicator {
    pub fn new(window: ChronoDuration) -> Self {
        Self { window }
    }

    pub fn deduplicate_batch(&self, events: Vec<CanonicalEvent>) -> Vec<CanonicalEvent> {
        let mut accumulators: Vec<Accumulator> = Vec::new();

        for event in events {
            let key = format!("{}.{}", event.event_type, event.category);
            let latest_same_key = accumulators.iter_mut().rev().find(|acc| acc.key == key);
            let open = latest_same_key
                .filter(|acc| event.timestamp - acc.first_ts <= self.window);

            match open {
                Some(acc) => {
                    acc.count += 1;
                    if event.timestamp > acc.latest_ts {
                        acc.latest_ts = event.timestamp;
                    }
                }
                None => accumulators.push(Accumulator {
                    key,
                    first_ts: event.timestamp,
                    latest_ts: event.timestamp,
                    count: 1,
                    first_event: event,
                }),
            }
        }

        accumulators
            .into_iter()
            .map(|acc| {
                let mut event = acc.first_event;
                if acc.count > 1 {
                    let duration = acc.latest_ts - acc.first_ts;
                    event.count = acc.count;
                    event.summary = format!(
                        "{} (x{} in {})",
                        event.summary,
                        acc.count,
                        format_duration(duration)
                    );
                }
                event
            })
            .collect()
    }
}

fn format_duration(duration: ChronoDuration) -> String {
    let millis = duration.num_milliseconds().max(0);
    if millis < 1000 {
        return format!("{millis}ms");
    }
    let total_seconds = millis / 1000;
    if total_seconds < 60 {
        return format!("{total_seconds}s");
    }
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    if seconds == 0 {
        format!("{minutes}m")
    } else {
        format!("{minutes}m{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: &str, category: &str, ts: DateTime<Utc>, summary: &str) -> CanonicalEvent {
        CanonicalEvent {
            event_type: event_type.to_string(),
            category: category.to_string(),
            severity: "error".to_string(),
            timestamp: ts,
            summary: summary.to_string(),
            confidence: 0.9,
            raw: String::new(),
            count: 0,
        }
    }

    #[test]
    fn groups_within_window_and_counts() {
        let dedup = Deduplicator::new(ChronoDuration::seconds(60));
        let base = Utc::now();
        let events = vec![
            event("ERROR", "connection_failure", base, "boom"),
            event("ERROR", "connection_failure", base + ChronoDuration::seconds(5), "boom"),
            event("ERROR", "connection_failure", base + ChronoDuration::seconds(10), "boom"),
        ];
        let result = dedup.deduplicate_batch(events);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].count, 3);
        assert_eq!(result[0].timestamp, base);
        assert!(result[0].summary.contains("x3"));
    }

    #[test]
    fn outside_window_starts_new_group() {
        let dedup = Deduplicator::new(ChronoDuration::seconds(10));
        let base = Utc::now();
        let events = vec![
            event("ERROR", "x", base, "boom"),
            event("ERROR", "x", base + ChronoDuration::seconds(20), "boom"),
        ];
        let result = dedup.deduplicate_batch(events);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].count, 0);
        assert_eq!(result[1].count, 0);
    }

    #[test]
    fn preserves_first_occurrence_order_of_distinct_keys() {
        let dedup = Deduplicator::new(ChronoDuration::seconds(60));
        let base = Utc::now();
        let events = vec![
            event("A", "x", base, "a"),
            event("B", "y", base, "b"),
            event("A", "x", base, "a"),
        ];
        let result = dedup.deduplicate_batch(events);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].event_type, "A");
        assert_eq!(result[1].event_type, "B");
    }

    #[test]
    fn single_event_group_has_no_count_suffix() {
        let dedup = Deduplicator::new(ChronoDuration::seconds(60));
        let base = Utc::now();
        let events = vec![event("A", "x", base, "only")];
        let result = dedup.deduplicate_batch(events);
        assert_eq!(result[0].summary, "only");
        assert_eq!(result[0].count, 0);
    }

    #[test]
    fn format_duration_buckets() {
        assert_eq!(format_duration(ChronoDuration::milliseconds(500)), "500ms");
        assert_eq!(format_duration(ChronoDuration::seconds(30)), "30s");
        assert_eq!(format_duration(ChronoDuration::seconds(90)), "1m30s");
        assert_eq!(format_duration(ChronoDuration::seconds(120)), "2m");
    }
}
