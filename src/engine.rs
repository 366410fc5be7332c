// Orchestrates embed -> classify -> compact -> assemble for single events
// and batches.

use crate::classifier::Classifier;
use crate::compactor::{Compactor, Verbosity};
use crate::error::InferenceError;
use crate::inference::Embedder;
use crate::taxonomy::Taxonomy;
use crate::types::{CanonicalEvent, RawLog, Severity};

pub struct Engine {
    embedder: Embedder,
    taxonomy: Taxonomy,
    classifier: Classifier,
    compactor: Compactor,
    verbosity: Verbosity,
}

impl Engine {
    pub fn new(
        embedder: Embedder,
        taxonomy: Taxonomy,
        classifier: Classifier,
        compactor: Compactor,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            embedder,
            taxonomy,
            classifier,
            compactor,
            verbosity,
        }
    }

    pub fn taxonomy_roots(&self) -> &'static [crate::taxonomy::RootDef] {
        self.taxonomy.roots()
    }

    pub async fn process(&self, raw: &RawLog) -> Result<CanonicalEvent, InferenceError> {
        if raw.is_blank() {
            return Ok(CanonicalEvent::empty_input(raw.timestamp));
        }

        let text = raw.text().into_owned();
        let vector = self.embedder.embed(&text).await?;
        let classification = self.classifier.classify(&vector, self.taxonomy.labels());
        Ok(self.assemble(raw, &text, classification))
    }

    pub async fn process_batch(&self, raws: &[RawLog]) -> Result<Vec<CanonicalEvent>, InferenceError> {
        if raws.is_empty() {
            return Ok(Vec::new());
        }

        let non_empty_indices: Vec<usize> = raws
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_blank())
            .map(|(i, _)| i)
            .collect();

        let texts: Vec<String> = non_empty_indices.iter().map(|&i| raws[i].text().into_owned()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        let mut events: Vec<Option<CanonicalEvent>> = vec![None; raws.len()];
        for ((&idx, text), vector) in non_empty_indices.iter().zip(texts.iter()).zip(vectors.into_iter()) {
            let classification = self.classifier.classify(&vector, self.taxonomy.labels());
            events[idx] = Some(self.assemble(&raws[idx], text, classification));
        }

        for (i, slot) in events.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(CanonicalEvent::empty_input(raws[i].timestamp));
            }
        }

        Ok(events.into_iter().map(|e| e.expect("every slot filled above")).collect())
    }

    fn assemble(
        &self,
        raw: &RawLog,
        text: &str,
        classification: crate::classifier::Classification,
    ) -> CanonicalEvent {
        let (event_type, category) = split_label(&classification.label);
        let (compacted, summary) = self.compactor.compact(text, event_type, self.verbosity);

        let severity = if classification.severity.is_empty() {
            String::new()
        } else {
            Severity::parse(&classification.severity)
                .map(|s| s.as_str().to_string())
                .unwrap_or(classification.severity)
        };

        CanonicalEvent {
            event_type: event_type.to_string(),
            category: category.to_string(),
            severity,
            timestamp: raw.timestamp,
            summary,
            confidence: classification.confidence,
            raw: compacted,
            count: 0,
        }
    }
}

/// Splits a dotted label path at the first `.` into (type, category). An
/// UNCLASSIFIED label with no leaf match has no `.` and yields an empty
/// category.
fn split_label(label: &str) -> (&str, &str) {
    match label.split_once('.') {
        Some((ty, category)) => (ty, category),
        None => (label, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_label_separates_type_and_category() {
        assert_eq!(split_label("ERROR.connection_failure"), ("ERROR", "connection_failure"));
    }

    #[test]
    fn split_label_unclassified_has_empty_category() {
        assert_eq!(split_label("UNCLASSIFIED"), ("UNCLASSIFIED", ""));
    }
}
