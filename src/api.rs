// Public API surface: a synchronous-feeling handle over the otherwise
// multi-stage construction (vocabulary -> session -> projection -> embedder
// -> taxonomy -> engine). Construction is async because embedding the
// taxonomy's 42 leaves requires one inference pass.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::classifier::Classifier;
use crate::compactor::Compactor;
use crate::config::Config;
use crate::engine::Engine;
use crate::inference::{Embedder, InferenceSession, Projection};
use crate::taxonomy::{RootDef, Taxonomy};
use crate::types::{CanonicalEvent, RawLog};
use crate::vocabulary::Vocabulary;

pub struct LogTriage {
    engine: Engine,
}

impl LogTriage {
    pub async fn build(config: &Config) -> Result<Self> {
        let vocabulary = Arc::new(
            Vocabulary::load(&config.vocab_path).with_context(|| "loading vocabulary")?,
        );
        let session = Arc::new(
            InferenceSession::load(&config.model_path).with_context(|| "loading ONNX model")?,
        );
        let projection = Arc::new(
            Projection::load(&config.projection_path).with_context(|| "loading projection weights")?,
        );
        let embedder = Embedder::new(vocabulary, session, projection)
            .with_context(|| "constructing embedder")?;

        let taxonomy = Taxonomy::build(&embedder)
            .await
            .with_context(|| "embedding taxonomy labels")?;

        let classifier = Classifier::new(config.confidence_threshold);
        let compactor = Compactor::new();

        let engine = Engine::new(embedder, taxonomy, classifier, compactor, config.verbosity);
        Ok(Self { engine })
    }

    pub async fn classify(&self, raw: &RawLog) -> Result<CanonicalEvent> {
        self.engine.process(raw).await.with_context(|| "classifying log")
    }

    pub async fn classify_batch(&self, raws: &[RawLog]) -> Result<Vec<CanonicalEvent>> {
        self.engine
            .process_batch(raws)
            .await
            .with_context(|| "classifying log batch")
    }

    pub fn taxonomy_roots(&self) -> &'static [RootDef] {
        self.engine.taxonomy_roots()
    }
}
