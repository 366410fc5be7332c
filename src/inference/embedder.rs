// Composes tokenizer + inference session + pooler + projection into a
// batch-aware embedding API. CPU-bound work runs on a blocking thread so
// callers on the async pipeline never stall the runtime.

use std::sync::Arc;

use crate::error::{ConfigError, InferenceError};
use crate::inference::pooler::mean_pool;
use crate::inference::projection::Projection;
use crate::inference::session::InferenceSession;
use crate::tokenizer::Tokenizer;
use crate::vocabulary::Vocabulary;

pub struct Embedder {
    vocabulary: Arc<Vocabulary>,
    session: Arc<InferenceSession>,
    projection: Arc<Projection>,
}

impl Embedder {
    pub fn new(
        vocabulary: Arc<Vocabulary>,
        session: Arc<InferenceSession>,
        projection: Arc<Projection>,
    ) -> Result<Self, ConfigError> {
        if session.hidden_dim() != projection.in_dim() {
            return Err(ConfigError::DimensionMismatch {
                embedder_dim: session.hidden_dim(),
                projection_dim: projection.in_dim(),
            });
        }
        Ok(Self {
            vocabulary,
            session,
            projection,
        })
    }

    /// Output vector length after projection.
    pub fn output_dim(&self) -> usize {
        self.projection.out_dim()
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        Ok(vectors.pop().expect("embed_batch returns one row per input"))
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, InferenceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vocabulary = Arc::clone(&self.vocabulary);
        let session = Arc::clone(&self.session);
        let projection = Arc::clone(&self.projection);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || embed_sync(&vocabulary, &session, &projection, &texts))
            .await
            .map_err(|e| InferenceError::Runtime(e.to_string()))?
    }
}

fn embed_sync(
    vocabulary: &Vocabulary,
    session: &InferenceSession,
    projection: &Projection,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, InferenceError> {
    let tokenizer = Tokenizer::new(vocabulary);
    let batch = tokenizer.encode_batch(texts);

    let hidden = session.infer(
        &batch.input_ids,
        &batch.attention_mask,
        &batch.token_type_ids,
        batch.batch_size,
        batch.seq_len,
    )?;

    let pooled = mean_pool(
        &hidden,
        &batch.attention_mask,
        batch.batch_size,
        batch.seq_len,
        session.hidden_dim(),
    );

    let dim = session.hidden_dim();
    Ok(pooled.chunks(dim).map(|row| projection.apply(row)).collect())
}
