use async_trait::async_trait;

use crate::error::OutputError;
use crate::output::{Output, OutputContext};
use crate::types::CanonicalEvent;

/// Fans a write out to every composed output in order. Returns the first
/// error encountered, if any; `close` closes all and aggregates errors.
pub struct MultiOutput {
    outputs: Vec<Box<dyn Output>>,
}

impl MultiOutput {
    pub fn new(outputs: Vec<Box<dyn Output>>) -> Self {
        Self { outputs }
    }
}

#[async_trait]
impl Output for MultiOutput {
    async fn write(&self, ctx: &OutputContext, event: CanonicalEvent) -> Result<(), OutputError> {
        for output in &self.outputs {
            output.write(ctx, event.clone()).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), OutputError> {
        let mut errors = Vec::new();
        for output in &self.outputs {
            if let Err(e) = output.close().await {
                errors.push(e.to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(OutputError::Close(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::Verbosity;
    use crate::output::Format;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingOutput {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Output for CountingOutput {
        async fn write(&self, _ctx: &OutputContext, _event: CanonicalEvent) -> Result<(), OutputError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), OutputError> {
            Ok(())
        }
    }

    fn sample_event() -> CanonicalEvent {
        CanonicalEvent {
            event_type: "ERROR".to_string(),
            category: "x".to_string(),
            severity: "error".to_string(),
            timestamp: Utc::now(),
            summary: "boom".to_string(),
            confidence: 0.9,
            raw: String::new(),
            count: 0,
        }
    }

    #[tokio::test]
    async fn writes_to_every_composed_output() {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let multi = MultiOutput::new(vec![
            Box::new(CountingOutput { count: a.clone() }),
            Box::new(CountingOutput { count: b.clone() }),
        ]);

        let ctx = OutputContext {
            verbosity: Verbosity::Standard,
            format: Format::Ndjson,
        };
        multi.write(&ctx, sample_event()).await.unwrap();
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }
}
