// Adapts any Output to a bounded mpsc channel with a single drain task, so
// producers never block on a slow sink unless the `Block` policy is chosen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::OutputError;
use crate::output::{Output, OutputContext};
use crate::types::CanonicalEvent;

const DEFAULT_BUFFER: usize = 1024;
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    Block,
    Drop,
}

pub type OutputErrorCallback = Arc<dyn Fn(&OutputError) + Send + Sync>;

struct Queued {
    ctx: OutputContext,
    event: CanonicalEvent,
}

pub struct AsyncOutput {
    sender: Mutex<Option<mpsc::Sender<Queued>>>,
    drain: Mutex<Option<JoinHandle<()>>>,
    policy: BackpressurePolicy,
}

impl AsyncOutput {
    pub fn wrap(inner: Arc<dyn Output>, policy: BackpressurePolicy, on_error: Option<OutputErrorCallback>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Queued>(DEFAULT_BUFFER);

        let drain = tokio::spawn(async move {
            while let Some(Queued { ctx, event }) = receiver.recv().await {
                if let Err(err) = inner.write(&ctx, event).await {
                    if let Some(cb) = &on_error {
                        cb(&err);
                    }
                }
            }
            if let Err(err) = inner.close().await {
                if let Some(cb) = &on_error {
                    cb(&err);
                }
            }
        });

        Self {
            sender: Mutex::new(Some(sender)),
            drain: Mutex::new(Some(drain)),
            policy,
        }
    }
}

#[async_trait]
impl Output for AsyncOutput {
    async fn write(&self, ctx: &OutputContext, event: CanonicalEvent) -> Result<(), OutputError> {
        let item = Queued { ctx: *ctx, event };
        let guard = self.sender.lock().await;
        let Some(sender) = guard.as_ref() else {
            return Err(OutputError::Write("async output channel closed".to_string()));
        };

        match self.policy {
            BackpressurePolicy::Block => sender
                .send(item)
                .await
                .map_err(|_| OutputError::Write("async output channel closed".to_string())),
            BackpressurePolicy::Drop => match sender.try_send(item) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("async output buffer full, dropping event");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    Err(OutputError::Write("async output channel closed".to_string()))
                }
            },
        }
    }

    async fn close(&self) -> Result<(), OutputError> {
        // Dropping the sender closes the channel; the drain task then
        // finishes its queue and closes the inner output.
        self.sender.lock().await.take();
        let handle = self.drain.lock().await.take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(DEFAULT_DRAIN_TIMEOUT, handle).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::Verbosity;
    use crate::output::Format;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

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
    async fn block_policy_delivers_every_event() {
        let count = Arc::new(AtomicUsize::new(0));
        let inner: Arc<dyn Output> = Arc::new(CountingOutput { count: count.clone() });
        let wrapped = AsyncOutput::wrap(inner, BackpressurePolicy::Block, None);

        let ctx = OutputContext {
            verbosity: Verbosity::Standard,
            format: Format::Ndjson,
        };
        for _ in 0..10 {
            wrapped.write(&ctx, sample_event()).await.unwrap();
        }
        wrapped.close().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }
}
