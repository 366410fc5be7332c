// Batches events and POSTs them as a JSON array, retrying 5xx responses
// with exponential backoff. 4xx responses are not retried. A batch flushes
// when it's full, when the caller closes the sink, or when it has sat open
// longer than the flush interval — the last case is driven by a background
// ticker so a quiet source doesn't hold a partial batch indefinitely.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{OutputError, TransportError};
use crate::output::{Output, OutputContext};
use crate::types::CanonicalEvent;

const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);

pub type ErrorCallback = Arc<dyn Fn(&TransportError) + Send + Sync>;

struct Batch {
    events: Vec<CanonicalEvent>,
    opened_at: Instant,
}

struct Inner {
    url: String,
    client: reqwest::Client,
    batch_size: usize,
    flush_interval: Duration,
    batch: Mutex<Option<Batch>>,
    on_error: Option<ErrorCallback>,
}

impl Inner {
    async fn push(&self, event: CanonicalEvent) -> Result<(), OutputError> {
        let mut guard = self.batch.lock().await;

        let should_flush = {
            let batch = guard.get_or_insert_with(|| Batch {
                events: Vec::new(),
                opened_at: Instant::now(),
            });
            batch.events.push(event);
            batch.events.len() >= self.batch_size || batch.opened_at.elapsed() >= self.flush_interval
        };

        if should_flush {
            let batch = guard.take().expect("batch just populated above");
            drop(guard);
            self.send(batch.events).await?;
        }
        Ok(())
    }

    /// Flushes the open batch if it's older than the flush interval. Called
    /// from the background ticker, independent of any caller write.
    async fn flush_if_stale(&self) {
        let stale = {
            let mut guard = self.batch.lock().await;
            match guard.as_ref() {
                Some(batch) if batch.opened_at.elapsed() >= self.flush_interval => guard.take(),
                _ => None,
            }
        };
        if let Some(batch) = stale {
            let _ = self.send(batch.events).await;
        }
    }

    async fn send(&self, events: Vec<CanonicalEvent>) -> Result<(), OutputError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .json(&events)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) if resp.status().is_client_error() => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    let err = TransportError::ClientError { status, body };
                    self.notify(&err);
                    return Err(OutputError::Transport(err));
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    if attempt >= MAX_RETRIES {
                        let err = TransportError::ServerError { status, body };
                        self.notify(&err);
                        return Err(OutputError::Transport(err));
                    }
                }
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        let err = TransportError::Request(e.to_string());
                        self.notify(&err);
                        return Err(OutputError::Transport(err));
                    }
                }
            }

            tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt)).await;
            attempt += 1;
        }
    }

    fn notify(&self, err: &TransportError) {
        if let Some(cb) = &self.on_error {
            cb(err);
        }
    }

    async fn close(&self) -> Result<(), OutputError> {
        let mut guard = self.batch.lock().await;
        if let Some(batch) = guard.take() {
            drop(guard);
            self.send(batch.events).await?;
        }
        Ok(())
    }
}

async fn run_ticker(inner: Arc<Inner>, cancel: CancellationToken) {
    let mut ticks = tokio::time::interval(inner.flush_interval);
    ticks.tick().await; // first tick fires immediately; it has nothing to flush yet
    loop {
        tokio::select! {
            _ = ticks.tick() => inner.flush_if_stale().await,
            _ = cancel.cancelled() => break,
        }
    }
}

pub struct WebhookOutput {
    inner: Arc<Inner>,
    cancel: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl WebhookOutput {
    pub fn new(url: impl Into<String>) -> Self {
        Self::build(url, None)
    }

    pub fn with_error_callback(url: impl Into<String>, callback: ErrorCallback) -> Self {
        Self::build(url, Some(callback))
    }

    fn build(url: impl Into<String>, on_error: Option<ErrorCallback>) -> Self {
        let inner = Arc::new(Inner {
            url: url.into(),
            client: reqwest::Client::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            batch: Mutex::new(None),
            on_error,
        });
        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(inner.clone(), cancel.clone()));

        Self {
            inner,
            cancel,
            ticker: Mutex::new(Some(ticker)),
        }
    }
}

#[async_trait]
impl Output for WebhookOutput {
    async fn write(&self, ctx: &OutputContext, event: CanonicalEvent) -> Result<(), OutputError> {
        let masked = event.masked_for(ctx.verbosity);
        self.inner.push(masked).await
    }

    async fn close(&self) -> Result<(), OutputError> {
        self.cancel.cancel();
        if let Some(handle) = self.ticker.lock().await.take() {
            let _ = handle.await;
        }
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::Verbosity;
    use crate::output::Format;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

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
    async fn flushes_on_explicit_close() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let output = WebhookOutput::new(format!("{}/events", server.uri()));
        let ctx = OutputContext {
            verbosity: Verbosity::Standard,
            format: Format::Ndjson,
        };
        output.write(&ctx, sample_event()).await.unwrap();
        output.close().await.unwrap();
    }

    #[tokio::test]
    async fn does_not_retry_on_4xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let output = WebhookOutput::new(format!("{}/events", server.uri()));
        let ctx = OutputContext::default();
        output.write(&ctx, sample_event()).await.unwrap();
        let result = output.close().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn retries_on_5xx_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let output = WebhookOutput::new(format!("{}/events", server.uri()));
        let ctx = OutputContext::default();
        output.write(&ctx, sample_event()).await.unwrap();
        let result = output.close().await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn background_ticker_flushes_a_stale_batch_without_a_new_write() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let output = WebhookOutput::new(format!("{}/events", server.uri()));
        let ctx = OutputContext::default();
        output.write(&ctx, sample_event()).await.unwrap();

        // No second write arrives; only the passage of time past the flush
        // interval should trigger the send.
        tokio::time::advance(DEFAULT_FLUSH_INTERVAL + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        server.verify().await;
    }
}
