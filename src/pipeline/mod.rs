// Orchestrates a connector, a processor, and an output. Stream mode drives
// a mutex-guarded accumulation buffer through a small state machine; query
// mode is a one-shot batch-then-fallback pull.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::connector::QueryParams;
use crate::dedup::Deduplicator;
use crate::engine::Engine;
use crate::error::{CancellationError, InferenceError};
use crate::output::{Output, OutputContext};
use crate::types::{CanonicalEvent, RawLog};

/// The pipeline drives either a real `Engine` or a test double through this
/// seam, matching the spec's "the engine or a mock" processor contract.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, raw: &RawLog) -> Result<CanonicalEvent, InferenceError>;
    async fn process_batch(&self, raws: &[RawLog]) -> Result<Vec<CanonicalEvent>, InferenceError>;
}

#[async_trait]
impl Processor for Engine {
    async fn process(&self, raw: &RawLog) -> Result<CanonicalEvent, InferenceError> {
        Engine::process(self, raw).await
    }

    async fn process_batch(&self, raws: &[RawLog]) -> Result<Vec<CanonicalEvent>, InferenceError> {
        Engine::process_batch(self, raws).await
    }
}

pub struct PipelineConfig {
    /// Zero disables deduplication.
    pub dedup_window: chrono::Duration,
    /// Zero means unlimited.
    pub max_buffer_size: usize,
    pub output_ctx: OutputContext,
}

struct StreamBufferState {
    events: Vec<CanonicalEvent>,
}

pub struct Pipeline {
    processor: Arc<dyn Processor>,
    output: Arc<dyn Output>,
    config: PipelineConfig,
    skip_count: AtomicU64,
}

impl Pipeline {
    pub fn new(processor: Arc<dyn Processor>, output: Arc<dyn Output>, config: PipelineConfig) -> Self {
        Self {
            processor,
            output,
            config,
            skip_count: AtomicU64::new(0),
        }
    }

    pub fn skip_count(&self) -> u64 {
        self.skip_count.load(Ordering::Relaxed)
    }

    fn dedup_enabled(&self) -> bool {
        self.config.dedup_window > chrono::Duration::zero()
    }

    /// Drives the connector's stream to completion, or until `cancel`
    /// fires. Returns `Ok(())` on clean channel closure, `Err` on
    /// cancellation (after a best-effort detached flush).
    pub async fn run_stream(
        &self,
        mut logs: mpsc::Receiver<RawLog>,
        cancel: CancellationToken,
    ) -> Result<(), CancellationError> {
        let buffer = Mutex::new(StreamBufferState { events: Vec::new() });
        let mut timer_deadline: Option<Instant> = None;

        loop {
            let sleep = async {
                match timer_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    // A fresh, detached token: the caller's shutdown budget
                    // governs this flush, not the token that just tripped.
                    let detached = CancellationToken::new();
                    self.flush_buffer(&buffer, &detached).await;
                    return Err(CancellationError);
                }
                maybe_log = logs.recv() => {
                    match maybe_log {
                        Some(raw) => {
                            if !self.dedup_enabled() {
                                self.process_and_write_one(raw).await;
                                continue;
                            }
                            self.accumulate(&buffer, raw, &mut timer_deadline).await;
                            if self.should_force_flush(&buffer).await {
                                self.flush_buffer(&buffer, &CancellationToken::new()).await;
                                timer_deadline = None;
                            }
                        }
                        None => {
                            self.flush_buffer(&buffer, &CancellationToken::new()).await;
                            return Ok(());
                        }
                    }
                }
                _ = sleep, if timer_deadline.is_some() => {
                    self.flush_buffer(&buffer, &CancellationToken::new()).await;
                    timer_deadline = None;
                }
            }
        }
    }

    async fn accumulate(
        &self,
        buffer: &Mutex<StreamBufferState>,
        raw: RawLog,
        timer_deadline: &mut Option<Instant>,
    ) {
        let processed = self.processor.process(&raw).await;
        let mut state = buffer.lock().await;
        let was_empty = state.events.is_empty();
        match processed {
            Ok(event) => state.events.push(event),
            Err(e) => self.record_skip(&e),
        }
        if was_empty && !state.events.is_empty() && timer_deadline.is_none() {
            let window = self
                .config
                .dedup_window
                .to_std()
                .unwrap_or(StdDuration::ZERO);
            *timer_deadline = Some(Instant::now() + window);
        }
    }

    async fn should_force_flush(&self, buffer: &Mutex<StreamBufferState>) -> bool {
        let max = self.config.max_buffer_size;
        if max == 0 {
            return false;
        }
        buffer.lock().await.events.len() >= max
    }

    async fn flush_buffer(&self, buffer: &Mutex<StreamBufferState>, _detached: &CancellationToken) {
        let events = {
            let mut state = buffer.lock().await;
            std::mem::take(&mut state.events)
        };
        if events.is_empty() {
            return;
        }
        let deduped = Deduplicator::new(self.config.dedup_window).deduplicate_batch(events);
        self.write_all(deduped).await;
    }

    async fn process_and_write_one(&self, raw: RawLog) {
        match self.processor.process(&raw).await {
            Ok(event) => {
                if let Err(e) = self.output.write(&self.config.output_ctx, event).await {
                    tracing::warn!(error = %e, "output write failed");
                }
            }
            Err(e) => self.record_skip(&e),
        }
    }

    /// Fetches a bounded slice via the connector's query operation,
    /// attempts a batch pass, and falls back to per-log processing on
    /// batch failure so partial results still reach the output.
    pub async fn run_query(
        &self,
        connector: &dyn crate::connector::Connector,
        params: QueryParams,
    ) -> Result<(), InferenceError> {
        let logs = connector
            .query(params)
            .await
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let events = match self.processor.process_batch(&logs).await {
            Ok(events) => events,
            Err(_) => {
                let mut events = Vec::with_capacity(logs.len());
                for log in &logs {
                    match self.processor.process(log).await {
                        Ok(event) => events.push(event),
                        Err(e) => self.record_skip(&e),
                    }
                }
                events
            }
        };

        let events = if self.dedup_enabled() {
            Deduplicator::new(self.config.dedup_window).deduplicate_batch(events)
        } else {
            events
        };

        self.write_all(events).await;
        Ok(())
    }

    async fn write_all(&self, events: Vec<CanonicalEvent>) {
        for event in events {
            if let Err(e) = self.output.write(&self.config.output_ctx, event).await {
                tracing::warn!(error = %e, "output write failed");
            }
        }
    }

    fn record_skip(&self, err: &InferenceError) {
        self.skip_count.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(error = %err, skips = self.skip_count.load(Ordering::Relaxed), "skipping log due to processing error");
    }
}
