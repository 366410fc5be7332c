// Capability-set trait the pipeline consumes to acquire RawLogs, plus the
// process-wide registry of known connector constructors. Real provider
// pollers (Vercel, Fly.io, Supabase) are out of scope; `MemoryConnector`
// is the one concrete implementation, used by tests and the CLI's `demo`
// subcommand.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::ConfigError;
use crate::types::RawLog;

#[derive(Debug, Clone)]
pub struct QueryParams {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: usize,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn stream(&self) -> Result<mpsc::Receiver<RawLog>, ConfigError>;
    async fn query(&self, params: QueryParams) -> Result<Vec<RawLog>, ConfigError>;
}

type ConnectorFactory = fn() -> Box<dyn Connector>;

static REGISTRY: OnceLock<Mutex<HashMap<String, ConnectorFactory>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, ConnectorFactory>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub struct ConnectorRegistry;

impl ConnectorRegistry {
    pub fn register(name: &str, factory: ConnectorFactory) {
        registry().lock().expect("connector registry mutex poisoned").insert(name.to_string(), factory);
    }

    pub fn build(name: &str) -> Result<Box<dyn Connector>, ConfigError> {
        registry()
            .lock()
            .expect("connector registry mutex poisoned")
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::UnknownConnector(name.to_string()))
    }

    pub fn install_defaults() {
        Self::register("memory", || Box::new(MemoryConnector::new(Vec::new())));
    }
}

/// In-process connector backed by a fixed `Vec<RawLog>`. `stream` sends
/// every log then closes the channel; `query` filters by timestamp range
/// and applies `limit`.
pub struct MemoryConnector {
    logs: Vec<RawLog>,
}

impl MemoryConnector {
    pub fn new(logs: Vec<RawLog>) -> Self {
        Self { logs }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn stream(&self) -> Result<mpsc::Receiver<RawLog>, ConfigError> {
        let (tx, rx) = mpsc::channel(self.logs.len().max(1));
        for log in self.logs.clone() {
            // Bounded to the log count, so this never blocks.
            let _ = tx.send(log).await;
        }
        Ok(rx)
    }

    async fn query(&self, params: QueryParams) -> Result<Vec<RawLog>, ConfigError> {
        if params.from > params.to {
            return Err(ConfigError::InvalidQueryRange);
        }
        let matched: Vec<RawLog> = self
            .logs
            .iter()
            .filter(|log| log.timestamp >= params.from && log.timestamp <= params.to)
            .take(params.limit)
            .cloned()
            .collect();
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn log_at(ts: DateTime<Utc>) -> RawLog {
        RawLog::new(ts, "test", b"hello".to_vec())
    }

    #[tokio::test]
    async fn stream_emits_every_log_then_closes() {
        let now = Utc::now();
        let connector = MemoryConnector::new(vec![log_at(now), log_at(now)]);
        let mut rx = connector.stream().await.unwrap();
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn query_filters_by_range_and_limit() {
        let now = Utc::now();
        let logs = vec![
            log_at(now - Duration::seconds(10)),
            log_at(now),
            log_at(now + Duration::seconds(10)),
        ];
        let connector = MemoryConnector::new(logs);
        let result = connector
            .query(QueryParams {
                from: now - Duration::seconds(1),
                to: now + Duration::seconds(20),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn query_rejects_inverted_range() {
        let connector = MemoryConnector::new(Vec::new());
        let now = Utc::now();
        let result = connector
            .query(QueryParams {
                from: now,
                to: now - Duration::seconds(1),
                limit: 10,
            })
            .await;
        assert!(matches!(result, Err(ConfigError::InvalidQueryRange)));
    }

    #[test]
    fn registry_round_trips_a_factory() {
        ConnectorRegistry::register("test-memory", || Box::new(MemoryConnector::new(Vec::new())));
        let built = ConnectorRegistry::build("test-memory");
        assert!(built.is_ok());
    }

    #[test]
    fn registry_errors_on_unknown_name() {
        let result = ConnectorRegistry::build("does-not-exist");
        assert!(matches!(result, Err(ConfigError::UnknownConnector(_))));
    }
}
