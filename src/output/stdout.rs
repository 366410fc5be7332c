use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use crate::error::OutputError;
use crate::output::{encode, Output, OutputContext};
use crate::types::CanonicalEvent;

pub struct StdoutOutput {
    stdout: Mutex<Stdout>,
}

impl StdoutOutput {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Output for StdoutOutput {
    async fn write(&self, ctx: &OutputContext, event: CanonicalEvent) -> Result<(), OutputError> {
        let line = encode(ctx, event)?;
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| OutputError::Write(e.to_string()))?;
        stdout
            .write_all(b"\n")
            .await
            .map_err(|e| OutputError::Write(e.to_string()))
    }

    async fn close(&self) -> Result<(), OutputError> {
        let mut stdout = self.stdout.lock().await;
        stdout.flush().await.map_err(|e| OutputError::Close(e.to_string()))
    }
}
