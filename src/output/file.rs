// File output sink with optional size-based rotation. Concurrent writers
// are serialized through a single mutex-guarded handle, matching the
// stream buffer's concurrency treatment elsewhere in the pipeline.

use std::io::{BufWriter, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::OutputError;
use crate::output::{encode, Output, OutputContext};
use crate::types::CanonicalEvent;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

struct FileState {
    writer: BufWriter<std::fs::File>,
    bytes_written: u64,
}

pub struct FileOutput {
    path: PathBuf,
    max_bytes: Option<u64>,
    state: Mutex<FileState>,
}

impl FileOutput {
    pub fn open(path: impl Into<PathBuf>, max_bytes: Option<u64>) -> Result<Self, OutputError> {
        let path = path.into();
        let (file, bytes_written) = open_append(&path)?;
        Ok(Self {
            path,
            max_bytes,
            state: Mutex::new(FileState {
                writer: BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file),
                bytes_written,
            }),
        })
    }

    fn rotate(&self, state: &mut FileState) -> Result<(), OutputError> {
        state.writer.flush().map_err(|e| OutputError::Write(e.to_string()))?;

        for n in (1..=9).rev() {
            let from = self.path.with_extension(format!("{n}"));
            let to = self.path.with_extension(format!("{}", n + 1));
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }
        let rotated = self.path.with_extension("1");
        if self.path.exists() {
            std::fs::rename(&self.path, &rotated).map_err(|e| OutputError::Write(e.to_string()))?;
        }

        let (file, _) = open_append(&self.path)?;
        state.writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
        state.bytes_written = 0;
        Ok(())
    }
}

fn open_append(path: &PathBuf) -> Result<(std::fs::File, u64), OutputError> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| OutputError::Write(e.to_string()))?;
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, len))
}

#[async_trait]
impl Output for FileOutput {
    async fn write(&self, ctx: &OutputContext, event: CanonicalEvent) -> Result<(), OutputError> {
        let mut line = encode(ctx, event)?;
        line.push('\n');
        let line_len = line.len() as u64;

        let mut state = self.state.lock().await;
        if let Some(max) = self.max_bytes {
            if state.bytes_written + line_len > max && state.bytes_written > 0 {
                self.rotate(&mut state)?;
            }
        }

        state
            .writer
            .write_all(line.as_bytes())
            .map_err(|e| OutputError::Write(e.to_string()))?;
        state.bytes_written += line_len;
        Ok(())
    }

    async fn close(&self) -> Result<(), OutputError> {
        let mut state = self.state.lock().await;
        state.writer.flush().map_err(|e| OutputError::Close(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compactor::Verbosity;
    use crate::output::Format;
    use chrono::Utc;

    fn sample_event(summary: &str) -> CanonicalEvent {
        CanonicalEvent {
            event_type: "ERROR".to_string(),
            category: "x".to_string(),
            severity: "error".to_string(),
            timestamp: Utc::now(),
            summary: summary.to_string(),
            confidence: 0.9,
            raw: String::new(),
            count: 0,
        }
    }

    #[tokio::test]
    async fn writes_ndjson_lines_and_flushes_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let output = FileOutput::open(&path, None).unwrap();
        let ctx = OutputContext {
            verbosity: Verbosity::Standard,
            format: Format::Ndjson,
        };
        output.write(&ctx, sample_event("one")).await.unwrap();
        output.write(&ctx, sample_event("two")).await.unwrap();
        output.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn appends_to_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        std::fs::write(&path, "existing\n").unwrap();

        let output = FileOutput::open(&path, None).unwrap();
        let ctx = OutputContext::default();
        output.write(&ctx, sample_event("new")).await.unwrap();
        output.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("existing"));
        assert_eq!(contents.lines().count(), 2);
    }
}
