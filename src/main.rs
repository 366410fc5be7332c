// logtriage: classify heterogeneous log lines into a small taxonomy of
// operational event types, either as a one-shot batch or a long-running
// stream.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use logtriage::config::{Config, Mode};
use logtriage::connector::{Connector, ConnectorRegistry, QueryParams};
use logtriage::output::{FileOutput, Format, Output, OutputContext, StdoutOutput, WebhookOutput};
use logtriage::pipeline::{Pipeline, PipelineConfig};
use logtriage::types::RawLog;
use logtriage::LogTriage;

/// logtriage: on-device classification engine for heterogeneous log sources.
#[derive(Parser)]
#[command(name = "logtriage", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured connector through the classification pipeline
    Run {
        /// Where classified events are written
        #[arg(long, value_enum, default_value = "stdout")]
        output: OutputKind,

        /// File path, required when --output=file
        #[arg(long)]
        output_path: Option<String>,
    },

    /// Classify a handful of synthetic logs through the in-memory connector,
    /// for smoke-testing a model/vocab/projection bundle without a real source
    Demo,

    /// Classify a single line read from stdin or passed as an argument
    Classify {
        /// The log line to classify. Reads stdin if omitted.
        line: Option<String>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputKind {
    Stdout,
    File,
    Webhook,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("logtriage=info")),
        )
        .init();

    ConnectorRegistry::install_defaults();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { output, output_path } => run(output, output_path).await,
        Commands::Demo => demo().await,
        Commands::Classify { line } => classify(line).await,
    }
}

async fn run(output_kind: OutputKind, output_path: Option<String>) -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    info!(connector = %config.connector, mode = ?config.mode, "starting logtriage");

    let triage = LogTriage::build(&config)
        .await
        .context("constructing classification engine")?;
    let connector = ConnectorRegistry::build(&config.connector).context("constructing connector")?;

    let output = build_output(output_kind, output_path, &config)?;
    let pipeline = Pipeline::new(
        Arc::new(EngineAdapter(triage)),
        output.clone(),
        pipeline_config(&config),
    );

    let cancel = CancellationToken::new();
    let shutdown_signal = {
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        }
    };

    let result = match config.mode {
        Mode::Stream => {
            let logs = connector.stream().await.context("starting connector stream")?;
            tokio::select! {
                result = pipeline.run_stream(logs, cancel.clone()) => result.map_err(anyhow::Error::from),
                _ = shutdown_signal => Ok(()),
            }
        }
        Mode::Query => {
            let params = QueryParams {
                from: config.from.unwrap_or_else(|| chrono::Utc::now() - chrono::Duration::days(1)),
                to: config.to.unwrap_or_else(chrono::Utc::now),
                limit: config.limit,
            };
            pipeline.run_query(connector.as_ref(), params).await.map_err(anyhow::Error::from)
        }
    };

    let skips = pipeline.skip_count();
    if skips > 0 {
        warn!(skips, "finished with skipped logs");
    } else {
        info!("finished with no skipped logs");
    }

    output.close().await.context("closing output")?;
    result
}

async fn demo() -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    let triage = LogTriage::build(&config)
        .await
        .context("constructing classification engine")?;

    let now = chrono::Utc::now();
    let logs = vec![
        RawLog::new(now, "demo", b"connection refused: could not reach db-primary:5432".to_vec()),
        RawLog::new(now, "demo", b"GET /healthz 200 OK 4ms".to_vec()),
        RawLog::new(now, "demo", b"".to_vec()),
    ];

    let events = triage.classify_batch(&logs).await.context("classifying demo logs")?;
    for event in events {
        println!("{}", serde_json::to_string_pretty(&event)?);
    }
    Ok(())
}

async fn classify(line: Option<String>) -> Result<()> {
    let config = Config::load().context("loading configuration")?;
    let triage = LogTriage::build(&config)
        .await
        .context("constructing classification engine")?;

    let text = match line {
        Some(line) => line,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_line(&mut buf).context("reading stdin")?;
            buf
        }
    };

    let raw = RawLog::new(chrono::Utc::now(), "stdin", text.into_bytes());
    let event = triage.classify(&raw).await.context("classifying log")?;
    let format = if config.pretty { Format::Pretty } else { Format::Ndjson };
    let ctx = OutputContext { verbosity: config.verbosity, format };
    println!("{}", logtriage::output::encode(&ctx, event)?);
    Ok(())
}

fn build_output(kind: OutputKind, path: Option<String>, config: &Config) -> Result<Arc<dyn Output>> {
    match kind {
        OutputKind::Stdout => Ok(Arc::new(StdoutOutput::new())),
        OutputKind::File => {
            let path = path.context("--output-path is required when --output=file")?;
            Ok(Arc::new(FileOutput::open(path, None)?))
        }
        OutputKind::Webhook => {
            let endpoint = config
                .endpoint
                .clone()
                .context("ENDPOINT must be set when --output=webhook")?;
            Ok(Arc::new(WebhookOutput::new(endpoint)))
        }
    }
}

fn pipeline_config(config: &Config) -> PipelineConfig {
    PipelineConfig {
        dedup_window: config.dedup_window,
        max_buffer_size: config.max_buffer_size,
        output_ctx: OutputContext {
            verbosity: config.verbosity,
            format: if config.pretty { Format::Pretty } else { Format::Ndjson },
        },
    }
}

/// Adapts the public `LogTriage` handle to the pipeline's `Processor` seam.
struct EngineAdapter(LogTriage);

#[async_trait::async_trait]
impl logtriage::pipeline::Processor for EngineAdapter {
    async fn process(&self, raw: &RawLog) -> Result<logtriage::types::CanonicalEvent, logtriage::error::InferenceError> {
        self.0.classify(raw).await.map_err(|e| logtriage::error::InferenceError::Runtime(e.to_string()))
    }

    async fn process_batch(
        &self,
        raws: &[RawLog],
    ) -> Result<Vec<logtriage::types::CanonicalEvent>, logtriage::error::InferenceError> {
        self.0
            .classify_batch(raws)
            .await
            .map_err(|e| logtriage::error::InferenceError::Runtime(e.to_string()))
    }
}
