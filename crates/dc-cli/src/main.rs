use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dc_config::AppConfig;
use dc_core::{
    Connector, ConnectorContext, ConnectorEngine, ConnectorKind, ConnectorResult, Record,
    Registry, StreamTarget,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "dc-cli")]
#[command(about = "Run data connectors from the command line", long_about = None)]
struct Cli {
    /// Path to configuration directory
    #[arg(short, long, default_value = "config", global = true)]
    config_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered connector types
    List,

    /// Check a connector configuration without running it
    Validate {
        /// Connector type
        #[arg(long)]
        connector: String,

        /// Configuration entry, KEY=VALUE (VALUE is parsed as JSON when possible)
        #[arg(long = "set", value_parser = parse_setting)]
        settings: Vec<(String, Value)>,
    },

    /// Read from a batch or stream source and print the result as JSON
    Read {
        /// Connector type
        #[arg(long)]
        connector: String,

        /// Configuration entry, KEY=VALUE
        #[arg(long = "set", value_parser = parse_setting)]
        settings: Vec<(String, Value)>,
    },

    /// Copy records from a source connector into a sink connector
    Copy {
        /// Source connector type
        #[arg(long)]
        source: String,

        /// Source configuration entry, KEY=VALUE
        #[arg(long = "source-set", value_parser = parse_setting)]
        source_settings: Vec<(String, Value)>,

        /// Sink connector type
        #[arg(long)]
        sink: String,

        /// Sink configuration entry, KEY=VALUE
        #[arg(long = "sink-set", value_parser = parse_setting)]
        sink_settings: Vec<(String, Value)>,
    },
}

fn parse_setting(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn context_from(settings: Vec<(String, Value)>) -> ConnectorContext {
    ConnectorContext::generate().with_configuration(settings.into_iter().collect())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let level = match config.logging.level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries command output
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr);
    if config.logging.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn print_result(result: &ConnectorResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if !result.success {
        bail!("{}", result.message);
    }
    Ok(())
}

/// Run a stream to its end, stopping it on Ctrl-C.
async fn run_stream(
    engine: &ConnectorEngine,
    connector: Connector,
    context: ConnectorContext,
    target: StreamTarget,
) -> ConnectorResult {
    let handle = engine.run_stream(connector, context, target).await;
    let control = handle.cancel_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("[{}] Interrupted, stopping stream", control.execution_id());
            control.stop();
        }
    });
    let result = handle.wait().await;
    watcher.abort();
    result
}

/// Read everything a source produces, batch or stream.
async fn read_all(
    engine: &ConnectorEngine,
    connector: Connector,
    context: ConnectorContext,
) -> anyhow::Result<ConnectorResult> {
    match connector.kind() {
        ConnectorKind::BatchSource => Ok(engine.run_batch_read(connector, context).await),
        ConnectorKind::StreamSource => {
            Ok(run_stream(engine, connector, context, StreamTarget::Collect).await)
        }
        kind => bail!(
            "connector '{}' is a {} and cannot be read from",
            connector.connector_type(),
            kind
        ),
    }
}

async fn write_all(
    engine: &ConnectorEngine,
    connector: Connector,
    context: ConnectorContext,
    records: Vec<Record>,
) -> anyhow::Result<ConnectorResult> {
    match connector.kind() {
        ConnectorKind::BatchSink => Ok(engine.run_batch_write(connector, context, records).await),
        ConnectorKind::StreamSink => {
            let batch_size = engine.config().sink_batch_size.max(1);
            let batches: Vec<Vec<Record>> = records
                .chunks(batch_size)
                .map(|chunk| chunk.to_vec())
                .collect();
            Ok(engine
                .run_stream_write(connector, context, futures::stream::iter(batches))
                .await)
        }
        kind => bail!(
            "connector '{}' is a {} and cannot be written to",
            connector.connector_type(),
            kind
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let app_config = AppConfig::load(&cli.config_dir)
        .with_context(|| format!("loading configuration from '{}'", cli.config_dir))?;
    init_tracing(&app_config)?;

    let mut registry = Registry::new();
    dc_jsonl_connector::register_all(&mut registry);
    let registry = Arc::new(registry);
    info!("Available connectors: {:?}", registry.list_connectors());

    let engine = ConnectorEngine::new(app_config.engine.clone()).with_registry(registry.clone());

    match cli.command {
        Commands::List => {
            for name in registry.list_connectors() {
                let kind = registry.create(&name)?.kind();
                let metadata = registry.metadata(&name).cloned().unwrap_or_default();
                println!(
                    "{:<22} {:<14} {:<8} {}",
                    name, kind, metadata.version, metadata.description
                );
            }
        }

        Commands::Validate {
            connector,
            settings,
        } => {
            let connector = engine.create(&connector)?;
            let context = context_from(settings);
            let errors = connector.validate_configuration(&context);
            if !errors.is_empty() {
                for e in &errors {
                    println!("  - {}", e);
                }
                bail!(
                    "configuration for '{}' is invalid ({} errors)",
                    connector.connector_type(),
                    errors.len()
                );
            }
            println!("Configuration for '{}' is valid", connector.connector_type());
        }

        Commands::Read {
            connector,
            settings,
        } => {
            let connector = engine.create(&connector)?;
            let result = read_all(&engine, connector, context_from(settings)).await?;
            print_result(&result)?;
        }

        Commands::Copy {
            source,
            source_settings,
            sink,
            sink_settings,
        } => {
            let source = engine.create(&source)?;
            let sink = engine.create(&sink)?;
            let source_context = context_from(source_settings);
            let sink_context = context_from(sink_settings);

            let result = if source.kind() == ConnectorKind::StreamSource
                && sink.kind() == ConnectorKind::StreamSink
            {
                info!("Piping stream {} into {}", source.connector_type(), sink.connector_type());
                let target = StreamTarget::Sink {
                    connector: sink,
                    context: sink_context,
                };
                run_stream(&engine, source, source_context, target).await
            } else {
                let read = read_all(&engine, source, source_context).await?;
                if !read.success {
                    return print_result(&read);
                }
                let records = read.records.unwrap_or_default();
                info!("Read {} records, writing to {}", records.len(), sink.connector_type());
                write_all(&engine, sink, sink_context, records).await?
            };
            print_result(&result)?;
        }
    }

    Ok(())
}
