use crate::config::{parse_line, JsonlConfig};
use async_trait::async_trait;
use dc_core::{
    ConnectorContext, ConnectorMetadata, ConnectorResult, DataConnector, DataSource, FailureKind,
    Result,
};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

pub const JSONL_READER: &str = "jsonl-reader";

/// Batch source reading a whole JSON lines file
#[derive(Default)]
pub struct JsonlReader;

impl JsonlReader {
    pub fn new() -> Self {
        Self
    }

    pub fn describe() -> ConnectorMetadata {
        ConnectorMetadata::new(JSONL_READER)
            .with_description("Reads every object of a JSON lines file in one batch")
            .with_version(env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl DataConnector for JsonlReader {
    fn connector_type(&self) -> &str {
        JSONL_READER
    }

    fn metadata(&self) -> ConnectorMetadata {
        Self::describe()
    }

    fn validate_configuration(&self, context: &ConnectorContext) -> Vec<String> {
        JsonlConfig::validate(context)
    }
}

#[async_trait]
impl DataSource for JsonlReader {
    async fn read(&mut self, context: &ConnectorContext) -> Result<ConnectorResult> {
        let config = JsonlConfig::from_context(context)?;
        info!("[{}] Reading {}", context.execution_id(), config.path.display());

        let file = File::open(&config.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            match parse_line(&line, line_no) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!("[{}] Stopping at unreadable line: {}", context.execution_id(), e);
                    return Ok(
                        ConnectorResult::failure(FailureKind::Operation, e.detail())
                            .with_records(records),
                    );
                }
            }
        }

        debug!("[{}] Read {} records from {} lines", context.execution_id(), records.len(), line_no);
        Ok(ConnectorResult::success(format!(
            "read {} records from {}",
            records.len(),
            config.path.display()
        ))
        .with_records(records))
    }
}
