use crate::config::{encode_line, JsonlConfig};
use async_trait::async_trait;
use dc_core::{
    ConnectorContext, ConnectorMetadata, ConnectorResult, DataConnector, DataSink, Record, Result,
};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

pub const JSONL_WRITER: &str = "jsonl-writer";

/// Batch sink writing records as JSON lines
#[derive(Default)]
pub struct JsonlWriter;

impl JsonlWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn describe() -> ConnectorMetadata {
        ConnectorMetadata::new(JSONL_WRITER)
            .with_description("Writes a batch of records to a JSON lines file")
            .with_version(env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl DataConnector for JsonlWriter {
    fn connector_type(&self) -> &str {
        JSONL_WRITER
    }

    fn metadata(&self) -> ConnectorMetadata {
        Self::describe()
    }

    fn validate_configuration(&self, context: &ConnectorContext) -> Vec<String> {
        JsonlConfig::validate(context)
    }
}

#[async_trait]
impl DataSink for JsonlWriter {
    async fn write(
        &mut self,
        context: &ConnectorContext,
        records: Vec<Record>,
    ) -> Result<ConnectorResult> {
        let config = JsonlConfig::from_context(context)?;
        let mut out = BufWriter::new(config.open_for_write().await?);
        for record in &records {
            out.write_all(&encode_line(record)?).await?;
        }
        out.flush().await?;

        info!(
            "[{}] Wrote {} records to {}",
            context.execution_id(),
            records.len(),
            config.path.display()
        );
        Ok(
            ConnectorResult::success(format!("wrote {} records", records.len()))
                .with_records_processed(records.len()),
        )
    }
}
