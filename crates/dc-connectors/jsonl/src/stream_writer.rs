use crate::config::{encode_line, JsonlConfig};
use async_trait::async_trait;
use dc_core::{
    ConnectorContext, ConnectorMetadata, DataConnector, DataStreamSink, Record, Result,
    StreamWriter,
};
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

pub const JSONL_STREAM_WRITER: &str = "jsonl-stream-writer";

/// Stream sink appending each batch to a JSON lines file
#[derive(Default)]
pub struct JsonlStreamWriter;

impl JsonlStreamWriter {
    pub fn new() -> Self {
        Self
    }

    pub fn describe() -> ConnectorMetadata {
        ConnectorMetadata::new(JSONL_STREAM_WRITER)
            .with_description("Writes record batches to a JSON lines file as they arrive")
            .with_version(env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl DataConnector for JsonlStreamWriter {
    fn connector_type(&self) -> &str {
        JSONL_STREAM_WRITER
    }

    fn metadata(&self) -> ConnectorMetadata {
        Self::describe()
    }

    fn validate_configuration(&self, context: &ConnectorContext) -> Vec<String> {
        JsonlConfig::validate(context)
    }
}

#[async_trait]
impl DataStreamSink for JsonlStreamWriter {
    async fn create_writer(&mut self, context: &ConnectorContext) -> Result<Box<dyn StreamWriter>> {
        let config = JsonlConfig::from_context(context)?;
        let file = config.open_for_write().await?;
        debug!("[{}] Opened {} for writing", context.execution_id(), config.path.display());
        Ok(Box::new(JsonlBatchWriter {
            execution_id: context.execution_id().to_string(),
            path: config.path,
            out: BufWriter::new(file),
            written: 0,
        }))
    }
}

struct JsonlBatchWriter {
    execution_id: String,
    path: PathBuf,
    out: BufWriter<File>,
    written: usize,
}

#[async_trait]
impl StreamWriter for JsonlBatchWriter {
    async fn write_batch(&mut self, records: Vec<Record>) -> Result<()> {
        for record in &records {
            self.out.write_all(&encode_line(record)?).await?;
        }
        self.written += records.len();
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.out.flush().await?;
        info!(
            "[{}] Wrote {} records to {}",
            self.execution_id,
            self.written,
            self.path.display()
        );
        Ok(())
    }
}
