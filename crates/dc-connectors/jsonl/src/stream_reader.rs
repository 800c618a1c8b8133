use crate::config::{parse_line, JsonlConfig};
use async_trait::async_trait;
use dc_core::{
    ConnectorContext, ConnectorMetadata, DataConnector, DataStreamSource, Error, Result,
    StreamCancellable, StreamObserver,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const JSONL_STREAM_READER: &str = "jsonl-stream-reader";

/// Stream source pushing one record per line from a background task.
pub struct JsonlStreamReader {
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Default for JsonlStreamReader {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonlStreamReader {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            task: None,
        }
    }

    pub fn describe() -> ConnectorMetadata {
        ConnectorMetadata::new(JSONL_STREAM_READER)
            .with_description("Streams the objects of a JSON lines file, one record per line")
            .with_version(env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl DataConnector for JsonlStreamReader {
    fn connector_type(&self) -> &str {
        JSONL_STREAM_READER
    }

    fn metadata(&self) -> ConnectorMetadata {
        Self::describe()
    }

    fn validate_configuration(&self, context: &ConnectorContext) -> Vec<String> {
        JsonlConfig::validate(context)
    }

    async fn close(&mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| Error::Lifecycle(format!("reader task failed: {}", e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl DataStreamSource for JsonlStreamReader {
    async fn start_stream(
        &mut self,
        context: &ConnectorContext,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Box<dyn StreamCancellable>> {
        let config = JsonlConfig::from_context(context)?;
        let file = File::open(&config.path).await?;
        info!("[{}] Streaming {}", context.execution_id(), config.path.display());

        let lines = BufReader::new(file).lines();
        let shutdown = self.shutdown.clone();
        let delay = Duration::from_millis(config.delay_ms);
        let execution_id = context.execution_id().to_string();
        self.task = Some(tokio::spawn(pump(lines, observer, shutdown, delay, execution_id)));

        let token = self.shutdown.clone();
        Ok(Box::new(move || token.cancel()))
    }
}

async fn pump(
    mut lines: Lines<BufReader<File>>,
    observer: Arc<dyn StreamObserver>,
    shutdown: CancellationToken,
    delay: Duration,
    execution_id: String,
) {
    let mut line_no = 0;
    let mut emitted = 0usize;
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("[{}] Reader stopped after {} records", execution_id, emitted);
                return;
            }
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("[{}] End of file after {} records", execution_id, emitted);
                observer.on_complete();
                return;
            }
            Err(e) => {
                warn!("[{}] Read failed: {}", execution_id, e);
                observer.on_error(Error::Io(e));
                return;
            }
        };
        line_no += 1;

        match parse_line(&line, line_no) {
            Ok(Some(record)) => {
                observer.on_next(record);
                emitted += 1;
            }
            Ok(None) => continue,
            Err(e) => {
                warn!("[{}] Unreadable line: {}", execution_id, e);
                observer.on_error(e);
                return;
            }
        }

        if !delay.is_zero() {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
