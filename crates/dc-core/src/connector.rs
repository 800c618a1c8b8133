use crate::{
    ConnectorContext, ConnectorMetadata, ConnectorResult, Record, Result, StreamCancellable,
    StreamObserver, StreamWriter,
};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Capabilities shared by every connector.
#[async_trait]
pub trait DataConnector: Send + Sync {
    /// Stable type identifier used for registry lookup
    fn connector_type(&self) -> &str;

    /// Static description of the connector type
    fn metadata(&self) -> ConnectorMetadata;

    /// Check the configuration before anything else runs.
    /// An empty list means the configuration is valid.
    fn validate_configuration(&self, _context: &ConnectorContext) -> Vec<String> {
        Vec::new()
    }

    /// Called once before the operation
    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once after the operation, on success and failure paths
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Batch reader
#[async_trait]
pub trait DataSource: DataConnector {
    async fn read(&mut self, context: &ConnectorContext) -> Result<ConnectorResult>;
}

/// Batch writer. Records arrive fully materialized.
#[async_trait]
pub trait DataSink: DataConnector {
    async fn write(
        &mut self,
        context: &ConnectorContext,
        records: Vec<Record>,
    ) -> Result<ConnectorResult>;
}

/// Push-based reader.
///
/// `start_stream` returns as soon as the stream is set up. Records are then
/// delivered to the observer from a task or thread owned by the connector.
#[async_trait]
pub trait DataStreamSource: DataConnector {
    async fn start_stream(
        &mut self,
        context: &ConnectorContext,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Box<dyn StreamCancellable>>;
}

/// Chunked writer factory
#[async_trait]
pub trait DataStreamSink: DataConnector {
    async fn create_writer(&mut self, context: &ConnectorContext) -> Result<Box<dyn StreamWriter>>;
}

/// A connector instance, tagged with the single capability it provides.
pub enum Connector {
    BatchSource(Box<dyn DataSource>),
    BatchSink(Box<dyn DataSink>),
    StreamSource(Box<dyn DataStreamSource>),
    StreamSink(Box<dyn DataStreamSink>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    BatchSource,
    BatchSink,
    StreamSource,
    StreamSink,
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectorKind::BatchSource => "batch source",
            ConnectorKind::BatchSink => "batch sink",
            ConnectorKind::StreamSource => "stream source",
            ConnectorKind::StreamSink => "stream sink",
        };
        f.pad(name)
    }
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            Connector::BatchSource($c) => $body,
            Connector::BatchSink($c) => $body,
            Connector::StreamSource($c) => $body,
            Connector::StreamSink($c) => $body,
        }
    };
}

impl Connector {
    pub fn batch_source(source: impl DataSource + 'static) -> Self {
        Connector::BatchSource(Box::new(source))
    }

    pub fn batch_sink(sink: impl DataSink + 'static) -> Self {
        Connector::BatchSink(Box::new(sink))
    }

    pub fn stream_source(source: impl DataStreamSource + 'static) -> Self {
        Connector::StreamSource(Box::new(source))
    }

    pub fn stream_sink(sink: impl DataStreamSink + 'static) -> Self {
        Connector::StreamSink(Box::new(sink))
    }

    pub fn kind(&self) -> ConnectorKind {
        match self {
            Connector::BatchSource(_) => ConnectorKind::BatchSource,
            Connector::BatchSink(_) => ConnectorKind::BatchSink,
            Connector::StreamSource(_) => ConnectorKind::StreamSource,
            Connector::StreamSink(_) => ConnectorKind::StreamSink,
        }
    }

    pub fn connector_type(&self) -> &str {
        dispatch!(self, c => c.connector_type())
    }

    pub fn metadata(&self) -> ConnectorMetadata {
        dispatch!(self, c => c.metadata())
    }

    pub fn validate_configuration(&self, context: &ConnectorContext) -> Vec<String> {
        dispatch!(self, c => c.validate_configuration(context))
    }

    pub async fn initialize(&mut self) -> Result<()> {
        dispatch!(self, c => c.initialize().await)
    }

    pub async fn close(&mut self) -> Result<()> {
        dispatch!(self, c => c.close().await)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("type", &self.connector_type())
            .field("kind", &self.kind())
            .finish()
    }
}
