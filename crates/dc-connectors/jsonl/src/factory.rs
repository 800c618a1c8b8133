use crate::{JsonlReader, JsonlStreamReader, JsonlStreamWriter, JsonlWriter};
use dc_core::{Connector, ConnectorFactory, ConnectorMetadata, Registry, Result};
use std::sync::Arc;

pub struct JsonlReaderFactory;

impl ConnectorFactory for JsonlReaderFactory {
    fn name(&self) -> &str {
        crate::reader::JSONL_READER
    }

    fn metadata(&self) -> ConnectorMetadata {
        JsonlReader::describe()
    }

    fn create(&self) -> Result<Connector> {
        Ok(Connector::batch_source(JsonlReader::new()))
    }
}

pub struct JsonlWriterFactory;

impl ConnectorFactory for JsonlWriterFactory {
    fn name(&self) -> &str {
        crate::writer::JSONL_WRITER
    }

    fn metadata(&self) -> ConnectorMetadata {
        JsonlWriter::describe()
    }

    fn create(&self) -> Result<Connector> {
        Ok(Connector::batch_sink(JsonlWriter::new()))
    }
}

pub struct JsonlStreamReaderFactory;

impl ConnectorFactory for JsonlStreamReaderFactory {
    fn name(&self) -> &str {
        crate::stream_reader::JSONL_STREAM_READER
    }

    fn metadata(&self) -> ConnectorMetadata {
        JsonlStreamReader::describe()
    }

    fn create(&self) -> Result<Connector> {
        Ok(Connector::stream_source(JsonlStreamReader::new()))
    }
}

pub struct JsonlStreamWriterFactory;

impl ConnectorFactory for JsonlStreamWriterFactory {
    fn name(&self) -> &str {
        crate::stream_writer::JSONL_STREAM_WRITER
    }

    fn metadata(&self) -> ConnectorMetadata {
        JsonlStreamWriter::describe()
    }

    fn create(&self) -> Result<Connector> {
        Ok(Connector::stream_sink(JsonlStreamWriter::new()))
    }
}

/// Register all four JSON lines connectors
pub fn register_all(registry: &mut Registry) {
    registry.register(Arc::new(JsonlReaderFactory));
    registry.register(Arc::new(JsonlWriterFactory));
    registry.register(Arc::new(JsonlStreamReaderFactory));
    registry.register(Arc::new(JsonlStreamWriterFactory));
}
