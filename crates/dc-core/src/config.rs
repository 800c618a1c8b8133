use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the connector execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cancel streams that have not terminated after this many milliseconds
    pub stream_timeout_ms: Option<u64>,

    /// Fail collected streams that deliver more records than this
    pub max_collected_records: Option<usize>,

    /// Records per `write_batch` call when piping into a stream sink
    pub sink_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream_timeout_ms: None,
            max_collected_records: None,
            sink_batch_size: 100,
        }
    }
}

impl EngineConfig {
    pub fn stream_timeout(&self) -> Option<Duration> {
        self.stream_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_max_collected_records(mut self, limit: usize) -> Self {
        self.max_collected_records = Some(limit);
        self
    }

    pub fn with_sink_batch_size(mut self, size: usize) -> Self {
        self.sink_batch_size = size;
        self
    }

    /// Batch size actually used; zero is treated as one.
    pub(crate) fn effective_sink_batch_size(&self) -> usize {
        self.sink_batch_size.max(1)
    }
}
