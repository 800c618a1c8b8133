use crate::{Error, Record, Result};
use async_trait::async_trait;

/// Push target for a streaming read.
///
/// Delivery contract for connectors:
/// - `on_next` zero or more times, strictly before the terminal call
/// - exactly one of `on_error` or `on_complete`
/// - nothing after the terminal call
/// - calls are serialized by the connector
///
/// Implementations must be callable from any thread and must not block.
pub trait StreamObserver: Send + Sync {
    fn on_next(&self, record: Record);

    fn on_error(&self, error: Error);

    fn on_complete(&self);
}

/// Handle used to ask a running stream to stop.
///
/// `stop` is idempotent, callable from any thread, and a no-op once the
/// stream has terminated.
pub trait StreamCancellable: Send + Sync {
    fn stop(&self);
}

/// Any `Fn()` closure can serve as a cancellable.
impl<F> StreamCancellable for F
where
    F: Fn() + Send + Sync,
{
    fn stop(&self) {
        self()
    }
}

/// Chunked writer handed out by a stream sink.
///
/// The engine calls `close` exactly once per writer, including after a
/// failed `write_batch`.
#[async_trait]
pub trait StreamWriter: Send {
    async fn write_batch(&mut self, records: Vec<Record>) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
