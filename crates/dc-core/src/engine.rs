//! Connector execution engine.
//!
//! Drives one connector invocation through
//! `CREATED -> VALIDATING -> VALIDATED -> INITIALIZING -> RUNNING -> CLOSING -> CLOSED`
//! (or `FAILED`), for every operation mode. Whatever the connector does,
//! each entry point hands back a [`ConnectorResult`], and `close()` has run
//! exactly once for every connector whose `initialize()` was attempted.

use crate::guard::{guarded, guarded_sync};
use crate::listener::{Drain, Listener, SinkStage, StreamTarget};
use crate::session::{CancelReason, EngineObserver, SessionShared};
use crate::{
    Connector, ConnectorContext, ConnectorKind, ConnectorResult, EngineConfig, Error,
    FailureKind, Lifecycle, LifecycleState, Record, Registry, Result, StreamCancelHandle,
    StreamCancellable, StreamObserver, StreamWriter,
};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

pub struct ConnectorEngine {
    config: EngineConfig,
    registry: Option<Arc<Registry>>,
}

/// Handle to a running stream.
///
/// Resolves to the stream's [`ConnectorResult`] via [`StreamHandle::wait`].
/// Dropping the handle does not stop the stream; use the cancel handle or a
/// configured stream timeout for that.
pub struct StreamHandle {
    control: StreamCancelHandle,
    done: oneshot::Receiver<ConnectorResult>,
}

impl StreamHandle {
    pub fn cancel_handle(&self) -> StreamCancelHandle {
        self.control.clone()
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn execution_id(&self) -> &str {
        self.control.execution_id()
    }

    /// Wait for the stream to terminate and its connectors to be closed
    pub async fn wait(self) -> ConnectorResult {
        match self.done.await {
            Ok(result) => result,
            Err(_) => ConnectorResult::failure(
                FailureKind::Lifecycle,
                "stream listener exited without producing a result",
            ),
        }
    }
}

/// Close a connector, logging the outcome. Lifecycle bookkeeping is left to
/// the caller.
pub(crate) async fn close_connector(connector: &mut Connector, context: &ConnectorContext) -> Result<()> {
    match guarded(connector.close()).await {
        Ok(()) => {
            debug!(execution_id = %context.execution_id(), connector_type = %connector.connector_type(), "Connector closed");
            Ok(())
        }
        Err(e) => {
            error!(
                execution_id = %context.execution_id(),
                connector_type = %connector.connector_type(),
                error = %e,
                "Connector close failed"
            );
            Err(e)
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

async fn start_stream(
    connector: &mut Connector,
    context: &ConnectorContext,
    observer: Arc<dyn StreamObserver>,
) -> Result<Box<dyn StreamCancellable>> {
    match connector {
        Connector::StreamSource(source) => guarded(source.start_stream(context, observer)).await,
        other => Err(Error::Configuration(format!("{} cannot stream", other.kind()))),
    }
}

fn start_failure(context: &ConnectorContext, e: Error) -> ConnectorResult {
    error!(execution_id = %context.execution_id(), error = %e, "Failed to start stream");
    ConnectorResult::failure(
        FailureKind::Operation,
        format!("failed to start stream: {}", e.detail()),
    )
}

fn mode_mismatch(connector: &Connector, expected: ConnectorKind) -> ConnectorResult {
    ConnectorResult::failure(
        FailureKind::Configuration,
        format!(
            "connector '{}' is a {}, expected a {}",
            connector.connector_type(),
            connector.kind(),
            expected
        ),
    )
}

impl ConnectorEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> Option<&Arc<Registry>> {
        self.registry.as_ref()
    }

    /// Resolve a connector type through the attached registry
    pub fn create(&self, connector_type: &str) -> Result<Connector> {
        match &self.registry {
            Some(registry) => registry.create(connector_type),
            None => Err(Error::Configuration(
                "engine has no connector registry".to_string(),
            )),
        }
    }

    /// Run a batch source: validate, initialize, read, close.
    pub async fn run_batch_read(
        &self,
        mut connector: Connector,
        context: ConnectorContext,
    ) -> ConnectorResult {
        let started = Instant::now();
        let mut lifecycle = Lifecycle::new(context.execution_id());
        info!(execution_id = %context.execution_id(), connector_type = %connector.connector_type(), "Starting batch read");

        if connector.kind() != ConnectorKind::BatchSource {
            lifecycle.fail();
            return mode_mismatch(&connector, ConnectorKind::BatchSource)
                .with_execution_time(elapsed_ms(started));
        }
        if let Some(result) = self.prepare(&mut connector, &context, &mut lifecycle).await {
            return result.with_execution_time(elapsed_ms(started));
        }

        let outcome = match &mut connector {
            Connector::BatchSource(source) => guarded(source.read(&context)).await,
            other => Err(Error::Configuration(format!("{} cannot read", other.kind()))),
        };
        let result = self.operation_result(outcome, true, &context, &mut lifecycle);
        self.finish(connector, &context, lifecycle, result, started).await
    }

    /// Run a batch sink over a fully materialized list of records.
    pub async fn run_batch_write(
        &self,
        mut connector: Connector,
        context: ConnectorContext,
        records: Vec<Record>,
    ) -> ConnectorResult {
        let started = Instant::now();
        let mut lifecycle = Lifecycle::new(context.execution_id());
        info!(
            execution_id = %context.execution_id(),
            connector_type = %connector.connector_type(),
            records = records.len(),
            "Starting batch write"
        );

        if connector.kind() != ConnectorKind::BatchSink {
            lifecycle.fail();
            return mode_mismatch(&connector, ConnectorKind::BatchSink)
                .with_execution_time(elapsed_ms(started));
        }
        if let Some(result) = self.prepare(&mut connector, &context, &mut lifecycle).await {
            return result.with_execution_time(elapsed_ms(started));
        }

        let outcome = match &mut connector {
            Connector::BatchSink(sink) => guarded(sink.write(&context, records)).await,
            other => Err(Error::Configuration(format!("{} cannot write", other.kind()))),
        };
        let result = self.operation_result(outcome, false, &context, &mut lifecycle);
        self.finish(connector, &context, lifecycle, result, started).await
    }

    /// Start a stream source and return immediately with a handle.
    ///
    /// The handle resolves once the stream has completed, failed, been
    /// cancelled or timed out, and every connector involved has been closed.
    pub async fn run_stream(
        &self,
        mut connector: Connector,
        context: ConnectorContext,
        target: StreamTarget,
    ) -> StreamHandle {
        let started = Instant::now();
        let (shared, events) = SessionShared::new(context.execution_id());
        let (done_tx, done_rx) = oneshot::channel();
        let handle = StreamHandle {
            control: StreamCancelHandle::new(shared.clone()),
            done: done_rx,
        };
        let mut lifecycle = Lifecycle::new(context.execution_id());
        info!(execution_id = %context.execution_id(), connector_type = %connector.connector_type(), "Starting stream");

        if connector.kind() != ConnectorKind::StreamSource {
            lifecycle.fail();
            let result = mode_mismatch(&connector, ConnectorKind::StreamSource);
            resolve_early(&shared, lifecycle, done_tx, result, started);
            return handle;
        }

        let mut drain = match target {
            StreamTarget::Collect => Drain::Collect {
                records: Vec::new(),
                limit: self.config.max_collected_records,
            },
            StreamTarget::Forward(tx) => Drain::Forward { tx, forwarded: 0 },
            StreamTarget::Sink {
                connector: sink,
                context: sink_context,
            } => match self
                .prepare_pipe(&mut connector, &context, &mut lifecycle, sink, sink_context)
                .await
            {
                Ok(stage) => Drain::Sink(Box::new(stage)),
                Err(result) => {
                    resolve_early(&shared, lifecycle, done_tx, result, started);
                    return handle;
                }
            },
        };

        if !matches!(drain, Drain::Sink(_)) {
            if let Some(result) = self.prepare(&mut connector, &context, &mut lifecycle).await {
                resolve_early(&shared, lifecycle, done_tx, result, started);
                return handle;
            }
        }
        shared.set_lifecycle(lifecycle);

        let observer: Arc<dyn StreamObserver> = Arc::new(EngineObserver::new(shared.clone()));
        let start = match self.config.stream_timeout_ms {
            Some(ms) => {
                let remaining = Duration::from_millis(ms).saturating_sub(started.elapsed());
                match tokio::time::timeout(remaining, start_stream(&mut connector, &context, observer)).await {
                    Ok(start) => start.map_err(|e| start_failure(&context, e)),
                    Err(_) => {
                        error!(execution_id = %context.execution_id(), timeout_ms = ms, "start_stream did not return in time");
                        shared.cancel(CancelReason::Timeout(ms));
                        Err(ConnectorResult::failure(
                            FailureKind::Timeout,
                            format!("stream timed out after {}ms waiting for start_stream", ms),
                        ))
                    }
                }
            }
            None => start_stream(&mut connector, &context, observer)
                .await
                .map_err(|e| start_failure(&context, e)),
        };

        match start {
            Ok(cancellable) => {
                debug!(execution_id = %context.execution_id(), "Stream started, handing off to listener");
                let listener = Listener {
                    shared,
                    events,
                    source: connector,
                    context,
                    cancellable,
                    drain,
                    started,
                    timeout_ms: self.config.stream_timeout_ms,
                    done: done_tx,
                };
                tokio::spawn(listener.run());
            }
            Err(result) => {
                shared.mark_terminated();
                if shared.begin_finalize() {
                    if let Drain::Sink(stage) = &mut drain {
                        if let Some((_, msg)) = stage.finish(false).await {
                            warn!(execution_id = %context.execution_id(), "{}", msg);
                        }
                    }
                    shared.with_lifecycle(|l| {
                        l.fail();
                        l.advance(LifecycleState::Closing);
                    });
                    let closed = close_connector(&mut connector, &context).await;
                    shared.with_lifecycle(|l| l.finish(closed.is_ok()));
                    let _ = done_tx.send(result.with_execution_time(elapsed_ms(started)));
                }
            }
        }
        handle
    }

    /// `run_stream` followed by `wait`.
    pub async fn run_stream_to_end(
        &self,
        connector: Connector,
        context: ConnectorContext,
        target: StreamTarget,
    ) -> ConnectorResult {
        self.run_stream(connector, context, target).await.wait().await
    }

    /// Drive a stream sink: create a writer, feed it every batch from
    /// `batches`, close the writer, close the connector.
    pub async fn run_stream_write<S>(
        &self,
        mut connector: Connector,
        context: ConnectorContext,
        mut batches: S,
    ) -> ConnectorResult
    where
        S: Stream<Item = Vec<Record>> + Unpin + Send,
    {
        let started = Instant::now();
        let mut lifecycle = Lifecycle::new(context.execution_id());
        info!(execution_id = %context.execution_id(), connector_type = %connector.connector_type(), "Starting stream write");

        if connector.kind() != ConnectorKind::StreamSink {
            lifecycle.fail();
            return mode_mismatch(&connector, ConnectorKind::StreamSink)
                .with_execution_time(elapsed_ms(started));
        }
        if let Some(result) = self.prepare(&mut connector, &context, &mut lifecycle).await {
            return result.with_execution_time(elapsed_ms(started));
        }

        let mut writer = match self.create_writer(&mut connector, &context).await {
            Ok(writer) => writer,
            Err(e) => {
                lifecycle.fail();
                let result = ConnectorResult::failure(
                    FailureKind::Operation,
                    format!("failed to create writer: {}", e.detail()),
                );
                return self.finish(connector, &context, lifecycle, result, started).await;
            }
        };

        let mut written = 0;
        let mut failure: Option<(FailureKind, String)> = None;
        while let Some(batch) = batches.next().await {
            if batch.is_empty() {
                continue;
            }
            let count = batch.len();
            match guarded(writer.write_batch(batch)).await {
                Ok(()) => written += count,
                Err(e) => {
                    error!(execution_id = %context.execution_id(), error = %e, "Stream write failed");
                    failure = Some((FailureKind::Operation, e.detail()));
                    break;
                }
            }
        }

        if let Err(e) = guarded(writer.close()).await {
            error!(execution_id = %context.execution_id(), error = %e, "Stream writer close failed");
            failure.get_or_insert((
                FailureKind::Lifecycle,
                format!("writer close failed: {}", e.detail()),
            ));
        }

        let result = match failure {
            Some((kind, msg)) => {
                lifecycle.fail();
                ConnectorResult::failure(kind, msg)
            }
            None => ConnectorResult::success(format!("wrote {} records", written)),
        }
        .with_records_processed(written);
        self.finish(connector, &context, lifecycle, result, started).await
    }

    async fn create_writer(
        &self,
        connector: &mut Connector,
        context: &ConnectorContext,
    ) -> Result<Box<dyn StreamWriter>> {
        match connector {
            Connector::StreamSink(sink) => guarded(sink.create_writer(context)).await,
            other => Err(Error::Configuration(format!(
                "{} cannot create a writer",
                other.kind()
            ))),
        }
    }

    /// Validation step. Returns a configuration failure when the connector
    /// rejects its configuration; nothing else is called in that case.
    fn validate(
        &self,
        connector: &Connector,
        context: &ConnectorContext,
        lifecycle: &mut Lifecycle,
    ) -> Option<ConnectorResult> {
        lifecycle.advance(LifecycleState::Validating);
        let errors = guarded_sync(|| connector.validate_configuration(context))
            .unwrap_or_else(|e| vec![e.detail()]);
        if errors.is_empty() {
            lifecycle.advance(LifecycleState::Validated);
            return None;
        }
        warn!(
            execution_id = %context.execution_id(),
            connector_type = %connector.connector_type(),
            errors = ?errors,
            "Configuration rejected"
        );
        lifecycle.fail();
        Some(ConnectorResult::failure(
            FailureKind::Configuration,
            format!("invalid configuration: {}", errors.join("; ")),
        ))
    }

    /// Initialization step. On failure the connector is closed before the
    /// failed result is returned.
    async fn initialize(
        &self,
        connector: &mut Connector,
        context: &ConnectorContext,
        lifecycle: &mut Lifecycle,
    ) -> Option<ConnectorResult> {
        lifecycle.advance(LifecycleState::Initializing);
        match guarded(connector.initialize()).await {
            Ok(()) => {
                lifecycle.advance(LifecycleState::Running);
                None
            }
            Err(e) => {
                error!(
                    execution_id = %context.execution_id(),
                    connector_type = %connector.connector_type(),
                    error = %e,
                    "Connector initialization failed"
                );
                lifecycle.fail();
                let result = ConnectorResult::failure(
                    FailureKind::Lifecycle,
                    format!("initialize failed: {}", e.detail()),
                );
                Some(self.close(connector, context, lifecycle, result).await)
            }
        }
    }

    async fn prepare(
        &self,
        connector: &mut Connector,
        context: &ConnectorContext,
        lifecycle: &mut Lifecycle,
    ) -> Option<ConnectorResult> {
        if let Some(result) = self.validate(connector, context, lifecycle) {
            return Some(result);
        }
        self.initialize(connector, context, lifecycle).await
    }

    /// Bring both ends of a stream-to-sink pipe up to `RUNNING`. Both
    /// configurations are validated before either connector is initialized.
    async fn prepare_pipe(
        &self,
        source: &mut Connector,
        context: &ConnectorContext,
        lifecycle: &mut Lifecycle,
        mut sink: Connector,
        sink_context: ConnectorContext,
    ) -> std::result::Result<SinkStage, ConnectorResult> {
        let mut sink_lifecycle = Lifecycle::new(sink_context.execution_id());
        if sink.kind() != ConnectorKind::StreamSink {
            lifecycle.fail();
            sink_lifecycle.fail();
            return Err(mode_mismatch(&sink, ConnectorKind::StreamSink));
        }
        if let Some(result) = self.validate(source, context, lifecycle) {
            return Err(result);
        }
        if let Some(result) = self.validate(&sink, &sink_context, &mut sink_lifecycle) {
            lifecycle.fail();
            return Err(result);
        }
        if let Some(result) = self.initialize(source, context, lifecycle).await {
            return Err(result);
        }
        if let Some(result) = self.initialize(&mut sink, &sink_context, &mut sink_lifecycle).await {
            lifecycle.fail();
            return Err(self.close(source, context, lifecycle, result).await);
        }
        let writer = match self.create_writer(&mut sink, &sink_context).await {
            Ok(writer) => writer,
            Err(e) => {
                sink_lifecycle.fail();
                let result = ConnectorResult::failure(
                    FailureKind::Operation,
                    format!("failed to create writer: {}", e.detail()),
                );
                let result = self.close(&mut sink, &sink_context, &mut sink_lifecycle, result).await;
                lifecycle.fail();
                return Err(self.close(source, context, lifecycle, result).await);
            }
        };
        Ok(SinkStage::new(
            sink,
            sink_context,
            sink_lifecycle,
            writer,
            self.config.effective_sink_batch_size(),
        ))
    }

    fn operation_result(
        &self,
        outcome: Result<ConnectorResult>,
        is_read: bool,
        context: &ConnectorContext,
        lifecycle: &mut Lifecycle,
    ) -> ConnectorResult {
        let result = match outcome {
            Ok(mut result) => {
                result.normalize(is_read);
                result
            }
            Err(e) => {
                error!(execution_id = %context.execution_id(), error = %e, "Connector operation failed");
                ConnectorResult::from_error(FailureKind::Operation, &e)
            }
        };
        if !result.success {
            lifecycle.fail();
        }
        result
    }

    /// Leave `RUNNING` (or `FAILED`) through `close()`, folding a close
    /// failure into the result.
    async fn close(
        &self,
        connector: &mut Connector,
        context: &ConnectorContext,
        lifecycle: &mut Lifecycle,
        mut result: ConnectorResult,
    ) -> ConnectorResult {
        lifecycle.advance(LifecycleState::Closing);
        let closed = close_connector(connector, context).await;
        if let Err(e) = &closed {
            if result.success {
                result.fail_with(FailureKind::Lifecycle, format!("close failed: {}", e.detail()));
            }
        }
        lifecycle.finish(closed.is_ok() && result.success);
        result
    }

    async fn finish(
        &self,
        mut connector: Connector,
        context: &ConnectorContext,
        mut lifecycle: Lifecycle,
        result: ConnectorResult,
        started: Instant,
    ) -> ConnectorResult {
        let mut result = self.close(&mut connector, context, &mut lifecycle, result).await;
        if result.execution_time_millis == 0 {
            result.execution_time_millis = elapsed_ms(started);
        }
        info!(
            execution_id = %context.execution_id(),
            connector_type = %connector.connector_type(),
            success = result.success,
            records = result.records_processed,
            state = %lifecycle.state(),
            "Invocation finished: {}",
            result.message
        );
        result
    }
}

/// Resolve a stream handle that never reached `start_stream`.
fn resolve_early(
    shared: &SessionShared,
    lifecycle: Lifecycle,
    done: oneshot::Sender<ConnectorResult>,
    result: ConnectorResult,
    started: Instant,
) {
    shared.mark_terminated();
    shared.begin_finalize();
    shared.set_lifecycle(lifecycle);
    let _ = done.send(result.with_execution_time(elapsed_ms(started)));
}

impl Default for ConnectorEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
