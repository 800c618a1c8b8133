//! Consumer side of a streaming invocation.
//!
//! The listener task owns the source connector once `start_stream` has
//! returned. It drains the session's event channel into the stream target,
//! and when the stream ends it finalizes the invocation: flush, close the
//! sink side, close the source, resolve the caller's handle.

use crate::engine::close_connector;
use crate::guard::{guarded, guarded_sync};
use crate::session::{CancelReason, SessionShared, StreamEvent};
use crate::{
    Connector, ConnectorContext, ConnectorResult, FailureKind, Lifecycle, LifecycleState, Record,
    StreamCancellable, StreamWriter,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Where the records of a stream go.
pub enum StreamTarget {
    /// Accumulate records into the result
    Collect,
    /// Hand each record to a channel; the result carries only the count.
    ///
    /// The listener waits on the channel, but the connector is never slowed
    /// down: records pile up in the session queue while the receiver lags.
    Forward(mpsc::Sender<Record>),
    /// Pipe records into a stream sink connector
    Sink {
        connector: Connector,
        context: ConnectorContext,
    },
}

/// A stream sink that has been validated, initialized and has a writer.
pub(crate) struct SinkStage {
    pub(crate) connector: Connector,
    pub(crate) context: ConnectorContext,
    pub(crate) lifecycle: Lifecycle,
    writer: Option<Box<dyn StreamWriter>>,
    buffer: Vec<Record>,
    batch_size: usize,
    written: usize,
}

impl SinkStage {
    pub(crate) fn new(
        connector: Connector,
        context: ConnectorContext,
        lifecycle: Lifecycle,
        writer: Box<dyn StreamWriter>,
        batch_size: usize,
    ) -> Self {
        Self {
            connector,
            context,
            lifecycle,
            writer: Some(writer),
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            written: 0,
        }
    }

    async fn push(&mut self, record: Record) -> Option<CancelReason> {
        self.buffer.push(record);
        if self.buffer.len() < self.batch_size {
            return None;
        }
        self.flush()
            .await
            .err()
            .map(CancelReason::SinkFailed)
    }

    async fn flush(&mut self) -> std::result::Result<(), String> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err("writer already closed".to_string());
        };
        let records = std::mem::take(&mut self.buffer);
        let count = records.len();
        match guarded(writer.write_batch(records)).await {
            Ok(()) => {
                self.written += count;
                debug!(execution_id = %self.context.execution_id(), count, "Wrote batch to stream sink");
                Ok(())
            }
            Err(e) => {
                error!(execution_id = %self.context.execution_id(), error = %e, "Stream sink write failed");
                Err(e.detail())
            }
        }
    }

    /// Flush what is buffered (unless told not to), close the writer and
    /// then the sink connector. Returns the first failure, if any.
    pub(crate) async fn finish(&mut self, flush: bool) -> Option<(FailureKind, String)> {
        let mut failure = None;
        if flush {
            if let Err(msg) = self.flush().await {
                failure = Some((FailureKind::Operation, format!("sink write failed: {}", msg)));
            }
        } else {
            self.buffer.clear();
        }

        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = guarded(writer.close()).await {
                error!(execution_id = %self.context.execution_id(), error = %e, "Stream writer close failed");
                failure.get_or_insert((
                    FailureKind::Lifecycle,
                    format!("writer close failed: {}", e.detail()),
                ));
            }
        }

        if failure.is_some() {
            self.lifecycle.fail();
        }
        self.lifecycle.advance(LifecycleState::Closing);
        let closed = close_connector(&mut self.connector, &self.context).await;
        self.lifecycle.finish(closed.is_ok());
        if let Err(e) = closed {
            failure.get_or_insert((
                FailureKind::Lifecycle,
                format!("sink close failed: {}", e.detail()),
            ));
        }
        failure
    }
}

pub(crate) enum Drain {
    Collect {
        records: Vec<Record>,
        limit: Option<usize>,
    },
    Forward {
        tx: mpsc::Sender<Record>,
        forwarded: usize,
    },
    Sink(Box<SinkStage>),
}

impl Drain {
    async fn accept(&mut self, record: Record) -> Option<CancelReason> {
        match self {
            Drain::Collect { records, limit } => {
                if let Some(limit) = *limit {
                    if records.len() >= limit {
                        return Some(CancelReason::Overflow(limit));
                    }
                }
                records.push(record);
                None
            }
            Drain::Forward { tx, forwarded } => match tx.send(record).await {
                Ok(()) => {
                    *forwarded += 1;
                    None
                }
                Err(_) => Some(CancelReason::DownstreamClosed),
            },
            Drain::Sink(stage) => stage.push(record).await,
        }
    }

    /// Release whatever the target holds and apply its count to `result`.
    async fn finish(&mut self, result: &mut ConnectorResult, flush: bool) {
        match self {
            Drain::Collect { records, .. } => {
                let records = std::mem::take(records);
                result.records_processed = records.len();
                result.records = Some(records);
            }
            Drain::Forward { forwarded, .. } => {
                result.records_processed = *forwarded;
            }
            Drain::Sink(stage) => {
                let failure = stage.finish(flush).await;
                result.records_processed = stage.written;
                if let Some((kind, msg)) = failure {
                    if result.success {
                        result.fail_with(kind, msg);
                    } else {
                        warn!(execution_id = %stage.context.execution_id(), "{}", msg);
                    }
                }
            }
        }
    }
}

enum Outcome {
    Completed,
    Failed(String),
    Cancelled(CancelReason),
}

enum Next {
    Event(Option<StreamEvent>),
    Deadline,
}

enum Accept {
    Done(Option<CancelReason>),
    Stalled,
}

pub(crate) struct Listener {
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) events: mpsc::UnboundedReceiver<StreamEvent>,
    pub(crate) source: Connector,
    pub(crate) context: ConnectorContext,
    pub(crate) cancellable: Box<dyn StreamCancellable>,
    pub(crate) drain: Drain,
    pub(crate) started: Instant,
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) done: oneshot::Sender<ConnectorResult>,
}

impl Listener {
    pub(crate) async fn run(mut self) {
        let outcome = self.drain_events().await;
        let elapsed = self.started.elapsed().as_millis() as u64;

        if !self.shared.begin_finalize() {
            debug!(execution_id = %self.shared.execution_id(), "Stream already finalized");
            return;
        }

        let mut result = match &outcome {
            Outcome::Completed => ConnectorResult::success("stream completed"),
            Outcome::Failed(msg) => ConnectorResult::failure(FailureKind::Operation, msg.clone()),
            Outcome::Cancelled(CancelReason::Caller) => ConnectorResult::success("stream cancelled"),
            Outcome::Cancelled(CancelReason::DownstreamClosed) => {
                ConnectorResult::success("stream cancelled, downstream receiver closed")
            }
            Outcome::Cancelled(CancelReason::Timeout(ms)) => ConnectorResult::failure(
                FailureKind::Timeout,
                format!("stream timed out after {}ms", ms),
            ),
            Outcome::Cancelled(CancelReason::Overflow(limit)) => ConnectorResult::failure(
                FailureKind::Operation,
                format!("stream exceeded the collect limit of {} records", limit),
            ),
            Outcome::Cancelled(CancelReason::SinkFailed(msg)) => ConnectorResult::failure(
                FailureKind::Operation,
                format!("sink write failed: {}", msg),
            ),
        };
        let sink_failed = matches!(outcome, Outcome::Cancelled(CancelReason::SinkFailed(_)));

        if !result.success {
            self.shared.with_lifecycle(|l| l.fail());
        }
        self.drain.finish(&mut result, !sink_failed).await;

        self.shared
            .with_lifecycle(|l| l.advance(LifecycleState::Closing));
        let closed = close_connector(&mut self.source, &self.context).await;
        if let Err(e) = &closed {
            if result.success {
                result.fail_with(FailureKind::Lifecycle, format!("close failed: {}", e.detail()));
            }
        }
        let clean = closed.is_ok() && result.success;
        self.shared.with_lifecycle(|l| l.finish(clean));

        result = result.with_execution_time(elapsed);
        info!(
            execution_id = %self.context.execution_id(),
            connector_type = %self.source.connector_type(),
            success = result.success,
            records = result.records_processed,
            elapsed_ms = elapsed,
            "Stream finished: {}",
            result.message
        );
        let _ = self.done.send(result);
    }

    async fn drain_events(&mut self) -> Outcome {
        let deadline = self
            .timeout_ms
            .map(|ms| tokio::time::Instant::from_std(self.started) + std::time::Duration::from_millis(ms));
        let mut deadline_armed = deadline.is_some();
        // Set once the target itself cannot take more records; records still
        // queued behind that point are not handed to it.
        let mut halted = false;
        // Target failure that lost the race against a terminal event
        let mut pending: Option<CancelReason> = None;

        loop {
            let next = match deadline {
                Some(at) if deadline_armed => {
                    tokio::select! {
                        event = self.events.recv() => Next::Event(event),
                        _ = tokio::time::sleep_until(at) => Next::Deadline,
                    }
                }
                _ => Next::Event(self.events.recv().await),
            };

            let event = match next {
                Next::Deadline => {
                    // Records accepted before the cancel are still queued
                    // ahead of the marker and reach the target.
                    deadline_armed = false;
                    self.cancel_for_timeout();
                    continue;
                }
                Next::Event(Some(event)) => event,
                Next::Event(None) => {
                    return Outcome::Failed("stream event channel closed unexpectedly".to_string())
                }
            };

            match event {
                StreamEvent::Record(record) => {
                    if halted {
                        continue;
                    }
                    let accepted = match deadline {
                        Some(at) => {
                            tokio::select! {
                                biased;
                                refused = self.drain.accept(record) => Accept::Done(refused),
                                _ = tokio::time::sleep_until(at) => Accept::Stalled,
                            }
                        }
                        None => Accept::Done(self.drain.accept(record).await),
                    };
                    let refused = match accepted {
                        Accept::Done(refused) => refused,
                        Accept::Stalled => {
                            let ms = self.timeout_ms.unwrap_or_default();
                            warn!(execution_id = %self.context.execution_id(), timeout_ms = ms, "Stream target stalled past the deadline");
                            deadline_armed = false;
                            Some(CancelReason::Timeout(ms))
                        }
                    };
                    if let Some(reason) = refused {
                        halted = true;
                        if !self.shared.cancel(reason.clone()) {
                            pending.get_or_insert(reason);
                        }
                    }
                }
                StreamEvent::Error(error) => {
                    warn!(execution_id = %self.context.execution_id(), error = %error, "Stream reported an error");
                    return match pending {
                        Some(reason) => Outcome::Cancelled(reason),
                        None => Outcome::Failed(error.detail()),
                    };
                }
                StreamEvent::Complete => {
                    return match pending {
                        Some(reason) => Outcome::Cancelled(reason),
                        None => Outcome::Completed,
                    };
                }
                StreamEvent::Cancelled(reason) => {
                    self.stop_producer();
                    return Outcome::Cancelled(reason);
                }
            }
        }
    }

    fn cancel_for_timeout(&self) {
        let ms = self.timeout_ms.unwrap_or_default();
        if self.shared.cancel(CancelReason::Timeout(ms)) {
            warn!(execution_id = %self.context.execution_id(), timeout_ms = ms, "Stream timed out");
        }
    }

    fn stop_producer(&self) {
        let cancellable = &self.cancellable;
        if let Err(e) = guarded_sync(|| cancellable.stop()) {
            error!(execution_id = %self.context.execution_id(), error = %e, "Stream source failed to stop");
        }
    }
}
