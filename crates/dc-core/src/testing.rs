//! Counting fakes for engine tests.

use crate::{
    ConnectorContext, ConnectorMetadata, ConnectorResult, DataConnector, DataSink, DataSource,
    DataStreamSink, DataStreamSource, Error, Record, Result, StreamCancellable, StreamObserver,
    StreamWriter,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn record(id: i64) -> Record {
    let mut record = Record::new();
    record.insert("id".to_string(), json!(id));
    record
}

pub fn records(n: i64) -> Vec<Record> {
    (1..=n).map(record).collect()
}

/// Shared, ordered log of every call a fake received.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    pub fn push(&self, call: &'static str) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| **c == call).count()
    }
}

#[derive(Clone, Default)]
pub struct Faults {
    pub validation_errors: Vec<String>,
    pub fail_initialize: bool,
    pub fail_operation: bool,
    pub panic_operation: bool,
    pub fail_close: bool,
}

impl Faults {
    pub fn invalid(error: &str) -> Self {
        Self {
            validation_errors: vec![error.to_string()],
            ..Default::default()
        }
    }
}

macro_rules! fake_base {
    ($ty:ty, $name:expr) => {
        #[async_trait]
        impl DataConnector for $ty {
            fn connector_type(&self) -> &str {
                $name
            }

            fn metadata(&self) -> ConnectorMetadata {
                ConnectorMetadata::new($name).with_version("0.0.1")
            }

            fn validate_configuration(&self, _context: &ConnectorContext) -> Vec<String> {
                self.log.push("validate");
                self.faults.validation_errors.clone()
            }

            async fn initialize(&mut self) -> Result<()> {
                self.log.push("initialize");
                if self.faults.fail_initialize {
                    return Err(Error::Connection("refused".to_string()));
                }
                Ok(())
            }

            async fn close(&mut self) -> Result<()> {
                self.log.push("close");
                if self.faults.fail_close {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "handle leaked",
                    )));
                }
                Ok(())
            }
        }
    };
}

pub struct FakeSource {
    log: CallLog,
    faults: Faults,
    result: Option<ConnectorResult>,
}

impl FakeSource {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            faults: Faults::default(),
            result: None,
        }
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Return this result from `read` instead of the default three records.
    pub fn returning(mut self, result: ConnectorResult) -> Self {
        self.result = Some(result);
        self
    }
}

fake_base!(FakeSource, "fake-source");

#[async_trait]
impl DataSource for FakeSource {
    async fn read(&mut self, _context: &ConnectorContext) -> Result<ConnectorResult> {
        self.log.push("read");
        if self.faults.panic_operation {
            panic!("read exploded");
        }
        if self.faults.fail_operation {
            return Err(Error::Operation("source unavailable".to_string()));
        }
        Ok(self
            .result
            .clone()
            .unwrap_or_else(|| ConnectorResult::success("read").with_records(records(3))))
    }
}

pub struct FakeSink {
    log: CallLog,
    faults: Faults,
    pub written: Arc<Mutex<Vec<Record>>>,
}

impl FakeSink {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            faults: Faults::default(),
            written: Arc::default(),
        }
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }
}

fake_base!(FakeSink, "fake-sink");

#[async_trait]
impl DataSink for FakeSink {
    async fn write(
        &mut self,
        _context: &ConnectorContext,
        records: Vec<Record>,
    ) -> Result<ConnectorResult> {
        self.log.push("write");
        if self.faults.fail_operation {
            return Err(Error::Operation("sink unavailable".to_string()));
        }
        let count = records.len();
        self.written.lock().unwrap().extend(records);
        Ok(ConnectorResult::success("written").with_records_processed(count))
    }
}

#[derive(Clone, Debug)]
pub enum Emit {
    Next(i64),
    Error(&'static str),
    Complete,
}

#[derive(Clone, Copy)]
pub enum Delivery {
    /// Emit everything from inside `start_stream`
    Inline,
    /// Emit from a spawned task, sleeping before each event
    Task(Duration),
    /// Emit from a plain OS thread, sleeping before each event
    Thread(Duration),
}

pub struct FakeStreamSource {
    log: CallLog,
    faults: Faults,
    script: Vec<Emit>,
    delivery: Delivery,
    honor_stop: bool,
    fail_start: bool,
    start_delay: Option<Duration>,
    hang_start: bool,
    pub stopped: Arc<AtomicBool>,
}

impl FakeStreamSource {
    pub fn new(log: CallLog, script: Vec<Emit>) -> Self {
        Self {
            log,
            faults: Faults::default(),
            script,
            delivery: Delivery::Inline,
            honor_stop: true,
            fail_start: false,
            start_delay: None,
            hang_start: false,
            stopped: Arc::default(),
        }
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    pub fn delivered_by(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Keep producing after `stop()`, like a connector that is slow to react
    pub fn ignoring_stop(mut self) -> Self {
        self.honor_stop = false;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Sleep inside `start_stream` after the script has been delivered
    pub fn slow_to_start(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Never return from `start_stream`
    pub fn hanging_start(mut self) -> Self {
        self.hang_start = true;
        self
    }
}

fn emit(observer: &dyn StreamObserver, event: &Emit) {
    match event {
        Emit::Next(id) => observer.on_next(record(*id)),
        Emit::Error(msg) => observer.on_error(Error::Operation(msg.to_string())),
        Emit::Complete => observer.on_complete(),
    }
}

fake_base!(FakeStreamSource, "fake-stream-source");

#[async_trait]
impl DataStreamSource for FakeStreamSource {
    async fn start_stream(
        &mut self,
        _context: &ConnectorContext,
        observer: Arc<dyn StreamObserver>,
    ) -> Result<Box<dyn StreamCancellable>> {
        self.log.push("start_stream");
        if self.faults.panic_operation {
            panic!("start exploded");
        }
        if self.fail_start {
            return Err(Error::Connection("no route to host".to_string()));
        }
        if self.hang_start {
            futures::future::pending::<()>().await;
        }

        let script = self.script.clone();
        let stopped = self.stopped.clone();
        let honor_stop = self.honor_stop;
        match self.delivery {
            Delivery::Inline => {
                for event in &script {
                    emit(observer.as_ref(), event);
                }
            }
            Delivery::Task(delay) => {
                let stopped = stopped.clone();
                tokio::spawn(async move {
                    for event in &script {
                        tokio::time::sleep(delay).await;
                        if honor_stop && stopped.load(Ordering::SeqCst) {
                            return;
                        }
                        emit(observer.as_ref(), event);
                    }
                });
            }
            Delivery::Thread(delay) => {
                let stopped = stopped.clone();
                std::thread::spawn(move || {
                    for event in &script {
                        std::thread::sleep(delay);
                        if honor_stop && stopped.load(Ordering::SeqCst) {
                            return;
                        }
                        emit(observer.as_ref(), event);
                    }
                });
            }
        }

        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }

        let log = self.log.clone();
        Ok(Box::new(move || {
            log.push("stop");
            stopped.store(true, Ordering::SeqCst);
        }))
    }
}

pub struct FakeStreamSink {
    log: CallLog,
    faults: Faults,
    fail_batch: Option<usize>,
    fail_writer_close: bool,
    pub batches: Arc<Mutex<Vec<usize>>>,
}

impl FakeStreamSink {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            faults: Faults::default(),
            fail_batch: None,
            fail_writer_close: false,
            batches: Arc::default(),
        }
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Fail the n-th `write_batch` call (zero based)
    pub fn failing_batch(mut self, n: usize) -> Self {
        self.fail_batch = Some(n);
        self
    }

    pub fn failing_writer_close(mut self) -> Self {
        self.fail_writer_close = true;
        self
    }
}

fake_base!(FakeStreamSink, "fake-stream-sink");

#[async_trait]
impl DataStreamSink for FakeStreamSink {
    async fn create_writer(&mut self, _context: &ConnectorContext) -> Result<Box<dyn StreamWriter>> {
        self.log.push("create_writer");
        if self.faults.fail_operation {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only volume",
            )));
        }
        Ok(Box::new(FakeWriter {
            log: self.log.clone(),
            fail_batch: self.fail_batch,
            fail_close: self.fail_writer_close,
            calls: 0,
            batches: self.batches.clone(),
        }))
    }
}

struct FakeWriter {
    log: CallLog,
    fail_batch: Option<usize>,
    fail_close: bool,
    calls: usize,
    batches: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl StreamWriter for FakeWriter {
    async fn write_batch(&mut self, records: Vec<Record>) -> Result<()> {
        self.log.push("write_batch");
        let call = self.calls;
        self.calls += 1;
        if self.fail_batch == Some(call) {
            return Err(Error::Operation("disk full".to_string()));
        }
        self.batches.lock().unwrap().push(records.len());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.push("writer_close");
        if self.fail_close {
            return Err(Error::Operation("flush failed".to_string()));
        }
        Ok(())
    }
}
