use crate::{Error, Record};
use serde::{Deserialize, Serialize};

pub(crate) const UNSPECIFIED_FAILURE: &str = "connector reported failure without a message";

/// Category of a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// `validate_configuration` returned errors, or the connector does not
    /// support the requested mode.
    Configuration,
    /// `initialize` or `close` failed.
    Lifecycle,
    /// The read, write or stream production failed.
    Operation,
    /// The engine gave up waiting on a stream.
    Timeout,
}

/// Outcome of one connector invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorResult {
    pub success: bool,
    pub message: String,
    pub records_processed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Record>>,
    pub execution_time_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ConnectorResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            records_processed: 0,
            records: None,
            execution_time_millis: 0,
            failure: None,
        }
    }

    /// Failed result. An empty message is replaced so a failure is never silent.
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = UNSPECIFIED_FAILURE.to_string();
        }
        Self {
            success: false,
            message,
            records_processed: 0,
            records: None,
            execution_time_millis: 0,
            failure: Some(kind),
        }
    }

    /// Failed result from an error, keeping only the error's own message.
    pub fn from_error(kind: FailureKind, error: &Error) -> Self {
        Self::failure(kind, error.detail())
    }

    /// Attach records and set the processed count to match.
    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records_processed = records.len();
        self.records = Some(records);
        self
    }

    pub fn with_records_processed(mut self, count: usize) -> Self {
        self.records_processed = count;
        self
    }

    pub fn with_execution_time(mut self, millis: u64) -> Self {
        self.execution_time_millis = millis;
        self
    }

    pub fn is_failure(&self, kind: FailureKind) -> bool {
        self.failure == Some(kind)
    }

    /// Turn a successful result into a failed one, keeping its records and count.
    pub(crate) fn fail_with(&mut self, kind: FailureKind, message: impl Into<String>) {
        let message = message.into();
        self.success = false;
        self.failure = Some(kind);
        self.message = if message.trim().is_empty() {
            UNSPECIFIED_FAILURE.to_string()
        } else {
            message
        };
    }

    /// Repair what a connector-built result may have left inconsistent.
    pub(crate) fn normalize(&mut self, is_read: bool) {
        if is_read {
            if let Some(records) = &self.records {
                if records.len() != self.records_processed {
                    tracing::warn!(
                        reported = self.records_processed,
                        actual = records.len(),
                        "Connector result count does not match its records, using record count"
                    );
                    self.records_processed = records.len();
                }
            }
        }
        if !self.success {
            if self.message.trim().is_empty() {
                self.message = UNSPECIFIED_FAILURE.to_string();
            }
            if self.failure.is_none() {
                self.failure = Some(FailureKind::Operation);
            }
        }
    }
}
