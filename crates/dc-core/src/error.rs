use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Operation error: {0}")]
    Operation(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Message without the category prefix, as a connector author wrote it.
    pub fn detail(&self) -> String {
        match self {
            Error::Configuration(msg)
            | Error::Lifecycle(msg)
            | Error::Operation(msg)
            | Error::Protocol(msg)
            | Error::Connection(msg)
            | Error::Cancelled(msg) => msg.clone(),
            Error::Timeout(ms) => format!("timed out after {}ms", ms),
            Error::Serialization(e) => e.to_string(),
            Error::Io(e) => e.to_string(),
            Error::Generic(e) => e.to_string(),
        }
    }
}
