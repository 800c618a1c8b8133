mod config;
mod connector;
mod context;
mod engine;
mod error;
mod factory;
mod guard;
mod lifecycle;
mod listener;
mod metadata;
mod record;
mod registry;
mod result;
mod session;
mod stream;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use connector::{
    Connector, ConnectorKind, DataConnector, DataSink, DataSource, DataStreamSink,
    DataStreamSource,
};
pub use context::{ConfigValue, ConnectorContext};
pub use engine::{ConnectorEngine, StreamHandle};
pub use error::{Error, Result};
pub use factory::ConnectorFactory;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use listener::StreamTarget;
pub use metadata::ConnectorMetadata;
pub use record::{record_from_value, record_to_value, Record};
pub use registry::Registry;
pub use result::{ConnectorResult, FailureKind};
pub use session::StreamCancelHandle;
pub use stream::{StreamCancellable, StreamObserver, StreamWriter};
