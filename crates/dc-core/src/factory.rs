use crate::{Connector, ConnectorMetadata, Result};

/// Factory trait for creating connectors
pub trait ConnectorFactory: Send + Sync {
    /// Get the type identifier for this connector
    fn name(&self) -> &str;

    /// Static description, captured once at registration
    fn metadata(&self) -> ConnectorMetadata;

    /// Create a new connector instance for one invocation
    fn create(&self) -> Result<Connector>;
}
