use crate::{Connector, ConnectorFactory, ConnectorMetadata, Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct Registration {
    factory: Arc<dyn ConnectorFactory>,
    metadata: ConnectorMetadata,
}

/// Registry of connector factories, keyed by connector type.
///
/// Passed explicitly to whoever needs to resolve connector types.
pub struct Registry {
    connectors: HashMap<String, Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Register a connector factory. A later registration under the same
    /// name replaces the earlier one.
    pub fn register(&mut self, factory: Arc<dyn ConnectorFactory>) {
        let name = factory.name().to_string();
        let metadata = factory.metadata();
        debug!(connector_type = %name, version = %metadata.version, "Registered connector");
        self.connectors
            .insert(name, Registration { factory, metadata });
    }

    /// Get a connector factory by type
    pub fn get_factory(&self, name: &str) -> Result<Arc<dyn ConnectorFactory>> {
        self.connectors
            .get(name)
            .map(|r| r.factory.clone())
            .ok_or_else(|| Error::Configuration(format!("Connector type '{}' not found", name)))
    }

    /// Create a fresh connector instance of the given type
    pub fn create(&self, name: &str) -> Result<Connector> {
        self.get_factory(name)?.create()
    }

    pub fn metadata(&self, name: &str) -> Option<&ConnectorMetadata> {
        self.connectors.get(name).map(|r| &r.metadata)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.connectors.contains_key(name)
    }

    /// List all registered connector types, sorted
    pub fn list_connectors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connectors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
