use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Per-invocation execution identity plus connector configuration.
///
/// The context is built by the caller, then handed to the engine which only
/// ever lends it out by shared reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorContext {
    execution_id: String,
    #[serde(default)]
    configuration: HashMap<String, Value>,
}

impl ConnectorContext {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            configuration: HashMap::new(),
        }
    }

    /// Context with a freshly generated execution id.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    pub fn with_configuration(mut self, configuration: HashMap<String, Value>) -> Self {
        self.configuration.extend(configuration);
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn configuration(&self) -> &HashMap<String, Value> {
        &self.configuration
    }

    /// Raw configuration value, whatever its type.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.configuration.get(key)
    }

    /// Typed lookup. Returns `None` when the key is missing or holds a
    /// value of another type; no coercion is attempted.
    pub fn get<T: ConfigValue>(&self, key: &str) -> Option<T> {
        self.configuration.get(key).and_then(T::from_config)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.configuration.contains_key(key)
    }
}

/// Types that can be read out of a configuration value without casting.
pub trait ConfigValue: Sized {
    fn from_config(value: &Value) -> Option<Self>;
}

impl ConfigValue for Value {
    fn from_config(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl ConfigValue for String {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl ConfigValue for bool {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl ConfigValue for i64 {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl ConfigValue for u64 {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

impl ConfigValue for f64 {
    // Integers are not floats: a stored `3` is absent when read as f64.
    fn from_config(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if n.is_f64() => n.as_f64(),
            _ => None,
        }
    }
}

impl ConfigValue for Vec<Value> {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_array().cloned()
    }
}

impl ConfigValue for Vec<String> {
    fn from_config(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect()
    }
}

impl ConfigValue for Map<String, Value> {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_object().cloned()
    }
}
