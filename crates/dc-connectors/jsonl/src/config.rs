use dc_core::{record_from_value, record_to_value, ConnectorContext, Error, Record, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlConfig {
    /// File to read from or write to
    pub path: PathBuf,

    /// Append to an existing file instead of truncating it (writers only)
    #[serde(default)]
    pub append: bool,

    /// Pause between records, in milliseconds (stream reader only)
    #[serde(default)]
    pub delay_ms: u64,
}

impl JsonlConfig {
    pub fn from_context(context: &ConnectorContext) -> Result<Self> {
        let value = Value::Object(
            context
                .configuration()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        serde_json::from_value(value)
            .map_err(|e| Error::Configuration(format!("invalid jsonl configuration: {}", e)))
    }

    pub fn validate(context: &ConnectorContext) -> Vec<String> {
        let mut errors = Vec::new();
        match context.get_value("path") {
            None => errors.push("'path' is required".to_string()),
            Some(Value::String(path)) if path.trim().is_empty() => {
                errors.push("'path' must not be empty".to_string())
            }
            Some(Value::String(_)) => {}
            Some(_) => errors.push("'path' must be a string".to_string()),
        }
        if let Some(append) = context.get_value("append") {
            if !append.is_boolean() {
                errors.push("'append' must be a boolean".to_string());
            }
        }
        if let Some(delay) = context.get_value("delay_ms") {
            if delay.as_u64().is_none() {
                errors.push("'delay_ms' must be a non-negative integer".to_string());
            }
        }
        errors
    }

    pub(crate) async fn open_for_write(&self) -> Result<File> {
        let mut options = OpenOptions::new();
        options.create(true);
        if self.append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        Ok(options.open(&self.path).await?)
    }
}

/// Parse one line of a JSON lines file. Blank lines yield `None`.
pub(crate) fn parse_line(line: &str, line_no: usize) -> Result<Option<Record>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(line)
        .map_err(|e| Error::Operation(format!("line {}: {}", line_no, e)))?;
    record_from_value(value)
        .map(Some)
        .map_err(|e| Error::Operation(format!("line {}: {}", line_no, e.detail())))
}

pub(crate) fn encode_line(record: &Record) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(&record_to_value(record))?;
    line.push(b'\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_requires_path() {
        let context = ConnectorContext::new("t");
        assert_eq!(JsonlConfig::validate(&context), vec!["'path' is required"]);

        let context = ConnectorContext::new("t").with_config("path", 42);
        assert_eq!(JsonlConfig::validate(&context), vec!["'path' must be a string"]);

        let context = ConnectorContext::new("t").with_config("path", "  ");
        assert_eq!(JsonlConfig::validate(&context), vec!["'path' must not be empty"]);
    }

    #[test]
    fn test_validate_optional_keys() {
        let context = ConnectorContext::new("t")
            .with_config("path", "/tmp/x.jsonl")
            .with_config("append", "yes")
            .with_config("delay_ms", -1);
        assert_eq!(JsonlConfig::validate(&context).len(), 2);

        let context = ConnectorContext::new("t")
            .with_config("path", "/tmp/x.jsonl")
            .with_config("append", true)
            .with_config("delay_ms", 5);
        assert!(JsonlConfig::validate(&context).is_empty());
    }

    #[test]
    fn test_from_context() {
        let context = ConnectorContext::new("t")
            .with_config("path", "/tmp/x.jsonl")
            .with_config("unrelated", json!({"a": 1}));
        let config = JsonlConfig::from_context(&context).unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/x.jsonl"));
        assert!(!config.append);
        assert_eq!(config.delay_ms, 0);

        assert!(JsonlConfig::from_context(&ConnectorContext::new("t")).is_err());
    }

    #[test]
    fn test_parse_line() {
        assert!(parse_line("   ", 1).unwrap().is_none());

        let record = parse_line(r#"{"id": 7, "name": "a"}"#, 1).unwrap().unwrap();
        assert_eq!(record.get("id"), Some(&json!(7)));

        let err = parse_line("[1, 2]", 3).unwrap_err();
        assert!(err.detail().starts_with("line 3: "));
        assert!(parse_line("{not json", 4).is_err());
    }
}
