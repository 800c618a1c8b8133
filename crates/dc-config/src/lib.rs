use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use dc_core::EngineConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON formatted logs
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Prefix of environment overrides, e.g. `DC__ENGINE__SINK_BATCH_SIZE=50`
pub const ENV_PREFIX: &str = "DC";

const CONFIG_FILE: &str = "default.yaml";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Built-in defaults, then `<config_dir>/default.yaml` if present, then
    /// `DC__` environment variables. The merged result is checked before it
    /// is returned.
    pub fn load(config_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = config_dir.as_ref().join(CONFIG_FILE);
        let merged = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(file.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("reading {}", file.display()))?;

        let app: Self = merged.try_deserialize()?;
        app.check()?;
        Ok(app)
    }

    /// Read a single YAML file, without defaults layering or environment.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let app: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        app.check()?;
        Ok(app)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Problems with the merged settings; empty when usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }
        if self.engine.sink_batch_size == 0 {
            errors.push("engine.sink_batch_size must be at least 1".to_string());
        }
        if self.engine.stream_timeout_ms == Some(0) {
            errors.push("engine.stream_timeout_ms must be positive when set".to_string());
        }
        errors
    }

    fn check(&self) -> anyhow::Result<()> {
        let errors = self.validate();
        if !errors.is_empty() {
            bail!("invalid configuration: {}", errors.join("; "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dc-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.sink_batch_size, 100);
        assert_eq!(config.engine.stream_timeout_ms, None);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = scratch_dir();
        let config = AppConfig::load(&dir).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_load_reads_default_yaml() {
        let dir = scratch_dir();
        std::fs::write(
            dir.join("default.yaml"),
            "engine:\n  stream_timeout_ms: 2500\n  sink_batch_size: 10\nlogging:\n  level: debug\n  json: true\n",
        )
        .unwrap();

        let config = AppConfig::load(&dir).unwrap();
        assert_eq!(config.engine.stream_timeout_ms, Some(2500));
        assert_eq!(config.engine.sink_batch_size, 10);
        assert_eq!(config.engine.max_collected_records, None);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let dir = scratch_dir();
        std::fs::write(
            dir.join("default.yaml"),
            "engine:\n  sink_batch_size: 0\nlogging:\n  level: loud\n",
        )
        .unwrap();

        let err = AppConfig::load(&dir).unwrap_err().to_string();
        assert!(err.contains("logging.level 'loud'"), "{}", err);
        assert!(err.contains("sink_batch_size"), "{}", err);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_validate_defaults_is_clean() {
        assert!(AppConfig::default().validate().is_empty());

        let mut config = AppConfig::default();
        config.engine.stream_timeout_ms = Some(0);
        assert_eq!(config.validate().len(), 1);
    }

    #[test]
    fn test_file_roundtrip_keeps_partial_sections() {
        let dir = scratch_dir();
        let path = dir.join("app.yaml");
        std::fs::write(&path, "engine:\n  max_collected_records: 5\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.engine.max_collected_records, Some(5));
        assert_eq!(config.engine.sink_batch_size, 100);
        assert_eq!(config.logging, LoggingConfig::default());

        config.to_file(&path).unwrap();
        assert_eq!(AppConfig::from_file(&path).unwrap(), config);
        std::fs::remove_dir_all(dir).ok();
    }
}
