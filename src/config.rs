//! Configuration tree for the logging component.
//!
//! [`default_config`] and [`dependency_config`] are the component's built-in
//! defaults: one stdout stream writer, and the table that maps writer
//! service names onto the writer implementations this crate provides.
//! Hosts typically deserialize their own `log` block with
//! [`LogConfig::from_json_str`] and hand it to [`crate::init::build_logger`].

use crate::stream::{DEFAULT_DATE_TIME_FORMAT, DEFAULT_FORMAT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Key of the writer block read by the Stackdriver writer.
pub const STACKDRIVER_WRITER_KEY: &str = "stackdriver";

/// Error type returned when reading or interpreting configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse log configuration: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("writer `{0}` is not configured")]
    MissingWriter(String),

    #[error("invalid options for writer `{writer}`: {source}")]
    InvalidOptions {
        writer: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no writer implementation registered under `{0}`")]
    UnknownWriter(String),

    #[error("unsupported stream target `{0}`")]
    UnknownStream(String),
}

/// The `log` section of a host application's configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub writers: BTreeMap<String, WriterConfig>,
}

impl LogConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(ConfigError::Parse)
    }

    pub fn writer(&self, key: &str) -> Result<&WriterConfig, ConfigError> {
        self.writers
            .get(key)
            .ok_or_else(|| ConfigError::MissingWriter(key.to_string()))
    }

    /// Typed options of the `stackdriver` writer block.
    pub fn stackdriver_options(&self) -> Result<StackdriverOptions, ConfigError> {
        self.writer(STACKDRIVER_WRITER_KEY)?
            .options_as(STACKDRIVER_WRITER_KEY)
    }
}

/// One entry of `log.writers`: the writer service name plus its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    pub name: String,
    #[serde(default)]
    pub options: Value,
}

impl WriterConfig {
    /// Deserialize `options` into the shape a particular writer expects.
    pub fn options_as<T: DeserializeOwned>(&self, writer: &str) -> Result<T, ConfigError> {
        let options = if self.options.is_null() {
            json!({})
        } else {
            self.options.clone()
        };
        serde_json::from_value(options).map_err(|source| ConfigError::InvalidOptions {
            writer: writer.to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// `stdout` or `stderr`.
    #[serde(default = "default_stream")]
    pub stream: String,
    #[serde(default)]
    pub formatter: Option<FormatterConfig>,
}

fn default_stream() -> String {
    "stdout".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatterConfig {
    pub name: String,
    #[serde(default)]
    pub options: SimpleFormatterOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleFormatterOptions {
    #[serde(default = "default_format")]
    pub format: String,
    /// `chrono` strftime pattern.
    #[serde(default = "default_date_time_format")]
    pub date_time_format: String,
}

impl Default for SimpleFormatterOptions {
    fn default() -> Self {
        Self {
            format: default_format(),
            date_time_format: default_date_time_format(),
        }
    }
}

fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

fn default_date_time_format() -> String {
    DEFAULT_DATE_TIME_FORMAT.to_string()
}

/// Options of the Stackdriver writer: target log, project and the options
/// handed through to the remote client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackdriverOptions {
    pub log_name: String,
    pub project_id: String,
    /// OAuth2 bearer token used for `entries:write`.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Override of the Cloud Logging API base URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub flush_interval_ms: Option<u64>,
    #[serde(default)]
    pub channel_buffer: Option<usize>,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Writer implementations that configuration names can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterKind {
    Stream,
    Stackdriver,
    Noop,
}

/// Service-name table used when building writers from configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyConfig {
    /// Legacy names mapped onto their canonical service name.
    pub aliases: BTreeMap<String, String>,
    /// Canonical service names and the writer each one builds.
    pub factories: BTreeMap<String, WriterKind>,
    /// Name prefixes that build dynamically-named writers, e.g.
    /// `stackdriver.audit` builds a [`WriterKind::Stackdriver`].
    pub abstract_factories: Vec<(String, WriterKind)>,
}

impl DependencyConfig {
    pub fn resolve(&self, name: &str) -> Option<WriterKind> {
        let canonical = self.aliases.get(name).map(String::as_str).unwrap_or(name);

        if let Some(kind) = self.factories.get(canonical) {
            return Some(*kind);
        }

        self.abstract_factories
            .iter()
            .find(|(prefix, _)| canonical.starts_with(prefix.as_str()))
            .map(|(_, kind)| *kind)
    }
}

/// Both halves of the component's built-in configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvidedConfig {
    pub dependencies: DependencyConfig,
    pub log: LogConfig,
}

pub fn provide() -> ProvidedConfig {
    ProvidedConfig {
        dependencies: dependency_config(),
        log: default_config(),
    }
}

/// Default `log` section: a single `stdout` stream writer using the simple
/// formatter with millisecond timestamps.
pub fn default_config() -> LogConfig {
    let options = StreamOptions {
        stream: default_stream(),
        formatter: Some(FormatterConfig {
            name: "simple".to_string(),
            options: SimpleFormatterOptions::default(),
        }),
    };

    let mut writers = BTreeMap::new();
    writers.insert(
        "stdout".to_string(),
        WriterConfig {
            name: "stream".to_string(),
            // Serializing a plain struct of strings cannot fail.
            options: serde_json::to_value(options).unwrap_or(Value::Null),
        },
    );

    LogConfig { writers }
}

pub fn dependency_config() -> DependencyConfig {
    let aliases = [
        ("Stream", "stream"),
        ("Stackdriver", "stackdriver"),
        ("Noop", "noop"),
        ("stdout", "stream"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let factories = [
        ("stream", WriterKind::Stream),
        ("stackdriver", WriterKind::Stackdriver),
        ("noop", WriterKind::Noop),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let abstract_factories = vec![
        ("stream.".to_string(), WriterKind::Stream),
        ("stackdriver.".to_string(), WriterKind::Stackdriver),
    ];

    DependencyConfig {
        aliases,
        factories,
        abstract_factories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_single_stdout_stream_writer() {
        let config = default_config();
        assert_eq!(config.writers.len(), 1);

        let stdout = config.writer("stdout").unwrap();
        assert_eq!(stdout.name, "stream");

        let options: StreamOptions = stdout.options_as("stdout").unwrap();
        assert_eq!(options.stream, "stdout");
        let formatter = options.formatter.unwrap();
        assert_eq!(formatter.name, "simple");
        assert_eq!(formatter.options.date_time_format, "%Y-%m-%d %H:%M:%S%.3f");
        assert_eq!(formatter.options.format, DEFAULT_FORMAT);
    }

    #[test]
    fn resolve_follows_aliases_factories_and_prefixes() {
        let deps = dependency_config();
        assert_eq!(deps.resolve("stream"), Some(WriterKind::Stream));
        assert_eq!(deps.resolve("Stackdriver"), Some(WriterKind::Stackdriver));
        assert_eq!(deps.resolve("stdout"), Some(WriterKind::Stream));
        assert_eq!(deps.resolve("stackdriver.audit"), Some(WriterKind::Stackdriver));
        assert_eq!(deps.resolve("syslog"), None);
    }

    #[test]
    fn parses_stackdriver_block() {
        let raw = r#"{
            "writers": {
                "stackdriver": {
                    "name": "stackdriver",
                    "options": {
                        "logName": "app",
                        "projectId": "acme-prod",
                        "accessToken": "ya29.token",
                        "batchSize": 50
                    }
                }
            }
        }"#;

        let config = LogConfig::from_json_str(raw).unwrap();
        let options = config.stackdriver_options().unwrap();
        assert_eq!(options.log_name, "app");
        assert_eq!(options.project_id, "acme-prod");
        assert_eq!(options.access_token.as_deref(), Some("ya29.token"));
        assert_eq!(options.batch_size, Some(50));
        assert_eq!(options.endpoint, None);
    }

    #[test]
    fn missing_stackdriver_block_is_an_error() {
        let err = default_config().stackdriver_options().unwrap_err();
        assert!(matches!(err, ConfigError::MissingWriter(ref key) if key == "stackdriver"));
    }

    #[test]
    fn incomplete_stackdriver_options_are_rejected() {
        let raw = r#"{"writers": {"stackdriver": {"name": "stackdriver", "options": {"logName": "app"}}}}"#;
        let err = LogConfig::from_json_str(raw).unwrap().stackdriver_options().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOptions { .. }));
    }
}
