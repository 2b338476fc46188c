use crate::client::{ClientBuilder, ClientError};
use crate::config::{dependency_config, ConfigError, LogConfig, StackdriverOptions, StreamOptions, WriterKind};
use crate::env::ResourceEnv;
use crate::layer::WriterLayer;
use crate::logger::Logger;
use crate::noop_writer::NoopWriter;
use crate::stackdriver::{BuildError, RemoteWriter};
use crate::stream::StreamWriter;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the tracing integration.
///
/// **Fields**
/// - `min_level`: least severe `tracing` level forwarded to the writers.
/// - `enable_fmt`: if `true`, a `tracing_subscriber::fmt::Layer` is added
///   next to [`WriterLayer`], so every event (including this crate's own
///   diagnostics) is also printed to the console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub min_level: Level,
    pub enable_fmt: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            min_level: Level::INFO,
            enable_fmt: false,
        }
    }
}

/// Error type returned by [`init_tracing_with_config`].
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to install global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Remote writers built by [`build_logger`], keyed by their writer key.
///
/// The writers inside the [`Logger`] share state with these clones, so
/// calling [`RemoteWriter::set_request`] here affects subsequent entries.
#[derive(Clone, Default)]
pub struct LogHandle {
    remote: BTreeMap<String, RemoteWriter>,
}

impl LogHandle {
    pub fn remote(&self, key: &str) -> Option<&RemoteWriter> {
        self.remote.get(key)
    }

    /// The writer configured under `log.writers.stackdriver`.
    pub fn stackdriver(&self) -> Option<&RemoteWriter> {
        self.remote(crate::config::STACKDRIVER_WRITER_KEY)
    }

    /// Deliver every entry the remote writers have buffered and wait until
    /// the backends have been handed them. Call before the process exits.
    ///
    /// Every writer is asked before any is awaited; the first request error
    /// is returned after the others have been flushed.
    pub async fn flush(&self) -> Result<(), ClientError> {
        let mut acks = Vec::new();
        let mut first_error = None;
        for remote in self.remote.values() {
            match remote.request_flush() {
                Ok(Some(ack)) => acks.push(ack),
                Ok(None) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        for ack in acks {
            // A dropped sender means the client already shut down and flushed.
            let _ = ack.await;
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Build a [`Logger`] holding one writer per entry of `config.writers`.
///
/// Writer names are resolved through [`dependency_config`]. Remote writers
/// whose client cannot be built are added in their disabled form.
pub fn build_logger(
    config: &LogConfig,
    env: &ResourceEnv,
    builder: &dyn ClientBuilder,
) -> Result<(Logger, LogHandle), BuildError> {
    let dependencies = dependency_config();
    let mut logger = Logger::new();
    let mut handle = LogHandle::default();

    for (key, writer) in &config.writers {
        let kind = dependencies
            .resolve(&writer.name)
            .ok_or_else(|| ConfigError::UnknownWriter(writer.name.clone()))?;

        match kind {
            WriterKind::Stream => {
                let options: StreamOptions = writer.options_as(key)?;
                logger.add_writer(key.clone(), StreamWriter::from_options(&options)?);
            }
            WriterKind::Stackdriver => {
                let options: StackdriverOptions = writer.options_as(key)?;
                let remote = RemoteWriter::from_options(&options, env.clone(), builder)?;
                handle.remote.insert(key.clone(), remote.clone());
                logger.add_writer(key.clone(), remote);
            }
            WriterKind::Noop => logger.add_writer(key.clone(), NoopWriter),
        }

        tracing::debug!(writer = %key, ?kind, "log writer configured");
    }

    Ok((logger, handle))
}

/// Build the writers from `config` and install them as the global `tracing`
/// subscriber.
///
/// **Effects**
///
/// This installs a [`Registry`] combined with [`WriterLayer`] (and the
/// `fmt` layer if enabled) as the global default subscriber, so every
/// `tracing` event in the process is offered to the configured writers.
pub fn init_tracing_with_config(
    config: &LogConfig,
    env: &ResourceEnv,
    builder: &dyn ClientBuilder,
    layer_config: LayerConfig,
) -> Result<LogHandle, InitError> {
    let (logger, handle) = build_logger(config, env, builder)?;
    let layer = WriterLayer::new(Arc::new(Mutex::new(logger)), layer_config.min_level);

    // The two variants differ in type, so each is installed separately.
    if layer_config.enable_fmt {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(handle)
}

/// Initialize tracing with the Cloud Logging client and default
/// [`LayerConfig`].
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`CloudLoggingBuilder`](crate::cloud_logging::CloudLoggingBuilder).
/// Must be called from within a Tokio runtime for the Stackdriver writer
/// to be active.
#[cfg(feature = "cloud-logging")]
pub fn init_tracing(config: &LogConfig, env: &ResourceEnv) -> Result<LogHandle, InitError> {
    init_tracing_with_config(
        config,
        env,
        &crate::cloud_logging::CloudLoggingBuilder,
        LayerConfig::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchClient, BatchConfig, EntrySink, LogEntry};
    use crate::client::BatchLogger;
    use crate::event::{LogEvent, Priority};
    use crate::config::{default_config, WriterConfig};
    use crate::metadata::MetadataProvider;
    use serde_json::json;

    fn unavailable(
        _: &StackdriverOptions,
        _: Arc<dyn MetadataProvider>,
    ) -> Result<Box<dyn BatchLogger>, ClientError> {
        Err(ClientError::Transport("offline".into()))
    }

    #[test]
    fn default_config_builds_stdout_writer() {
        let (logger, handle) = build_logger(&default_config(), &ResourceEnv::default(), &unavailable).unwrap();
        assert_eq!(logger.writer_names().collect::<Vec<_>>(), ["stdout"]);
        assert!(handle.stackdriver().is_none());
    }

    #[test]
    fn stackdriver_writer_degrades_and_is_exposed() {
        let mut config = default_config();
        config.writers.insert(
            "stackdriver".into(),
            WriterConfig {
                name: "Stackdriver".into(),
                options: json!({"logName": "app", "projectId": "acme-prod"}),
            },
        );

        let (logger, handle) = build_logger(&config, &ResourceEnv::default(), &unavailable).unwrap();

        assert_eq!(logger.writer_names().count(), 2);
        assert!(!handle.stackdriver().unwrap().is_active());
    }

    #[derive(Default)]
    struct MemorySink(Mutex<Vec<LogEntry>>);

    #[async_trait::async_trait]
    impl EntrySink for MemorySink {
        async fn write_entries(&self, entries: &[LogEntry]) -> Result<(), ClientError> {
            self.0.lock().unwrap().extend_from_slice(entries);
            Ok(())
        }
    }

    fn slow_batches(sink: Arc<MemorySink>) -> impl ClientBuilder {
        move |options: &StackdriverOptions, metadata: Arc<dyn MetadataProvider>| -> Result<Box<dyn BatchLogger>, ClientError> {
            let config = BatchConfig {
                flush_interval: std::time::Duration::from_secs(30),
                ..BatchConfig::default()
            };
            let (client, _flusher) =
                BatchClient::spawn(Arc::clone(&sink) as Arc<dyn EntrySink>, &options.log_name, metadata, config)?;
            Ok(Box::new(client))
        }
    }

    fn stackdriver_only() -> LogConfig {
        let mut config = LogConfig::default();
        config.writers.insert(
            "stackdriver".into(),
            WriterConfig {
                name: "stackdriver".into(),
                options: json!({"logName": "app", "projectId": "acme-prod"}),
            },
        );
        config
    }

    #[tokio::test]
    async fn handle_flush_delivers_buffered_entries() {
        let sink = Arc::new(MemorySink::default());
        let builder = slow_batches(Arc::clone(&sink));
        let (mut logger, handle) = build_logger(&stackdriver_only(), &ResourceEnv::default(), &builder).unwrap();

        logger.log(&LogEvent::new(Priority::Err, "last words")).unwrap();
        handle.flush().await.unwrap();

        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn logger_flush_hands_buffer_to_backend() {
        let sink = Arc::new(MemorySink::default());
        let builder = slow_batches(Arc::clone(&sink));
        let (mut logger, _handle) = build_logger(&stackdriver_only(), &ResourceEnv::default(), &builder).unwrap();

        logger.log(&LogEvent::new(Priority::Err, "last words")).unwrap();
        logger.flush().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn handle_flush_without_remote_writers_is_immediate() {
        let (_logger, handle) = build_logger(&default_config(), &ResourceEnv::default(), &unavailable).unwrap();
        handle.flush().await.unwrap();
    }

    #[test]
    fn unknown_writer_names_are_rejected() {
        let mut config = LogConfig::default();
        config.writers.insert(
            "syslog".into(),
            WriterConfig { name: "syslog".into(), options: json!(null) },
        );

        let err = build_logger(&config, &ResourceEnv::default(), &unavailable).err().unwrap();
        assert!(matches!(err, BuildError::Config(ConfigError::UnknownWriter(_))));
    }
}
