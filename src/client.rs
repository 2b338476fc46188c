use crate::config::StackdriverOptions;
use crate::metadata::MetadataProvider;
use crate::severity::Severity;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Resolves once a requested flush has been handed to the backend.
///
/// The sender side is dropped without a value if the client shuts down
/// first; callers can treat that as completion too.
pub type FlushAck = oneshot::Receiver<()>;

/// What an entry carries as its primary content.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain log message.
    Text(String),
    /// Structured report, e.g. an exception with its source chain.
    Structured(Value),
}

impl Payload {
    pub fn into_value(self) -> Value {
        match self {
            Payload::Text(text) => Value::String(text),
            Payload::Structured(value) => value,
        }
    }
}

/// Errors raised by a remote logging client.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport unavailable: {0}")]
    Transport(String),

    #[error("remote rejected entries with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("failed to serialize entries: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("entry queue is full, dropping entry")]
    QueueFull,

    #[error("entry queue is closed")]
    Closed,
}

impl ClientError {
    /// Whether a failure while *building* a client should downgrade the
    /// writer to a no-op instead of failing the host.
    pub fn disables_writer(&self) -> bool {
        matches!(self, ClientError::Auth(_) | ClientError::Transport(_))
    }
}

#[cfg(feature = "cloud-logging")]
impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e.to_string())
    }
}

/// A batched remote logger. `log` must not block on network I/O; batching
/// and delivery are the implementation's business.
pub trait BatchLogger: Send + Sync {
    fn log(
        &self,
        severity: Severity,
        payload: Payload,
        context: Map<String, Value>,
    ) -> Result<(), ClientError>;

    /// Ask the client to deliver everything buffered so far without waiting
    /// for its next batch boundary. Must not block.
    ///
    /// **Returns**
    /// - `Ok(Some(ack))` if delivery happens in the background; `ack`
    ///   resolves when it is done.
    /// - `Ok(None)` if nothing is buffered or delivery already happened.
    fn flush(&self) -> Result<Option<FlushAck>, ClientError> {
        Ok(None)
    }
}

/// Constructs the remote client for a writer.
///
/// The writer passes itself as `metadata` so the client can query resource
/// and label information when entries are built.
pub trait ClientBuilder {
    fn build(
        &self,
        options: &StackdriverOptions,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Result<Box<dyn BatchLogger>, ClientError>;
}

impl<F> ClientBuilder for F
where
    F: Fn(&StackdriverOptions, Arc<dyn MetadataProvider>) -> Result<Box<dyn BatchLogger>, ClientError>,
{
    fn build(
        &self,
        options: &StackdriverOptions,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Result<Box<dyn BatchLogger>, ClientError> {
        self(options, metadata)
    }
}
