//! Writer that forwards events to a batched Cloud Logging client.
//!
//! The writer translates a [`LogEvent`] into Cloud Logging terms: the
//! priority name becomes a [`Severity`], `extra.file`/`extra.line`/
//! `extra.trace` become a [`ReportLocation`] so Error Reporting can group
//! entries, and an `extra.xdebug` exception payload replaces the message.
//! The writer is also the client's [`MetadataProvider`], supplying the
//! monitored resource and per-request labels.

use crate::client::{BatchLogger, ClientBuilder, ClientError, FlushAck, Payload};
use crate::config::{ConfigError, LogConfig, StackdriverOptions};
use crate::env::ResourceEnv;
use crate::event::{FieldValue, LogEvent};
use crate::metadata::{generic_task, Labels, MetadataProvider, MonitoredResource};
use crate::noop_writer::NoopWriter;
use crate::report::{function_name_for_report, ReportLocation, NO_FUNCTION};
use crate::request::InboundRequest;
use crate::severity::Severity;
use crate::transcode::utfize_map;
use crate::writer::{WriteError, Writer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Label under which [`StackdriverWriter::set_request`] stores the trace id.
pub const TRACE_ID_LABEL: &str = "appengine.googleapis.com/trace_id";

/// `extra` key holding the payload of a message-queue request.
pub const QUEUE_REQUEST_EXTRA: &str = "amqpRequest";

/// Error type returned when building a remote writer from configuration.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build remote logging client: {0}")]
    Client(#[from] ClientError),
}

/// State shared between the writer, its clones and the remote client.
#[derive(Debug)]
pub struct StackdriverMetadata {
    project_id: String,
    env: ResourceEnv,
    labels: Mutex<Labels>,
}

impl StackdriverMetadata {
    pub fn new(project_id: impl Into<String>, env: ResourceEnv) -> Self {
        Self {
            project_id: project_id.into(),
            env,
            labels: Mutex::new(Labels::new()),
        }
    }

    fn set_labels(&self, labels: Labels) {
        *lock(&self.labels) = labels;
    }
}

impl MetadataProvider for StackdriverMetadata {
    fn monitored_resource(&self) -> MonitoredResource {
        generic_task(&self.project_id, &self.env)
    }

    fn project_id(&self) -> String {
        self.project_id.clone()
    }

    fn service_id(&self) -> String {
        self.env.host_name.clone()
    }

    fn labels(&self) -> Labels {
        lock(&self.labels).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Active Stackdriver writer.
///
/// Clones share labels, always-included extras and the client, so an
/// application can keep one clone to call [`set_request`](Self::set_request)
/// while another sits inside the [`crate::logger::Logger`].
#[derive(Clone)]
pub struct StackdriverWriter {
    client: Arc<dyn BatchLogger>,
    metadata: Arc<StackdriverMetadata>,
    always_extra: Arc<Mutex<BTreeMap<String, FieldValue>>>,
}

impl StackdriverWriter {
    /// Build the writer and its remote client.
    ///
    /// **Parameters**
    /// - `options`: the `stackdriver` writer options (log name, project id,
    ///   client options).
    /// - `env`: startup snapshot used for the monitored resource.
    /// - `builder`: constructs the batched client; receives the writer's
    ///   metadata provider.
    pub fn new(
        options: &StackdriverOptions,
        env: ResourceEnv,
        builder: &dyn ClientBuilder,
    ) -> Result<Self, ClientError> {
        let metadata = Arc::new(StackdriverMetadata::new(options.project_id.clone(), env));
        let client = builder.build(options, Arc::clone(&metadata) as Arc<dyn MetadataProvider>)?;

        Ok(Self {
            client: Arc::from(client),
            metadata,
            always_extra: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    /// Enrich subsequent entries with information about `request`.
    ///
    /// A queue message's payload is included in every later entry under
    /// `amqpRequest`. A fresh trace id replaces the current labels and is
    /// returned so the caller can hand it back (e.g. as a response header).
    pub fn set_request(&self, request: &dyn InboundRequest) -> String {
        if let Some(payload) = request.queue_payload() {
            lock(&self.always_extra).insert(
                QUEUE_REQUEST_EXTRA.to_string(),
                FieldValue::from(Value::Object(payload)),
            );
        }

        let trace_id = Uuid::new_v4().to_string();
        let mut labels = Labels::new();
        labels.insert(TRACE_ID_LABEL.to_string(), trace_id.clone());
        self.set_labels(labels);
        trace_id
    }

    pub fn set_labels(&self, labels: Labels) {
        self.metadata.set_labels(labels);
    }

    /// Translate one event into a client call.
    ///
    /// The context holds `reportLocation` first and then every `extra`
    /// field, so an `extra.reportLocation` replaces the constructed one.
    pub fn do_write(&self, event: &LogEvent) -> Result<(), ClientError> {
        let severity = Severity::from_priority_name(&event.priority_name);
        let extra = utfize_map(event.extra.clone());

        let mut location = ReportLocation {
            file_path: None,
            line_number: None,
            function_name: NO_FUNCTION.to_string(),
        };
        if let Some(file) = extra.get("file").filter(|f| !f.is_null()) {
            location.file_path = Some(file.clone());
            location.line_number = Some(extra.get("line").cloned().unwrap_or(Value::Null));
        }
        if let Some(Value::Array(frames)) = extra.get("trace") {
            location.function_name = function_name_for_report(Some(frames));
        }

        let mut context = Map::new();
        context.insert("reportLocation".to_string(), serde_json::to_value(&location)?);

        let payload = match extra.get("xdebug").filter(|x| !x.is_null()) {
            Some(exception) => Payload::Structured(exception.clone()),
            None => Payload::Text(event.message.clone()),
        };

        context.extend(extra);
        self.client.log(severity, payload, context)
    }

    /// Ask the client to deliver what it has buffered; see
    /// [`BatchLogger::flush`].
    pub fn request_flush(&self) -> Result<Option<FlushAck>, ClientError> {
        self.client.flush()
    }
}

impl MetadataProvider for StackdriverWriter {
    fn monitored_resource(&self) -> MonitoredResource {
        self.metadata.monitored_resource()
    }

    fn project_id(&self) -> String {
        self.metadata.project_id()
    }

    fn service_id(&self) -> String {
        self.metadata.service_id()
    }

    fn labels(&self) -> Labels {
        self.metadata.labels()
    }
}

impl Writer for StackdriverWriter {
    fn write(&mut self, event: &LogEvent) -> Result<(), WriteError> {
        let always_extra = lock(&self.always_extra).clone();
        if always_extra.is_empty() {
            return Ok(self.do_write(event)?);
        }

        let mut event = event.clone();
        for (key, value) in always_extra {
            event.extra.entry(key).or_insert(value);
        }
        Ok(self.do_write(&event)?)
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        self.request_flush()?;
        Ok(())
    }
}

/// The Stackdriver writer as selected at construction time.
///
/// If the client cannot be built because of missing credentials or an
/// unavailable transport, the writer is [`RemoteWriter::Disabled`] for
/// its whole lifetime and silently drops events.
#[derive(Clone)]
pub enum RemoteWriter {
    Active(StackdriverWriter),
    Disabled(NoopWriter),
}

impl RemoteWriter {
    pub fn from_options(
        options: &StackdriverOptions,
        env: ResourceEnv,
        builder: &dyn ClientBuilder,
    ) -> Result<Self, ClientError> {
        match StackdriverWriter::new(options, env, builder) {
            Ok(writer) => Ok(RemoteWriter::Active(writer)),
            Err(e) if e.disables_writer() => {
                tracing::warn!(error = %e, log_name = %options.log_name, "stackdriver logging disabled");
                Ok(RemoteWriter::Disabled(NoopWriter))
            }
            Err(e) => Err(e),
        }
    }

    /// Build from the `log.writers.stackdriver` block of a [`LogConfig`].
    pub fn from_config(
        config: &LogConfig,
        env: ResourceEnv,
        builder: &dyn ClientBuilder,
    ) -> Result<Self, BuildError> {
        let options = config.stackdriver_options()?;
        Ok(Self::from_options(&options, env, builder)?)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RemoteWriter::Active(_))
    }

    /// See [`StackdriverWriter::set_request`]. A disabled writer still
    /// returns a fresh trace id.
    pub fn set_request(&self, request: &dyn InboundRequest) -> String {
        match self {
            RemoteWriter::Active(writer) => writer.set_request(request),
            RemoteWriter::Disabled(_) => Uuid::new_v4().to_string(),
        }
    }

    pub fn set_labels(&self, labels: Labels) {
        if let RemoteWriter::Active(writer) = self {
            writer.set_labels(labels);
        }
    }

    pub fn request_flush(&self) -> Result<Option<FlushAck>, ClientError> {
        match self {
            RemoteWriter::Active(writer) => writer.request_flush(),
            RemoteWriter::Disabled(_) => Ok(None),
        }
    }
}

impl Writer for RemoteWriter {
    fn write(&mut self, event: &LogEvent) -> Result<(), WriteError> {
        match self {
            RemoteWriter::Active(writer) => writer.write(event),
            RemoteWriter::Disabled(noop) => noop.write(event),
        }
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        match self {
            RemoteWriter::Active(writer) => writer.flush(),
            RemoteWriter::Disabled(noop) => noop.flush(),
        }
    }
}
