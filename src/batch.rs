use crate::client::{BatchLogger, ClientError, FlushAck, Payload};
use crate::config::StackdriverOptions;
use crate::metadata::{Labels, MetadataProvider, MonitoredResource};
use crate::severity::Severity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};
use tracing::Instrument;

/// One Cloud Logging entry, in the shape `entries:write` expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub log_name: String,
    pub resource: MonitoredResource,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    pub timestamp: DateTime<Utc>,
    pub json_payload: Map<String, Value>,
}

/// Transport used by [`BatchClient`] to deliver a batch of entries.
///
/// Implementations are called from the client's background task only.
#[async_trait]
pub trait EntrySink: Send + Sync {
    /// Deliver a batch.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted every entry.
    /// - `Err(..)` otherwise; the client retries the whole batch with
    ///   backoff before giving up on it.
    async fn write_entries(&self, entries: &[LogEntry]) -> Result<(), ClientError>;
}

/// Buffering and retry settings of a [`BatchClient`].
#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            max_retries: 5,
        }
    }
}

impl BatchConfig {
    /// Defaults overridden by whatever the writer options specify.
    pub fn from_options(options: &StackdriverOptions) -> Self {
        let defaults = Self::default();
        Self {
            channel_buffer: options.channel_buffer.unwrap_or(defaults.channel_buffer),
            batch_size: options.batch_size.unwrap_or(defaults.batch_size),
            flush_interval: options
                .flush_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            max_retries: options.max_retries.unwrap_or(defaults.max_retries),
        }
    }
}

/// Entry as queued by [`BatchClient::log`]; the resource is attached when
/// the batch is flushed.
#[derive(Debug)]
struct QueuedEntry {
    severity: Severity,
    labels: Labels,
    timestamp: DateTime<Utc>,
    json_payload: Map<String, Value>,
}

/// What travels over the client's channel. A flush request is ordered
/// after every entry queued before it.
#[derive(Debug)]
enum Queued {
    Entry(QueuedEntry),
    Flush(oneshot::Sender<()>),
}

/// Batched remote logger.
///
/// `log` only enqueues into a bounded channel; a background task drains
/// it and hands batches to an [`EntrySink`], flushing when a batch is full
/// or the flush interval elapses, and on demand through
/// [`BatchLogger::flush`]. When every clone of the client has been dropped
/// the task flushes what is left and exits.
#[derive(Clone)]
pub struct BatchClient {
    sender: mpsc::Sender<Queued>,
    metadata: Arc<dyn MetadataProvider>,
    /// Entries rejected because the channel was full or closed.
    dropped_entries: Arc<AtomicU64>,
}

impl BatchClient {
    /// Create a client and spawn its flushing task on the current Tokio
    /// runtime.
    ///
    /// Fails with [`ClientError::Transport`] when called outside a runtime.
    /// Minimal thresholds are enforced for the buffer, batch size and flush
    /// interval.
    ///
    /// The task runs inside a `stackdriver_log_writer` span, so events the
    /// transport emits while delivering are not fed back to the writers.
    pub fn spawn(
        sink: Arc<dyn EntrySink>,
        log_name: &str,
        metadata: Arc<dyn MetadataProvider>,
        config: BatchConfig,
    ) -> Result<(Self, JoinHandle<()>), ClientError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let buffer = config.channel_buffer.max(16);
        let batch_size = config.batch_size.max(1);
        let flush_interval = config.flush_interval.max(Duration::from_millis(10));
        let max_retries = config.max_retries;

        let (tx, mut rx) = mpsc::channel::<Queued>(buffer);
        let log_name = qualified_log_name(&metadata.project_id(), log_name);
        let flush_metadata = Arc::clone(&metadata);

        let flusher = async move {
            let mut batch = Vec::with_capacity(batch_size);
            let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    queued = rx.recv() => match queued {
                        Some(Queued::Entry(entry)) => {
                            batch.push(entry);
                            if batch.len() >= batch_size {
                                flush(&*sink, &log_name, &*flush_metadata, &mut batch, max_retries).await;
                            }
                        }
                        Some(Queued::Flush(ack)) => {
                            flush(&*sink, &log_name, &*flush_metadata, &mut batch, max_retries).await;
                            let _ = ack.send(());
                        }
                        None => {
                            flush(&*sink, &log_name, &*flush_metadata, &mut batch, max_retries).await;
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        flush(&*sink, &log_name, &*flush_metadata, &mut batch, max_retries).await;
                    }
                }
            }
        };
        let handle = runtime.spawn(flusher.instrument(tracing::debug_span!("batch_flusher")));

        let client = Self {
            sender: tx,
            metadata,
            dropped_entries: Arc::new(AtomicU64::new(0)),
        };
        Ok((client, handle))
    }

    pub fn dropped_entries(&self) -> u64 {
        self.dropped_entries.load(Ordering::Relaxed)
    }
}

impl BatchLogger for BatchClient {
    fn log(
        &self,
        severity: Severity,
        payload: Payload,
        context: Map<String, Value>,
    ) -> Result<(), ClientError> {
        let mut json_payload = context;
        json_payload.insert("message".to_string(), payload.into_value());

        let entry = QueuedEntry {
            severity,
            labels: self.metadata.labels(),
            timestamp: Utc::now(),
            json_payload,
        };

        self.sender.try_send(Queued::Entry(entry)).map_err(|e| {
            self.dropped_entries.fetch_add(1, Ordering::Relaxed);
            queue_error(e)
        })
    }

    fn flush(&self) -> Result<Option<FlushAck>, ClientError> {
        let (ack, done) = oneshot::channel();
        self.sender.try_send(Queued::Flush(ack)).map_err(queue_error)?;
        Ok(Some(done))
    }
}

fn queue_error<T>(e: mpsc::error::TrySendError<T>) -> ClientError {
    match e {
        mpsc::error::TrySendError::Full(_) => ClientError::QueueFull,
        mpsc::error::TrySendError::Closed(_) => ClientError::Closed,
    }
}

/// `projects/{project}/logs/{log}` with the log id URL-encoded.
pub fn qualified_log_name(project_id: &str, log_name: &str) -> String {
    format!("projects/{}/logs/{}", project_id, urlencoding::encode(log_name))
}

async fn flush(
    sink: &dyn EntrySink,
    log_name: &str,
    metadata: &dyn MetadataProvider,
    batch: &mut Vec<QueuedEntry>,
    max_retries: u32,
) {
    if batch.is_empty() {
        return;
    }

    let resource = metadata.monitored_resource();
    let entries: Vec<LogEntry> = batch
        .drain(..)
        .map(|queued| LogEntry {
            log_name: log_name.to_string(),
            resource: resource.clone(),
            severity: queued.severity,
            labels: queued.labels,
            timestamp: queued.timestamp,
            json_payload: queued.json_payload,
        })
        .collect();

    if let Err(e) = send_batch(sink, &entries, max_retries).await {
        eprintln!("dropping {} log entries after failed delivery: {}", entries.len(), e);
    }
}

async fn send_batch(
    sink: &dyn EntrySink,
    entries: &[LogEntry],
    max_retries: u32,
) -> Result<(), ClientError> {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(10);
    let mut attempt = 0;

    loop {
        match sink.write_entries(entries).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= max_retries => return Err(e),
            Err(e) => {
                eprintln!("log entries write failed ({}), retrying in {:?}", e, backoff);
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ResourceEnv;
    use crate::metadata::generic_task;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedMetadata;

    impl MetadataProvider for FixedMetadata {
        fn monitored_resource(&self) -> MonitoredResource {
            let env = ResourceEnv {
                host_name: "node-a".into(),
                ..ResourceEnv::default()
            };
            generic_task("acme-prod", &env)
        }

        fn project_id(&self) -> String {
            "acme-prod".into()
        }

        fn service_id(&self) -> String {
            "node-a".into()
        }

        fn labels(&self) -> Labels {
            let mut labels = Labels::new();
            labels.insert("appengine.googleapis.com/trace_id".into(), "abc".into());
            labels
        }
    }

    #[derive(Default)]
    struct MemorySink {
        batches: Mutex<Vec<Vec<LogEntry>>>,
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl EntrySink for MemorySink {
        async fn write_entries(&self, entries: &[LogEntry]) -> Result<(), ClientError> {
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    return Err(ClientError::Transport("connection reset".into()));
                }
            }
            self.batches.lock().unwrap().push(entries.to_vec());
            Ok(())
        }
    }

    fn config(batch_size: usize) -> BatchConfig {
        BatchConfig {
            channel_buffer: 64,
            batch_size,
            flush_interval: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    fn spawn(sink: &Arc<MemorySink>, config: BatchConfig) -> (BatchClient, JoinHandle<()>) {
        BatchClient::spawn(
            Arc::clone(sink) as Arc<dyn EntrySink>,
            "app/errors",
            Arc::new(FixedMetadata),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn flushes_full_batches_and_remainder_on_shutdown() {
        let sink = Arc::new(MemorySink::default());
        let (client, handle) = spawn(&sink, config(2));

        for i in 0..3 {
            client
                .log(Severity::Error, Payload::Text(format!("e{}", i)), Map::new())
                .unwrap();
        }
        drop(client);
        handle.await.unwrap();

        let sizes: Vec<usize> = sink.batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, [2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_partial_batch_on_interval() {
        let sink = Arc::new(MemorySink::default());
        let (client, _handle) = spawn(&sink, config(100));

        client.log(Severity::Warning, Payload::Text("slow".into()), Map::new()).unwrap();
        sleep(Duration::from_secs(61)).await;

        assert_eq!(sink.batches.lock().unwrap().concat().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_request_delivers_before_interval() {
        let sink = Arc::new(MemorySink::default());
        let (client, _handle) = spawn(&sink, config(100));

        client.log(Severity::Error, Payload::Text("last words".into()), Map::new()).unwrap();
        let ack = client.flush().unwrap().unwrap();
        ack.await.unwrap();

        let delivered = sink.batches.lock().unwrap().concat();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].json_payload["message"], json!("last words"));
    }

    #[tokio::test]
    async fn flush_after_shutdown_reports_closed_queue() {
        let sink = Arc::new(MemorySink::default());
        let (client, handle) = spawn(&sink, config(100));
        handle.abort();
        let _ = handle.await;

        assert!(matches!(client.flush(), Err(ClientError::Closed)));
        assert_eq!(client.dropped_entries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_failed_batches() {
        let sink = Arc::new(MemorySink::default());
        *sink.failures_left.lock().unwrap() = 2;
        let (client, handle) = spawn(&sink, config(1));

        client.log(Severity::Error, Payload::Text("retry me".into()), Map::new()).unwrap();
        drop(client);
        handle.await.unwrap();

        assert_eq!(sink.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn entries_carry_resource_labels_and_payload() {
        let sink = Arc::new(MemorySink::default());
        let (client, handle) = spawn(&sink, config(10));

        let mut context = Map::new();
        context.insert("reportLocation".into(), json!({"functionName": "<none>"}));
        client
            .log(Severity::Critical, Payload::Structured(json!({"class": "Oops"})), context)
            .unwrap();
        drop(client);
        handle.await.unwrap();

        let entry = sink.batches.lock().unwrap()[0][0].clone();
        let mut json = serde_json::to_value(&entry).unwrap();
        json.as_object_mut().unwrap().remove("timestamp");

        assert_eq!(
            json,
            json!({
                "logName": "projects/acme-prod/logs/app%2Ferrors",
                "resource": {
                    "type": "generic_task",
                    "labels": {
                        "project_id": "acme-prod",
                        "location": "",
                        "namespace": "node-a",
                        "job": "",
                        "task_id": ""
                    }
                },
                "severity": "CRITICAL",
                "labels": {"appengine.googleapis.com/trace_id": "abc"},
                "jsonPayload": {
                    "message": {"class": "Oops"},
                    "reportLocation": {"functionName": "<none>"}
                }
            })
        );
    }

    #[test]
    fn spawn_outside_runtime_is_a_transport_error() {
        let result = BatchClient::spawn(
            Arc::new(MemorySink::default()),
            "app",
            Arc::new(FixedMetadata),
            BatchConfig::default(),
        );
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }

    #[test]
    fn config_from_options_overrides_defaults() {
        let options = StackdriverOptions {
            log_name: "app".into(),
            project_id: "p".into(),
            access_token: None,
            endpoint: None,
            batch_size: Some(10),
            flush_interval_ms: Some(250),
            channel_buffer: None,
            max_retries: None,
        };
        let config = BatchConfig::from_options(&options);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.channel_buffer, 1024);
        assert_eq!(config.max_retries, 5);
    }
}
