use std::sync::Arc;

use serde_json::{Map, Value};
use stackdriver_log_writer::client::{BatchLogger, ClientError, Payload};
use stackdriver_log_writer::config::StackdriverOptions;
use stackdriver_log_writer::env::ResourceEnv;
use stackdriver_log_writer::logger::Logger;
use stackdriver_log_writer::metadata::MetadataProvider;
use stackdriver_log_writer::{LogEvent, Priority, RemoteWriter, Severity};

/// Example of plugging a completely custom remote client into the
/// Stackdriver writer by implementing `BatchLogger` directly. Here it just
/// prints what would be sent, together with the resource the writer
/// describes.
struct PrintingClient {
    metadata: Arc<dyn MetadataProvider>,
}

impl BatchLogger for PrintingClient {
    fn log(&self, severity: Severity, payload: Payload, context: Map<String, Value>) -> Result<(), ClientError> {
        println!(
            "[{}] {} {:?} labels={:?} resource={:?}",
            severity,
            payload.into_value(),
            context,
            self.metadata.labels(),
            self.metadata.monitored_resource(),
        );
        Ok(())
    }
}

fn main() {
    let options = StackdriverOptions {
        log_name: "custom".to_string(),
        project_id: "demo-project".to_string(),
        access_token: None,
        endpoint: None,
        batch_size: None,
        flush_interval_ms: None,
        channel_buffer: None,
        max_retries: None,
    };

    let builder = |_: &StackdriverOptions, metadata: Arc<dyn MetadataProvider>| -> Result<Box<dyn BatchLogger>, ClientError> {
        Ok(Box::new(PrintingClient { metadata }))
    };
    let writer = RemoteWriter::from_options(&options, ResourceEnv::from_env(), &builder)
        .expect("build writer");

    let mut logger = Logger::new();
    logger.add_writer("stackdriver", writer);

    let event = LogEvent::new(Priority::Err, "simulated failure")
        .with_extra("file", "src/orders.rs")
        .with_extra("line", 88u32);
    logger.log(&event).expect("write event");
}
