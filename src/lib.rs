pub mod event;
pub mod severity;
pub mod report;
pub mod transcode;

pub mod env;
pub mod config;
pub mod metadata;
pub mod request;

pub mod client;
pub mod batch;

#[cfg(feature = "cloud-logging")]
pub mod cloud_logging;

pub mod writer;
pub mod noop_writer;
pub mod stream;
pub mod stackdriver;

pub mod logger;
pub mod layer;
pub mod init;

pub use event::{FieldValue, LogEvent, Priority};
pub use severity::Severity;
pub use stackdriver::{RemoteWriter, StackdriverWriter};
pub use writer::Writer;
