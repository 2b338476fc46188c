use stackdriver_log_writer::config::default_config;
use stackdriver_log_writer::env::ResourceEnv;
use stackdriver_log_writer::init::init_tracing;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Only the default stdout stream writer is configured.
    init_tracing(&default_config(), &ResourceEnv::from_env()).expect("install logging");

    info!("starting service");
    warn!(free_mb = 120, "disk space low");
    error!(user_id = 42, reason = "invalid password", "authentication failed");
}
