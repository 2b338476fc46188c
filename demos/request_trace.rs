use serde_json::json;
use stackdriver_log_writer::config::LogConfig;
use stackdriver_log_writer::env::{env_or, ResourceEnv};
use stackdriver_log_writer::init::init_tracing;
use stackdriver_log_writer::request::{HttpRequest, QueueMessage};
use tracing::{error, info_span};

#[tokio::main]
async fn main() {
    let config = json!({
        "writers": {
            "stdout": {"name": "stream", "options": {"stream": "stdout"}},
            "stackdriver": {
                "name": "stackdriver",
                "options": {
                    "logName": "request-trace-demo",
                    "projectId": env_or("GOOGLE_CLOUD_PROJECT", "demo-project"),
                    "accessToken": env_or("GOOGLE_OAUTH_ACCESS_TOKEN", ""),
                    "flushIntervalMs": 200
                }
            }
        }
    });
    let config = LogConfig::from_json_str(&config.to_string()).expect("valid config");

    let handle = init_tracing(&config, &ResourceEnv::from_env()).expect("install logging");
    let remote = handle.stackdriver().expect("stackdriver writer configured");
    println!("stackdriver writer active: {}", remote.is_active());

    let trace_id = remote.set_request(&HttpRequest {
        method: "POST".to_string(),
        uri: "/orders".to_string(),
    });
    println!("x-trace-id: {}", trace_id);

    {
        let span = info_span!("create_order");
        let _guard = span.enter();
        error!(order_id = 17, "inventory service unavailable");
    }

    let body = json!({"routingKey": "orders.created", "orderId": 17});
    if let serde_json::Value::Object(body) = body {
        remote.set_request(&QueueMessage::new(body));
    }
    error!(priority = "CRIT", "order consumer crashed");

    if let Err(e) = handle.flush().await {
        eprintln!("flush failed: {}", e);
    }
}
