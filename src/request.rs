use serde_json::{Map, Value};

/// An inbound unit of work a process is handling: an HTTP request, a
/// message consumed from a queue, ...
///
/// Writers use it to enrich every entry logged while the request is being
/// served.
pub trait InboundRequest {
    /// Payload of the message-queue envelope, if the request arrived as one.
    fn queue_payload(&self) -> Option<Map<String, Value>> {
        None
    }
}

/// A message consumed from a message queue (e.g. AMQP).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueMessage {
    pub body: Map<String, Value>,
}

impl QueueMessage {
    pub fn new(body: Map<String, Value>) -> Self {
        Self { body }
    }
}

impl InboundRequest for QueueMessage {
    fn queue_payload(&self) -> Option<Map<String, Value>> {
        Some(self.body.clone())
    }
}

/// Minimal description of an HTTP request. Carries no queue envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
}

impl InboundRequest for HttpRequest {}
