use crate::event::{FieldValue, LogEvent, Priority};
use crate::logger::Logger;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events whose target starts with this are never forwarded to writers, so
/// diagnostics emitted while writing cannot loop back into the logger. The
/// same holds for events raised inside a span with this target, such as the
/// batch flusher's.
const OWN_TARGET: &str = "stackdriver_log_writer";

/// HTTP stack used to deliver entries. Its debug chatter would otherwise be
/// shipped on every flush, including from connection tasks it spawns itself.
const TRANSPORT_TARGETS: &[&str] = &["hyper", "h2", "reqwest", "rustls", "want"];

fn is_ignored_target(target: &str) -> bool {
    std::iter::once(OWN_TARGET)
        .chain(TRANSPORT_TARGETS.iter().copied())
        .any(|prefix| {
            target
                .strip_prefix(prefix)
                .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
        })
}

/// Event field that overrides the priority derived from the level, e.g.
/// `error!(priority = "CRIT", "...")`.
pub const PRIORITY_FIELD: &str = "priority";

/// `tracing_subscriber` layer that turns events into [`LogEvent`]s and
/// hands them to a [`Logger`] inline, on the emitting thread.
///
/// Besides the recorded fields, `extra` receives the callsite `file` and
/// `line`, a one-frame `trace` describing the current span, and an `xdebug`
/// report for fields recorded as errors.
pub struct WriterLayer {
    logger: Arc<Mutex<Logger>>,
    min_level: Level,
    /// Events for which at least one writer failed.
    pub failed_events: Arc<AtomicU64>,
}

impl WriterLayer {
    pub fn new(logger: Arc<Mutex<Logger>>, min_level: Level) -> Self {
        Self {
            logger,
            min_level,
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

fn default_priority(level: &Level) -> Priority {
    match *level {
        Level::ERROR => Priority::Err,
        Level::WARN => Priority::Warn,
        Level::INFO => Priority::Info,
        _ => Priority::Debug,
    }
}

impl<S> Layer<S> for WriterLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.min_level || is_ignored_target(meta.target()) {
            return;
        }
        if let Some(scope) = ctx.event_scope(event) {
            if scope.into_iter().any(|span| span.metadata().target().starts_with(OWN_TARGET)) {
                return;
            }
        }

        let mut extra = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut priority_name: Option<String> = None;

        let mut visitor = FieldVisitor {
            fields: &mut extra,
            message: &mut message,
            priority_name: &mut priority_name,
        };
        event.record(&mut visitor);

        if let Some(file) = meta.file() {
            extra.insert("file".to_string(), FieldValue::from(file));
        }
        if let Some(line) = meta.line() {
            extra.insert("line".to_string(), FieldValue::from(line));
        }
        if let Some(span) = ctx.event_span(event) {
            let frame = span_frame(span.name(), span.metadata().module_path());
            extra.insert("trace".to_string(), FieldValue::List(vec![frame]));
        }

        let level_priority = default_priority(meta.level());
        let priority_name = priority_name.unwrap_or_else(|| level_priority.name().to_string());
        let priority = Priority::from_name(&priority_name).unwrap_or(level_priority);

        let record = LogEvent {
            timestamp: Utc::now(),
            priority: priority as u8,
            priority_name,
            message: message.unwrap_or_default(),
            extra,
        };

        let result = self
            .logger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .log(&record);

        if let Err(e) = result {
            self.failed_events.fetch_add(1, Ordering::Relaxed);
            for (writer, cause) in &e.failures {
                eprintln!("log writer `{}` failed: {}", writer, cause);
            }
        }
    }
}

/// Stack frame in the `class`/`type`/`function` shape writers understand.
fn span_frame(name: &str, module_path: Option<&str>) -> FieldValue {
    let mut frame = BTreeMap::new();
    if let Some(module) = module_path {
        frame.insert("class".to_string(), FieldValue::from(module));
        frame.insert("type".to_string(), FieldValue::from("::"));
    }
    frame.insert("function".to_string(), FieldValue::from(name));
    FieldValue::Map(frame)
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, FieldValue>,
    pub message: &'a mut Option<String>,
    pub priority_name: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => *self.message = Some(value.to_string()),
            PRIORITY_FIELD => *self.priority_name = Some(value.to_string()),
            name => {
                self.fields.insert(name.to_string(), FieldValue::from(value));
            }
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), FieldValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), FieldValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), FieldValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), FieldValue::from(value));
    }

    fn record_bytes(&mut self, field: &Field, value: &[u8]) {
        self.fields.insert(field.name().to_string(), FieldValue::Bytes(value.to_vec()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut sources = Vec::new();
        let mut source = value.source();
        while let Some(cause) = source {
            sources.push(FieldValue::from(cause.to_string()));
            source = cause.source();
        }

        let mut report = BTreeMap::new();
        report.insert("message".to_string(), FieldValue::from(value.to_string()));
        report.insert("sources".to_string(), FieldValue::List(sources));

        self.fields.insert(field.name().to_string(), FieldValue::from(value.to_string()));
        self.fields.insert("xdebug".to_string(), FieldValue::Map(report));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => *self.message = Some(format!("{:?}", value)),
            name => {
                self.fields.insert(name.to_string(), FieldValue::Str(format!("{:?}", value)));
            }
        }
    }
}
