use crate::config::{ConfigError, SimpleFormatterOptions, StreamOptions};
use crate::event::LogEvent;
use crate::transcode::utfize_map;
use crate::writer::{WriteError, Writer};
use std::fmt::Write as _;
use std::io::Write;

/// Default line layout of [`SimpleFormatter`].
pub const DEFAULT_FORMAT: &str = "%timestamp% %priorityName% (%priority%): %message% %extra%";

/// Date, time with millisecond precision.
pub const DEFAULT_DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Placeholder-based single-line formatter.
///
/// Recognised placeholders are `%timestamp%`, `%priority%`,
/// `%priorityName%`, `%message%` and `%extra%`; anything else between
/// percent signs is copied verbatim.
#[derive(Debug, Clone)]
pub struct SimpleFormatter {
    format: String,
    date_time_format: String,
}

impl Default for SimpleFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_FORMAT, DEFAULT_DATE_TIME_FORMAT)
    }
}

impl SimpleFormatter {
    pub fn new(format: impl Into<String>, date_time_format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            date_time_format: date_time_format.into(),
        }
    }

    pub fn from_options(options: &SimpleFormatterOptions) -> Self {
        Self::new(options.format.clone(), options.date_time_format.clone())
    }

    pub fn format(&self, event: &LogEvent) -> String {
        let mut out = String::with_capacity(self.format.len() + event.message.len());
        let mut rest = self.format.as_str();

        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];

            let token = after.find('%').map(|end| (&after[..end], &after[end + 1..]));
            match token.and_then(|(name, tail)| self.placeholder(name, event).map(|v| (v, tail))) {
                Some((value, tail)) => {
                    out.push_str(&value);
                    rest = tail;
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            }
        }
        out.push_str(rest);

        if event.extra.is_empty() && self.format.contains("%extra%") {
            out.truncate(out.trim_end_matches(' ').len());
        }
        out
    }

    fn placeholder(&self, name: &str, event: &LogEvent) -> Option<String> {
        let value = match name {
            "timestamp" => {
                let mut ts = String::new();
                if write!(ts, "{}", event.timestamp.format(&self.date_time_format)).is_err() {
                    // Invalid strftime pattern.
                    ts = event.timestamp.to_rfc3339();
                }
                ts
            }
            "priority" => event.priority.to_string(),
            "priorityName" => event.priority_name.clone(),
            "message" => event.message.clone(),
            "extra" if event.extra.is_empty() => String::new(),
            "extra" => serde_json::Value::Object(utfize_map(event.extra.clone())).to_string(),
            _ => return None,
        };
        Some(value)
    }
}

/// Writes one formatted line per event to a byte stream.
pub struct StreamWriter<W: Write + Send> {
    stream: W,
    formatter: SimpleFormatter,
}

impl<W: Write + Send> StreamWriter<W> {
    pub fn new(stream: W, formatter: SimpleFormatter) -> Self {
        Self { stream, formatter }
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}

impl StreamWriter<Box<dyn Write + Send>> {
    /// Build a writer for `stdout` or `stderr` from writer options.
    pub fn from_options(options: &StreamOptions) -> Result<Self, ConfigError> {
        let stream: Box<dyn Write + Send> = match options.stream.as_str() {
            "stdout" | "php://stdout" => Box::new(std::io::stdout()),
            "stderr" | "php://stderr" => Box::new(std::io::stderr()),
            other => return Err(ConfigError::UnknownStream(other.to_string())),
        };

        let formatter = options
            .formatter
            .as_ref()
            .map(|f| SimpleFormatter::from_options(&f.options))
            .unwrap_or_default();

        Ok(Self::new(stream, formatter))
    }
}

impl<W: Write + Send> Writer for StreamWriter<W> {
    fn write(&mut self, event: &LogEvent) -> Result<(), WriteError> {
        let line = self.formatter.format(event);
        writeln!(self.stream, "{}", line)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WriteError> {
        self.stream.flush()?;
        Ok(())
    }
}
