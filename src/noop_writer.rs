use crate::event::LogEvent;
use crate::writer::{WriteError, Writer};

/// A writer that simply drops all events.
///
/// Stands in for the Stackdriver writer when its client cannot be built,
/// and is handy in tests that don't care about output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWriter;

impl Writer for NoopWriter {
    fn write(&mut self, _event: &LogEvent) -> Result<(), WriteError> {
        Ok(())
    }
}
