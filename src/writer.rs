use crate::client::ClientError;
use crate::event::LogEvent;

/// Error type returned by [`Writer::write`].
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("remote logging client failed: {0}")]
    Client(#[from] ClientError),

    #[error("failed to write to stream: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for [`LogEvent`]s produced by the logging façade.
///
/// Implementations translate the event into whatever their destination
/// understands (a formatted line, a remote entry, ...). `write` is called
/// inline on the thread that emitted the event, once per event.
pub trait Writer: Send {
    /// Write a single event.
    ///
    /// **Returns**
    /// - `Ok(())` if the destination accepted the event.
    /// - `Err(..)` if it did not; the façade decides what happens next.
    fn write(&mut self, event: &LogEvent) -> Result<(), WriteError>;

    /// Flush anything the writer buffers locally. Default is a no-op.
    fn flush(&mut self) -> Result<(), WriteError> {
        Ok(())
    }
}
