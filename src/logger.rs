use crate::event::LogEvent;
use crate::writer::{WriteError, Writer};

/// Writers that failed while handling one event.
#[derive(thiserror::Error, Debug)]
#[error("{} log writer(s) failed", .failures.len())]
pub struct LogError {
    pub failures: Vec<(String, WriteError)>,
}

/// Fans each event out to every registered writer, in registration order.
///
/// A failing writer does not stop the others; failures are collected and
/// returned together.
#[derive(Default)]
pub struct Logger {
    writers: Vec<(String, Box<dyn Writer>)>,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_writer(&mut self, name: impl Into<String>, writer: impl Writer + 'static) {
        self.writers.push((name.into(), Box::new(writer)));
    }

    pub fn writer_names(&self) -> impl Iterator<Item = &str> {
        self.writers.iter().map(|(name, _)| name.as_str())
    }

    pub fn log(&mut self, event: &LogEvent) -> Result<(), LogError> {
        self.each_writer(|writer| writer.write(event))
    }

    pub fn flush(&mut self) -> Result<(), LogError> {
        self.each_writer(|writer| writer.flush())
    }

    fn each_writer<F>(&mut self, mut op: F) -> Result<(), LogError>
    where
        F: FnMut(&mut dyn Writer) -> Result<(), WriteError>,
    {
        let failures: Vec<_> = self
            .writers
            .iter_mut()
            .filter_map(|(name, writer)| op(writer.as_mut()).err().map(|e| (name.clone(), e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LogError { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Priority;
    use crate::noop_writer::NoopWriter;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Collecting(Arc<Mutex<Vec<String>>>);

    impl Writer for Collecting {
        fn write(&mut self, event: &LogEvent) -> Result<(), WriteError> {
            self.0.lock().unwrap().push(event.message.clone());
            Ok(())
        }
    }

    struct Broken;

    impl Writer for Broken {
        fn write(&mut self, _event: &LogEvent) -> Result<(), WriteError> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed").into())
        }
    }

    #[test]
    fn failing_writer_does_not_stop_the_others() {
        let seen = Collecting::default();
        let mut logger = Logger::new();
        logger.add_writer("broken", Broken);
        logger.add_writer("noop", NoopWriter);
        logger.add_writer("collect", seen.clone());

        let err = logger.log(&LogEvent::new(Priority::Err, "hello")).unwrap_err();

        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, "broken");
        assert_eq!(err.to_string(), "1 log writer(s) failed");
        assert_eq!(*seen.0.lock().unwrap(), ["hello"]);
        assert_eq!(logger.writer_names().collect::<Vec<_>>(), ["broken", "noop", "collect"]);
    }
}
