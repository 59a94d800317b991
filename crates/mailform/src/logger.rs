//! Logging capability injected into the mailer.
//!
//! The mailer reports user-facing events (compile failures, routes added,
//! sends) through a [`Logger`]. The default forwards to `tracing`.

use std::sync::Arc;

/// Sink for the mailer's user-facing log lines
pub trait Logger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Logger that forwards to `tracing` under the `mailform` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!(target: "mailform", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "mailform", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "mailform", "{}", message);
    }
}

/// Wraps a logger and drops its info lines
pub struct SilentInfo {
    inner: Arc<dyn Logger>,
}

impl SilentInfo {
    pub fn new(inner: Arc<dyn Logger>) -> Self {
        Self { inner }
    }
}

impl Logger for SilentInfo {
    fn info(&self, _message: &str) {}

    fn warn(&self, message: &str) {
        self.inner.warn(message);
    }

    fn error(&self, message: &str) {
        self.inner.error(message);
    }
}

/// Apply the `silent` setting to a logger
pub(crate) fn with_silence(logger: Arc<dyn Logger>, silent: bool) -> Arc<dyn Logger> {
    if silent {
        Arc::new(SilentInfo::new(logger))
    } else {
        logger
    }
}

/// Logger that keeps every line in memory, for assertions
#[derive(Debug, Default)]
pub struct RecordingLogger {
    lines: std::sync::Mutex<Vec<(LogLevel, String)>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: LogLevel, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((level, message.to_string()));
        }
    }

    /// Messages logged at `level`, oldest first
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| {
                lines
                    .iter()
                    .filter(|(l, _)| *l == level)
                    .map(|(_, m)| m.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages(LogLevel::Error)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages(LogLevel::Warn)
    }
}

impl Logger for RecordingLogger {
    fn info(&self, message: &str) {
        self.push(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.push(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_drops_info_only() {
        let recorder = Arc::new(RecordingLogger::new());
        let logger = with_silence(recorder.clone(), true);

        logger.info("hidden");
        logger.warn("careful");
        logger.error("broken");

        assert!(recorder.messages(LogLevel::Info).is_empty());
        assert_eq!(recorder.warnings(), vec!["careful"]);
        assert_eq!(recorder.errors(), vec!["broken"]);
    }

    #[test]
    fn test_not_silent_passes_through() {
        let recorder = Arc::new(RecordingLogger::new());
        let logger = with_silence(recorder.clone(), false);

        logger.info("visible");
        assert_eq!(recorder.messages(LogLevel::Info), vec!["visible"]);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_logger_uses_mailform_target() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            TracingLogger.warn("Could not add CSS to welcome");
        });

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("mailform"));
        assert!(output.contains("Could not add CSS to welcome"));
    }
}
