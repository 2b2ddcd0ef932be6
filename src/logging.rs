//! Structured logger capability.
//!
//! `spec.md` §9 calls out an "implicit global file logger" pattern as a
//! design smell to avoid: the engine takes a structured logger at
//! construction instead, with a no-op default. The production
//! implementation adapts to `tracing`, the teacher crate's logging facade,
//! so host programs still get ordinary `tracing-subscriber` output without
//! the engine ever touching a hard-coded path itself.

use std::sync::Arc;

/// A structured log line: an event name plus key/value fields.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, event: &str, fields: &[(&str, &str)]);

    fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Level::Info, event, fields);
    }

    fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Level::Warn, event, fields);
    }

    fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Level::Error, event, fields);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

pub type SharedLogger = Arc<dyn Logger>;

/// Default: discards everything. Safe for library consumers who don't
/// want the engine logging on their behalf.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Level, _event: &str, _fields: &[(&str, &str)]) {}
}

pub fn null_logger() -> SharedLogger {
    Arc::new(NullLogger)
}

/// Adapter over `tracing`, for hosts that already run a
/// `tracing-subscriber` pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, event: &str, fields: &[(&str, &str)]) {
        let joined = fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        match level {
            Level::Info => tracing::info!(%event, "{joined}"),
            Level::Warn => tracing::warn!(%event, "{joined}"),
            Level::Error => tracing::error!(%event, "{joined}"),
        }
    }
}

pub fn tracing_logger() -> SharedLogger {
    Arc::new(TracingLogger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLogger {
        events: Mutex<Vec<String>>,
    }

    impl Logger for RecordingLogger {
        fn log(&self, _level: Level, event: &str, _fields: &[(&str, &str)]) {
            self.events.lock().unwrap().push(event.to_string());
        }
    }

    #[test]
    fn null_logger_is_silent() {
        let logger = null_logger();
        logger.info("anything", &[("k", "v")]);
    }

    #[test]
    fn recording_logger_captures_events() {
        let logger = RecordingLogger::default();
        logger.warn("cache_stale", &[("key", "pods/default")]);
        assert_eq!(logger.events.lock().unwrap().as_slice(), ["cache_stale"]);
    }
}
