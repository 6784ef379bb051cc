//! Observability for sheetdb
//!
//! The engine reports every finished operation (with its affected-row count)
//! and every caught error to an optional [`Logger`]. Logging never changes
//! what an operation returns.

mod events;
mod logger;
mod memory;

pub use events::Event;
pub use logger::{format_line, JsonLogger, Logger, Severity};
pub use memory::{LogRecord, MemoryLogger};

/// Log a typed event at its default severity
pub fn log_event(logger: Option<&dyn Logger>, event: Event, fields: &[(&str, &str)]) {
    if let Some(logger) = logger {
        logger.log(event.severity(), event.as_str(), fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_without_logger() {
        // No logger configured: nothing happens, nothing panics
        log_event(None, Event::SelectComplete, &[("rows", "0")]);
    }

    #[test]
    fn test_log_event_routes_severity() {
        let logger = MemoryLogger::new();
        log_event(Some(&logger), Event::UpdateNoMatch, &[("table", "users")]);
        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].severity, Severity::Warn);
        assert_eq!(records[0].event, "UPDATE_NO_MATCH");
        assert_eq!(records[0].field("table"), Some("users"));
    }
}
