//! # Structured Logging Collaborator
//!
//! Components never reach for a process-wide logger from their control flow.
//! Each one is handed an `Arc<dyn Logger>` at construction and reports through
//! it, so a session can be observed (or silenced, or recorded in tests)
//! without touching global state.

use serde_json::Value;

/// Implements the `log`-facade backed logger used in production.
pub mod loggerlocal;

pub use log::Level;

/// A sink for leveled messages with optional structured extras.
pub trait Logger: Send + Sync {
    /// Records one message. `extras` carries structured context such as
    /// request ids or error strings.
    fn log(&self, level: Level, message: &str, extras: Option<Value>);

    /// Logs at debug level.
    fn debug(&self, message: &str, extras: Option<Value>) {
        self.log(Level::Debug, message, extras);
    }

    /// Logs at info level.
    fn info(&self, message: &str, extras: Option<Value>) {
        self.log(Level::Info, message, extras);
    }

    /// Logs at warn level.
    fn warn(&self, message: &str, extras: Option<Value>) {
        self.log(Level::Warn, message, extras);
    }

    /// Logs at error level.
    fn error(&self, message: &str, extras: Option<Value>) {
        self.log(Level::Error, message, extras);
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::sync::Mutex;

    use super::*;

    /// One captured log call.
    #[derive(Debug, Clone)]
    pub(crate) struct Entry {
        pub level: Level,
        pub message: String,
        pub extras: Option<Value>,
    }

    /// Records every call so tests can assert on what was reported.
    #[derive(Default)]
    pub(crate) struct MemoryLogger {
        entries: Mutex<Vec<Entry>>,
    }

    impl MemoryLogger {
        pub(crate) fn entries(&self) -> Vec<Entry> {
            self.entries.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, level: Level, needle: &str) -> usize {
            self.entries()
                .iter()
                .filter(|e| e.level == level && e.message.contains(needle))
                .count()
        }
    }

    impl Logger for MemoryLogger {
        fn log(&self, level: Level, message: &str, extras: Option<Value>) {
            self.entries.lock().unwrap().push(Entry {
                level,
                message: message.to_string(),
                extras,
            });
        }
    }
}
