use std::sync::Arc;

use serde_json::Value;

use super::{Level, Logger};

/// # Logger Local
///
/// Forwards messages to the `log` facade under a per-component target such as
/// `chainsub::read_loop`, so a backend (fern in the daemon, env_logger in
/// tests) can filter and format them. Extras are appended as compact JSON.
#[derive(Debug, Clone)]
pub struct LoggerLocal {
    /// The application name, used as the first target segment.
    app_name: String,
    /// The full `log` target this instance writes under.
    target: String,
    /// Messages below this level are dropped before reaching the facade.
    min_level: Level,
}

impl LoggerLocal {
    /// Creates a root logger for `app_name`, passing every level through.
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            target: app_name.clone(),
            app_name,
            min_level: Level::Trace,
        }
    }

    /// Drops messages less severe than `level`.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Derives a logger for one component, e.g. `chainsub::heartbeat`.
    pub fn component(&self, name: &str) -> Self {
        Self {
            app_name: self.app_name.clone(),
            target: format!("{}::{}", self.app_name, name),
            min_level: self.min_level,
        }
    }

    /// Same as [`LoggerLocal::component`], boxed for injection.
    pub fn shared(&self, name: &str) -> Arc<dyn Logger> {
        Arc::new(self.component(name))
    }

    /// The `log` target used by this instance.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Renders the line handed to the facade.
    fn render(message: &str, extras: Option<&Value>) -> String {
        match extras {
            Some(Value::Null) | None => message.to_string(),
            Some(extras) => format!("{} {}", message, extras),
        }
    }
}

impl Logger for LoggerLocal {
    fn log(&self, level: Level, message: &str, extras: Option<Value>) {
        if level > self.min_level {
            return;
        }
        let line = Self::render(message, extras.as_ref());
        log::log!(target: self.target.as_str(), level, "{}", line);
    }
}
