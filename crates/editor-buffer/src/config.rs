//! Runtime configuration for [`crate::TextBuffer`].

use std::env;
use std::time::Duration;

/// Environment variable overriding [`BufferConfig::idle_interval`], in microseconds.
pub const IDLE_INTERVAL_ENV: &str = "EDITOR_BUFFER_IDLE_MICROS";

/// Default wait between queue checks when the drain worker has nothing to do.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(1);

/// Default name of the drain worker thread.
pub const DEFAULT_WORKER_NAME: &str = "editor-buffer-drain";

/// Options that control the background drain worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// How long the worker waits for a shutdown signal before re-checking an empty queue.
    pub idle_interval: Duration,
    /// Thread name given to the worker (shows up in debuggers and panic messages).
    pub worker_name: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            idle_interval: DEFAULT_IDLE_INTERVAL,
            worker_name: DEFAULT_WORKER_NAME.to_string(),
        }
    }
}

impl BufferConfig {
    /// Default configuration with overrides read from the environment.
    ///
    /// Honours [`IDLE_INTERVAL_ENV`]; missing or invalid values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(interval) = env::var(IDLE_INTERVAL_ENV)
            .ok()
            .as_deref()
            .and_then(parse_idle_micros)
        {
            config.idle_interval = interval;
        }
        config
    }

    /// Replace the idle interval. A zero duration is bumped to one microsecond.
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval.max(Duration::from_micros(1));
        self
    }

    /// Replace the worker thread name.
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}

/// Parse a positive microsecond count, ignoring surrounding whitespace.
///
/// Returns `None` for empty, zero, negative or non-numeric values.
pub fn parse_idle_micros(value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(micros) => Some(Duration::from_micros(micros)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BufferConfig::default();
        assert_eq!(config.idle_interval, Duration::from_millis(1));
        assert_eq!(config.worker_name, "editor-buffer-drain");
    }

    #[test]
    fn test_parse_idle_micros() {
        assert_eq!(parse_idle_micros("250"), Some(Duration::from_micros(250)));
        assert_eq!(parse_idle_micros("  40 "), Some(Duration::from_micros(40)));
        assert_eq!(parse_idle_micros("0"), None);
        assert_eq!(parse_idle_micros("-5"), None);
        assert_eq!(parse_idle_micros("fast"), None);
        assert_eq!(parse_idle_micros(""), None);
    }

    #[test]
    fn test_builder_methods() {
        let config = BufferConfig::default()
            .with_idle_interval(Duration::ZERO)
            .with_worker_name("doc-1");
        assert_eq!(config.idle_interval, Duration::from_micros(1));
        assert_eq!(config.worker_name, "doc-1");
    }
}
