//! Store configuration.

use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Minimum interval between two flushes of the same record type.
    pub flush_debounce: Duration,

    /// Number of background threads writing blobs.
    pub flush_workers: usize,

    /// Whether records are mirrored to the blob store at all.
    pub persistence_enabled: bool,

    /// Whether `close` (and drop) flushes dirty types before stopping.
    pub flush_on_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_debounce: Duration::from_millis(100),
            flush_workers: 2,
            persistence_enabled: true,
            flush_on_close: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the debounce window.
    #[must_use]
    pub const fn flush_debounce(mut self, window: Duration) -> Self {
        self.flush_debounce = window;
        self
    }

    /// Sets the number of flush workers. Zero is treated as one.
    #[must_use]
    pub const fn flush_workers(mut self, workers: usize) -> Self {
        self.flush_workers = workers;
        self
    }

    /// Enables or disables persistence.
    #[must_use]
    pub const fn persistence_enabled(mut self, value: bool) -> Self {
        self.persistence_enabled = value;
        self
    }

    /// Sets whether closing flushes pending changes.
    #[must_use]
    pub const fn flush_on_close(mut self, value: bool) -> Self {
        self.flush_on_close = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.flush_debounce, Duration::from_millis(100));
        assert_eq!(config.flush_workers, 2);
        assert!(config.persistence_enabled);
        assert!(config.flush_on_close);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .flush_debounce(Duration::from_millis(5))
            .flush_workers(4)
            .persistence_enabled(false)
            .flush_on_close(false);

        assert_eq!(config.flush_debounce, Duration::from_millis(5));
        assert_eq!(config.flush_workers, 4);
        assert!(!config.persistence_enabled);
        assert!(!config.flush_on_close);
    }
}
