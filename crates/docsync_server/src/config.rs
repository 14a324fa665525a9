//! Configuration for the reference server.

/// Configuration for a [`crate::SyncServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of changes returned by a single pull.
    pub max_pull_batch: usize,
}

impl ServerConfig {
    /// Creates a configuration with the default values.
    pub fn new() -> Self {
        Self {
            max_pull_batch: 500,
        }
    }

    /// Sets the pull batch limit.
    pub fn with_max_pull_batch(mut self, limit: usize) -> Self {
        self.max_pull_batch = limit;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
