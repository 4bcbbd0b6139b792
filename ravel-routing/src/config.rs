//! Cluster client configuration.

use std::time::Duration;

use ravel_core::limits::{CONNECTIONS_MAX_DEFAULT, REDIRECTS_MAX_DEFAULT, RETRY_BACKOFF_MS_DEFAULT};
use ravel_core::NodeAddr;

/// Configuration for a cluster client.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Nodes to bootstrap topology from.
    pub seeds: Vec<NodeAddr>,
    /// Maximum number of simultaneously open pooled connections.
    pub max_connections: usize,
    /// Maximum redirection/failure cycles a single request may absorb.
    pub max_redirects: u32,
    /// Pause before retrying a connectivity failure once half the
    /// redirection budget is spent.
    pub retry_backoff: Duration,
}

impl ClusterConfig {
    /// Creates a configuration with default limits.
    #[must_use]
    pub fn new(seeds: Vec<NodeAddr>) -> Self {
        Self {
            seeds,
            max_connections: CONNECTIONS_MAX_DEFAULT,
            max_redirects: REDIRECTS_MAX_DEFAULT,
            retry_backoff: Duration::from_millis(RETRY_BACKOFF_MS_DEFAULT),
        }
    }

    /// Creates a configuration suitable for testing (no backoff).
    #[must_use]
    pub fn for_testing(seeds: Vec<NodeAddr>) -> Self {
        Self::new(seeds).with_retry_backoff(Duration::ZERO)
    }

    /// Sets the connection cap.
    #[must_use]
    pub const fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the redirection budget.
    #[must_use]
    pub const fn with_max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Sets the retry backoff.
    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seeds.is_empty() {
            return Err(ConfigError::NoSeeds);
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max_connections",
                message: "must be at least 1".to_string(),
            });
        }

        if self.max_redirects == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max_redirects",
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No seed node was given.
    NoSeeds,
    /// A limit has an unusable value.
    InvalidLimit {
        /// The limit's name.
        name: &'static str,
        /// Error description.
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSeeds => write!(f, "at least one seed node is required"),
            Self::InvalidLimit { name, message } => write!(f, "invalid {name}: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}
