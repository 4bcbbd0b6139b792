//! Connection configuration.

use std::time::Duration;

/// Default time allowed to establish a TCP connection.
pub const CONNECT_TIMEOUT_DEFAULT: Duration = Duration::from_secs(5);

/// Default time allowed for one request/response round trip.
pub const IO_TIMEOUT_DEFAULT: Duration = Duration::from_secs(30);

/// Default initial read buffer size (64 KB).
pub const READ_BUFFER_BYTES_DEFAULT: usize = 64 * 1024;

/// Configuration for TCP node connections.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connect timeout, including name resolution.
    pub connect_timeout: Duration,
    /// Round-trip timeout for a single request.
    pub io_timeout: Duration,
    /// Initial capacity of each connection's read buffer.
    pub read_buffer_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT_DEFAULT,
            io_timeout: IO_TIMEOUT_DEFAULT,
            read_buffer_bytes: READ_BUFFER_BYTES_DEFAULT,
        }
    }
}

impl ConnectionConfig {
    /// Creates connection config suitable for testing (short timeouts).
    #[must_use]
    pub fn fast_for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            io_timeout: Duration::from_secs(1),
            read_buffer_bytes: 4 * 1024,
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the round-trip timeout.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the initial read buffer size.
    #[must_use]
    pub const fn with_read_buffer_bytes(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                message: "connect_timeout must be > 0".to_string(),
            });
        }

        if self.io_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                message: "io_timeout must be > 0".to_string(),
            });
        }

        if self.read_buffer_bytes == 0 {
            return Err(ConfigError::InvalidBuffer {
                message: "read_buffer_bytes must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid timeout.
    InvalidTimeout {
        /// Error description.
        message: String,
    },
    /// Invalid buffer size.
    InvalidBuffer {
        /// Error description.
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTimeout { message } => write!(f, "invalid timeout: {message}"),
            Self::InvalidBuffer { message } => write!(f, "invalid buffer: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}
