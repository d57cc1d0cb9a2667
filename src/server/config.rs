//! Server configuration.

use crate::server::ServerError;
use crate::{DEFAULT_CAPACITY, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

/// Default timeout for the listening-socket poll used by opportunistic accepts
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_millis(10);

/// Default timeout for the aggregate poll over all clients
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Settings fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on (`0` picks an ephemeral port)
    pub port: u16,

    /// Number of client slots
    pub capacity: usize,

    /// Poll timeout for the listening socket
    pub accept_timeout: Duration,

    /// Poll timeout for client sockets, aggregate or single
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }

    pub fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout = timeout;
        self
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(ServerError::InvalidConfig("host is empty".to_string()));
        }
        Ok(())
    }
}
