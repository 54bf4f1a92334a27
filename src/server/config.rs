//! Server configuration.

use std::net::SocketAddr;
use serde::Deserialize;

use crate::server::error::Error;

/// HTTP server configuration.
///
/// Deserializable from JSON; omitted fields take their [`Default`] values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// The read buffer size.
    pub read_buffer_size: usize,
    /// Requests larger than this many bytes are answered with `413`.
    pub max_request_size: usize,
    /// Name used in logs and in "already started" errors.
    pub server_name: String,
    /// Keep connections open between requests and advertise it in responses.
    pub keep_alive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1024,
            read_buffer_size: 8192,
            max_request_size: 1024 * 1024,
            server_name: "microrest".to_string(),
            keep_alive: false,
        }
    }
}

impl ServerConfig {
    /// Load a configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: ServerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be greater than zero".to_string()));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::Config("read_buffer_size must be greater than zero".to_string()));
        }
        if self.max_request_size < self.read_buffer_size {
            return Err(Error::Config("max_request_size must be at least read_buffer_size".to_string()));
        }
        if self.server_name.trim().is_empty() {
            return Err(Error::Config("server_name must not be blank".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_fills_defaults() {
        let config = ServerConfig::from_json(r#"{"addr": "0.0.0.0:9000", "keep_alive": true}"#).unwrap();
        assert_eq!(config.addr.port(), 9000);
        assert!(config.keep_alive);
        assert_eq!(config.max_connections, 1024);
        assert_eq!(config.server_name, "microrest");
    }

    #[test]
    fn test_from_json_rejects_bad_values() {
        assert!(matches!(ServerConfig::from_json(r#"{"max_connections": 0}"#), Err(Error::Config(_))));
        assert!(matches!(ServerConfig::from_json(r#"{"addr": 12}"#), Err(Error::Serialization(_))));
    }
}
