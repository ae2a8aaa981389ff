//! Client configuration.

use std::time::Duration;

/// Default host of a Groonga server
pub const DEFAULT_HOST: &str = "localhost";
/// Default GQTP port
pub const DEFAULT_PORT: u16 = 10043;
/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum reply size (64MB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Where and how to reach a Groonga server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name or IP address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Timeout for every read or write of a request
    pub request_timeout: Duration,
    /// Largest reply body accepted, summed over all frames
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the maximum reply size
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// `host:port` string handed to the socket layer
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.address(), "localhost:10043");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("127.0.0.1", 20043)
            .with_connect_timeout(Duration::from_millis(250))
            .with_max_frame_size(1024);
        assert_eq!(config.address(), "127.0.0.1:20043");
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.max_frame_size, 1024);
    }
}
