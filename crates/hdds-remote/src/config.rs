// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server and client configuration.

use crate::frame::DEFAULT_MAX_MESSAGE_SIZE;
use crate::protocol::Codec;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

/// Default TCP port for both ends.
pub const DEFAULT_PORT: u16 = 5000;

/// Object server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port to listen on (default: 5000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum message size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum number of concurrent connections (0 = unlimited)
    #[serde(default)]
    pub max_connections: usize,

    /// Payload codec; clients must use the same one
    #[serde(default)]
    pub codec: Codec,

    /// Disable Nagle's algorithm on accepted sockets
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_message_size() -> usize {
    DEFAULT_MAX_MESSAGE_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_message_size: default_max_message_size(),
            max_connections: 0,
            codec: Codec::default(),
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Socket address to listen on.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Validate configuration.
    ///
    /// Port 0 is accepted (ephemeral port).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_message_size cannot be 0".into(),
            ));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(ConfigError::InvalidValue(
                "max_message_size must fit the 4-byte length prefix".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for connecting a [`Session`](crate::client::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Per-response read timeout (`None` = wait forever).
    pub read_timeout: Option<Duration>,

    /// Maximum message size.
    pub max_message_size: usize,

    /// Payload codec; must match the server.
    pub codec: Codec,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            read_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            codec: Codec::default(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Configuration pointing at a resolved address.
    pub fn from_addr(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }

    /// Builder: set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Builder: set payload codec.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Builder: set maximum message size.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Resolve `host:port`.
    pub fn resolve(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ConfigError::Io(format!("{}:{}: {}", self.host, self.port, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "{}:{} did not resolve to any address",
                self.host, self.port
            )));
        }
        Ok(addrs)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue("host cannot be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "connect_timeout must be > 0".into(),
            ));
        }
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidValue("read_timeout must be > 0".into()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_message_size must be > 0".into(),
            ));
        }
        if self.max_message_size > u32::MAX as usize {
            return Err(ConfigError::InvalidValue(
                "max_message_size must fit the 4-byte length prefix".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:5000");
        assert_eq!(config.codec, Codec::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_config_partial_json() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"port": 6001, "codec": "cbor"}"#).unwrap();
        assert_eq!(config.port, 6001);
        assert_eq!(config.codec, Codec::Cbor);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_server_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");

        let config = ServerConfig {
            port: 6100,
            max_connections: 8,
            ..Default::default()
        };
        config.to_file(&path).unwrap();

        let loaded = ServerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_server_config_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ServerConfig::from_file(&path),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ServerConfig::from_file(&dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_server_validation() {
        let config = ServerConfig {
            max_message_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5000);
        assert!(config.read_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_client_builder_methods() {
        let config = ClientConfig::new("10.0.0.1", 6000)
            .with_connect_timeout(Duration::from_secs(1))
            .with_read_timeout(Duration::from_secs(2))
            .with_codec(Codec::Cbor)
            .with_max_message_size(1024);

        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.codec, Codec::Cbor);
        assert_eq!(config.max_message_size, 1024);
    }

    #[test]
    fn test_client_validation_errors() {
        let mut config = ClientConfig {
            connect_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.connect_timeout = Duration::from_secs(5);
        config.port = 0;
        assert!(config.validate().is_err());

        config.port = 5000;
        config.read_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        config.read_timeout = None;
        config.max_message_size = u32::MAX as usize;
        assert!(config.validate().is_ok());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_client_max_message_size_fits_prefix() {
        let config = ClientConfig::default().with_max_message_size(u32::MAX as usize + 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_client_resolve() {
        let config = ClientConfig::from_addr("127.0.0.1:7000".parse().unwrap());
        let addrs = config.resolve().unwrap();
        assert_eq!(addrs[0].port(), 7000);
    }
}
