//! Client configuration and its validation.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    encoding::duration_ms,
    error::ConfigError,
    registry::{AlgorithmId, ProtocolVersion, Registry},
};

/// Default connect/read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Where and how to reach the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Remote host name or address.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Bound on connect and on each receiving action.
    #[serde(with = "duration_ms", default = "default_timeout")]
    pub timeout: Duration,
}

const fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl ConnectionConfig {
    /// Create a connection config with the default timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check host and port.
    ///
    /// # Errors
    /// Returns error if the host is blank or the port is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(0));
        }
        Ok(())
    }
}

/// Parse a port argument, rejecting anything outside [1, 65535].
///
/// # Errors
/// Returns `ConfigError::InvalidPort` for out-of-range values and
/// `ConfigError::Parse` for non-numeric input.
pub fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|e| ConfigError::Parse(format!("port {raw:?}: {e}")))?;
    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(value)),
    }
}

/// Client configuration with defaults for everything but the peer address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Peer address and timeout.
    pub connection: ConnectionConfig,
    /// Name of the highest protocol version offered.
    #[serde(default = "default_version")]
    pub highest_protocol_version: String,
    /// Algorithm names offered, in preference order.
    #[serde(default = "default_algorithms")]
    pub supported_algorithms: Vec<String>,
}

fn default_version() -> String {
    "TLS12".to_string()
}

fn default_algorithms() -> Vec<String> {
    vec![
        "TLS_RSA_WITH_AES_128_CBC_SHA".to_string(),
        "TLS_RSA_WITH_AES_256_CBC_SHA".to_string(),
    ]
}

impl Config {
    /// Create a config with default version, algorithms and timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            connection: ConnectionConfig::new(host, port),
            highest_protocol_version: default_version(),
            supported_algorithms: default_algorithms(),
        }
    }

    /// Parse a JSON configuration document.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` if the document is invalid.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a JSON configuration file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Validate against a registry, resolving names to registry entries.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self, registry: &Registry) -> Result<ValidatedConfig, ConfigError> {
        self.connection.validate()?;
        let highest_protocol_version = registry.version(&self.highest_protocol_version)?.clone();
        if self.supported_algorithms.is_empty() {
            return Err(ConfigError::NoAlgorithms);
        }
        let supported_algorithms = self
            .supported_algorithms
            .iter()
            .map(|name| registry.algorithm(name).cloned())
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            host = %self.connection.host,
            port = self.connection.port,
            version = %highest_protocol_version,
            algorithms = supported_algorithms.len(),
            "Configuration validated"
        );

        Ok(ValidatedConfig {
            connection: self.connection.clone(),
            highest_protocol_version,
            supported_algorithms,
        })
    }
}

/// Configuration whose names have been resolved against a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    /// Peer address and timeout, already checked.
    pub connection: ConnectionConfig,
    /// Registry entry for the highest version offered.
    pub highest_protocol_version: ProtocolVersion,
    /// Registry entries for the offered algorithms, in preference order.
    pub supported_algorithms: Vec<AlgorithmId>,
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("10.160.160.3", 50001);
        assert_eq!(config.connection.timeout, Duration::from_millis(200));
        assert_eq!(config.highest_protocol_version, "TLS12");

        let validated = assert_ok!(config.validate(&Registry::default()));
        assert_eq!(validated.highest_protocol_version.wire, 0x0303);
        let codes: Vec<u16> = validated.supported_algorithms.iter().map(|a| a.code).collect();
        assert_eq!(codes, vec![0x002F, 0x0035]);
    }

    #[test]
    fn test_rejects_bad_values() {
        let registry = Registry::default();

        let config = Config::new("  ", 443);
        assert_eq!(config.validate(&registry), Err(ConfigError::EmptyHost));

        let mut config = Config::new("localhost", 443);
        config.highest_protocol_version = "QUIC".to_string();
        assert_eq!(
            config.validate(&registry),
            Err(ConfigError::UnknownProtocolVersion("QUIC".to_string()))
        );

        let mut config = Config::new("localhost", 443);
        config.supported_algorithms.clear();
        assert_eq!(config.validate(&registry), Err(ConfigError::NoAlgorithms));

        let config = Config::new("localhost", 0);
        assert_eq!(config.validate(&registry), Err(ConfigError::InvalidPort(0)));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("50001"), Ok(50001));
        assert_eq!(parse_port("65536"), Err(ConfigError::InvalidPort(65536)));
        assert_eq!(parse_port("-1"), Err(ConfigError::InvalidPort(-1)));
        assert_err!(parse_port("https"));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = assert_ok!(Config::from_json_str(
            r#"{"connection":{"host":"example.org","port":4433}}"#
        ));
        assert_eq!(config, Config::new("example.org", 4433));

        let config = assert_ok!(Config::from_json_str(
            r#"{"connection":{"host":"example.org","port":4433,"timeout":1500},
                "highest_protocol_version":"TLS13",
                "supported_algorithms":["TLS_AES_128_GCM_SHA256"]}"#
        ));
        assert_eq!(config.connection.timeout, Duration::from_millis(1500));
        assert_ok!(config.validate(&Registry::default()));

        assert!(matches!(
            Config::from_json_str(r#"{"connection":{"host":"x","port":70000}}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
