//! Table of protocol versions and algorithm identifiers accepted by configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A protocol version: display name plus wire code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Registry name, e.g. `TLS12`.
    pub name: String,
    /// Two-byte code sent on the wire.
    pub wire: u16,
}

impl ProtocolVersion {
    #[must_use]
    pub fn new(name: impl Into<String>, wire: u16) -> Self {
        Self {
            name: name.into(),
            wire,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An algorithm (cipher suite) identifier: display name plus 16-bit code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlgorithmId {
    /// Registry name, e.g. `TLS_RSA_WITH_AES_128_CBC_SHA`.
    pub name: String,
    /// Two-byte identifier sent on the wire.
    pub code: u16,
}

impl AlgorithmId {
    #[must_use]
    pub fn new(name: impl Into<String>, code: u16) -> Self {
        Self {
            name: name.into(),
            code,
        }
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:04X})", self.name, self.code)
    }
}

/// Supported values that configuration is validated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    versions: Vec<ProtocolVersion>,
    algorithms: Vec<AlgorithmId>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            versions: vec![
                ProtocolVersion::new("SSL3", 0x0300),
                ProtocolVersion::new("TLS10", 0x0301),
                ProtocolVersion::new("TLS11", 0x0302),
                ProtocolVersion::new("TLS12", 0x0303),
                ProtocolVersion::new("TLS13", 0x0304),
            ],
            algorithms: vec![
                AlgorithmId::new("TLS_RSA_WITH_AES_128_CBC_SHA", 0x002F),
                AlgorithmId::new("TLS_RSA_WITH_AES_256_CBC_SHA", 0x0035),
                AlgorithmId::new("TLS_RSA_WITH_AES_128_GCM_SHA256", 0x009C),
                AlgorithmId::new("TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", 0xC02F),
                AlgorithmId::new("TLS_AES_128_GCM_SHA256", 0x1301),
            ],
        }
    }
}

impl Registry {
    /// Create a registry from explicit tables.
    #[must_use]
    pub const fn new(versions: Vec<ProtocolVersion>, algorithms: Vec<AlgorithmId>) -> Self {
        Self {
            versions,
            algorithms,
        }
    }

    #[must_use]
    pub fn versions(&self) -> &[ProtocolVersion] {
        &self.versions
    }

    #[must_use]
    pub fn algorithms(&self) -> &[AlgorithmId] {
        &self.algorithms
    }

    /// Look up a protocol version by name (case-insensitive).
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownProtocolVersion` if the name is not registered.
    pub fn version(&self, name: &str) -> Result<&ProtocolVersion, ConfigError> {
        self.versions
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ConfigError::UnknownProtocolVersion(name.to_string()))
    }

    /// Look up an algorithm by name (case-insensitive).
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownAlgorithm` if the name is not registered.
    pub fn algorithm(&self, name: &str) -> Result<&AlgorithmId, ConfigError> {
        self.algorithms
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ConfigError::UnknownAlgorithm(name.to_string()))
    }

    #[must_use]
    pub fn version_by_wire(&self, wire: u16) -> Option<&ProtocolVersion> {
        self.versions.iter().find(|v| v.wire == wire)
    }

    #[must_use]
    pub fn algorithm_by_code(&self, code: u16) -> Option<&AlgorithmId> {
        self.algorithms.iter().find(|a| a.code == code)
    }
}
