//! Session configuration.
//!
//! Sessions can be configured in code or loaded from YAML:
//!
//! ```yaml
//! name: s1
//! address: 127.0.0.1:50051
//! device_id: 0
//! proto_dump_file: logs/s1-p4runtime-requests.txt
//! election_id: { high: 0, low: 1 }
//! connect_timeout_ms: 3000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use sonic_p4rt_proto::v1::Uint128;

use crate::error::{P4rtError, P4rtResult};
use crate::transport::ChannelSettings;

/// Default P4Runtime server address (BMv2 `simple_switch_grpc`).
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:50051";

/// Election id sent with arbitration, pipeline and write requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ElectionId {
    pub high: u64,
    pub low: u64,
}

impl Default for ElectionId {
    fn default() -> Self {
        Self { high: 0, low: 1 }
    }
}

impl From<ElectionId> for Uint128 {
    fn from(id: ElectionId) -> Self {
        Uint128 {
            high: id.high,
            low: id.low,
        }
    }
}

/// TLS settings for the device channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// PEM CA certificate used to verify the device.
    pub ca_certificate: Option<PathBuf>,
    /// Overrides the name checked against the device certificate.
    pub domain_name: Option<String>,
}

/// Configuration for one P4Runtime session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Human-readable session name.
    pub name: Option<String>,
    /// Device address, `host:port`.
    pub address: String,
    /// P4Runtime device id.
    pub device_id: u64,
    /// Request log file; truncated when the session is created.
    pub proto_dump_file: Option<PathBuf>,
    pub election_id: ElectionId,
    pub connect_timeout_ms: Option<u64>,
    pub tls: Option<TlsSettings>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: None,
            address: DEFAULT_ADDRESS.to_string(),
            device_id: 0,
            proto_dump_file: None,
            election_id: ElectionId::default(),
            connect_timeout_ms: None,
            tls: None,
        }
    }
}

impl SessionConfig {
    pub fn new(address: impl Into<String>, device_id: u64) -> Self {
        Self {
            address: address.into(),
            device_id,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_proto_dump_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.proto_dump_file = Some(path.into());
        self
    }

    pub fn with_election_id(mut self, election_id: ElectionId) -> Self {
        self.election_id = election_id;
        self
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> P4rtResult<Self> {
        let config: SessionConfig = serde_yaml::from_str(yaml)
            .map_err(|e| P4rtError::Config(format!("Invalid session config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> P4rtResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Checks that the address looks like `host:port`.
    ///
    /// Reachability is left to the transport.
    pub fn validate(&self) -> P4rtResult<()> {
        let (host, port) = self
            .address
            .rsplit_once(':')
            .ok_or_else(|| P4rtError::Config(format!("Address '{}' has no port", self.address)))?;
        if host.is_empty() {
            return Err(P4rtError::Config(format!(
                "Address '{}' has no host",
                self.address
            )));
        }
        port.parse::<u16>().map_err(|_| {
            P4rtError::Config(format!("Address '{}' has an invalid port", self.address))
        })?;
        Ok(())
    }

    /// Name used in logs and errors: the configured name, else the address.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.address.clone())
    }

    pub(crate) fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            tls: self.tls.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.address, "127.0.0.1:50051");
        assert_eq!(config.device_id, 0);
        assert_eq!(config.election_id, ElectionId { high: 0, low: 1 });
        assert_eq!(config.display_name(), "127.0.0.1:50051");
    }

    #[test]
    fn test_from_yaml() {
        let config = SessionConfig::from_yaml_str(
            r#"
name: s1
address: 10.0.0.1:9559
device_id: 3
proto_dump_file: /tmp/s1.txt
election_id:
  low: 5
connect_timeout_ms: 2000
"#,
        )
        .unwrap();

        assert_eq!(config.display_name(), "s1");
        assert_eq!(config.device_id, 3);
        assert_eq!(config.election_id, ElectionId { high: 0, low: 5 });
        assert_eq!(config.proto_dump_file, Some(PathBuf::from("/tmp/s1.txt")));
        assert_eq!(
            config.channel_settings().connect_timeout,
            Some(Duration::from_millis(2000))
        );
    }

    #[test]
    fn test_yaml_rejects_bad_address() {
        assert!(SessionConfig::from_yaml_str("address: localhost").is_err());
        assert!(SessionConfig::from_yaml_str("address: ':50051'").is_err());
        assert!(SessionConfig::from_yaml_str("address: 'host:99999'").is_err());
    }

    #[test]
    fn test_yaml_rejects_negative_device_id() {
        assert!(SessionConfig::from_yaml_str("device_id: -1").is_err());
    }

    #[test]
    fn test_election_id_into_uint128() {
        let id: Uint128 = ElectionId { high: 2, low: 9 }.into();
        assert_eq!((id.high, id.low), (2, 9));
    }
}
