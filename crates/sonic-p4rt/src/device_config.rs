//! Device-family configuration builders.
//!
//! A pipeline push carries a target-specific blob next to the P4Info. Each
//! device family supplies a [`DeviceConfigBuilder`] that turns build
//! parameters into that blob. The session holds one builder, chosen at
//! construction, and calls it before any network activity.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use prost::Message;
use thiserror::Error;

use sonic_p4rt_proto::tmp::P4DeviceConfig;

/// Errors produced while building a device config.
#[derive(Debug, Error)]
pub enum ConfigBuildError {
    /// A required build parameter was not supplied.
    #[error("Missing device config parameter '{0}'")]
    MissingParam(String),

    /// A build input could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// The file that failed to load.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The parameters were present but unusable.
    #[error("Invalid device config parameter '{param}': {message}")]
    InvalidParam {
        /// The offending parameter.
        param: String,
        /// Error message.
        message: String,
    },
}

/// Ordered build parameters for a device config.
///
/// Ordering is stable so builders see identical input for identical params.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfigParams(BTreeMap<String, String>);

impl DeviceConfigParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the parameter or a [`ConfigBuildError::MissingParam`].
    pub fn require(&self, key: &str) -> Result<&str, ConfigBuildError> {
        self.get(key)
            .ok_or_else(|| ConfigBuildError::MissingParam(key.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DeviceConfigParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Builds the target-specific part of a forwarding pipeline config.
///
/// Implementations must be deterministic for a given set of params.
pub trait DeviceConfigBuilder: Send + Sync + fmt::Debug {
    /// Device family name (for logging).
    fn family(&self) -> &str;

    /// Produces the encoded device config.
    fn build(&self, params: &DeviceConfigParams) -> Result<Vec<u8>, ConfigBuildError>;
}

/// BMv2 `simple_switch_grpc`.
///
/// Reads the compiler's JSON output from the `bmv2_json` parameter and wraps
/// it in a `P4DeviceConfig` envelope with `reassign` set.
#[derive(Debug, Clone, Default)]
pub struct Bmv2DeviceConfig;

impl Bmv2DeviceConfig {
    /// Parameter naming the BMv2 JSON file.
    pub const JSON_PARAM: &'static str = "bmv2_json";
}

impl DeviceConfigBuilder for Bmv2DeviceConfig {
    fn family(&self) -> &str {
        "bmv2"
    }

    fn build(&self, params: &DeviceConfigParams) -> Result<Vec<u8>, ConfigBuildError> {
        let path = PathBuf::from(params.require(Self::JSON_PARAM)?);
        let device_data = std::fs::read(&path).map_err(|source| ConfigBuildError::Read {
            path: path.clone(),
            source,
        })?;

        let config = P4DeviceConfig {
            reassign: true,
            device_data,
        };
        Ok(config.encode_to_vec())
    }
}

/// Families whose blob is produced out of band: the payload is used as-is.
#[derive(Debug, Clone, Default)]
pub struct PassthroughDeviceConfig {
    family: String,
    payload: Vec<u8>,
}

impl PassthroughDeviceConfig {
    pub fn new(family: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            family: family.into(),
            payload,
        }
    }
}

impl DeviceConfigBuilder for PassthroughDeviceConfig {
    fn family(&self) -> &str {
        &self.family
    }

    fn build(&self, _params: &DeviceConfigParams) -> Result<Vec<u8>, ConfigBuildError> {
        Ok(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_params_are_ordered() {
        let a: DeviceConfigParams = [("b", "2"), ("a", "1")].into_iter().collect();
        let b = DeviceConfigParams::new().with("a", "1").with("b", "2");
        assert_eq!(a, b);
        assert_eq!(a.get("a"), Some("1"));
        assert!(a.require("c").is_err());
    }

    #[test]
    fn test_bmv2_wraps_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"header_types": []}"#).unwrap();
        let params = DeviceConfigParams::new()
            .with(Bmv2DeviceConfig::JSON_PARAM, file.path().to_string_lossy());

        let builder = Bmv2DeviceConfig;
        let first = builder.build(&params).unwrap();
        let second = builder.build(&params).unwrap();
        assert_eq!(first, second);

        let decoded = P4DeviceConfig::decode(first.as_slice()).unwrap();
        assert!(decoded.reassign);
        assert_eq!(decoded.device_data, br#"{"header_types": []}"#.to_vec());
    }

    #[test]
    fn test_bmv2_missing_param() {
        let err = Bmv2DeviceConfig.build(&DeviceConfigParams::new()).unwrap_err();
        assert!(matches!(err, ConfigBuildError::MissingParam(ref p) if p == "bmv2_json"));
    }

    #[test]
    fn test_bmv2_unreadable_file() {
        let params = DeviceConfigParams::new().with("bmv2_json", "/nonexistent/switch.json");
        let err = Bmv2DeviceConfig.build(&params).unwrap_err();
        assert!(matches!(err, ConfigBuildError::Read { .. }));
    }

    #[test]
    fn test_passthrough() {
        let builder = PassthroughDeviceConfig::new("tofino", vec![1, 2, 3]);
        assert_eq!(builder.family(), "tofino");
        assert_eq!(builder.build(&DeviceConfigParams::new()).unwrap(), vec![1, 2, 3]);
    }
}
