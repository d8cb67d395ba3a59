// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! YAML configuration parser with strict schema validation.
//!
//! Producer and consumer must agree on the namespace and region name, so
//! both read the same file. Any invalid field results in a ValidationError
//! before a single OS object is touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PcbError, PcbResult, ValidationError};
use crate::types::{validate_name_component, RegionName, DEFAULT_REGION_NAME};

/// Raw transport configuration as parsed from YAML (before validation).
#[derive(Debug, Deserialize)]
struct RawTransportConfig {
    #[serde(default = "default_namespace")]
    namespace: String,
    #[serde(default = "default_run_dir")]
    run_dir: String,
    #[serde(default = "default_region")]
    region: String,
}

fn default_namespace() -> String {
    if cfg!(windows) {
        // Session-independent kernel object namespace
        "Global".to_string()
    } else {
        "pcbshm".to_string()
    }
}

fn default_run_dir() -> String {
    "/var/run".to_string()
}

fn default_region() -> String {
    DEFAULT_REGION_NAME.to_string()
}

impl Default for RawTransportConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            run_dir: default_run_dir(),
            region: default_region(),
        }
    }
}

/// Raw reader configuration.
#[derive(Debug, Deserialize)]
struct RawReaderConfig {
    #[serde(default = "default_recall_timeout_ms")]
    recall_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
}

fn default_recall_timeout_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for RawReaderConfig {
    fn default() -> Self {
        Self {
            recall_timeout_ms: default_recall_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Raw root configuration file.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    transport: RawTransportConfig,
    #[serde(default)]
    reader: RawReaderConfig,
}

/// Validated transport configuration.
///
/// Shared by every backend: the native backends derive OS object names from
/// `namespace` + region name, the file backend additionally uses `run_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub namespace: String,
    pub run_dir: PathBuf,
    pub region: RegionName,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            run_dir: PathBuf::from(default_run_dir()),
            region: RegionName::default(),
        }
    }
}

impl TransportConfig {
    /// Copy of this configuration with a different namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Copy of this configuration with a different file backend directory.
    pub fn with_run_dir(mut self, run_dir: impl Into<PathBuf>) -> Self {
        self.run_dir = run_dir.into();
        self
    }
}

/// Validated reader configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Upper bound for one recall; `None` waits forever on the mutex.
    pub recall_timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            recall_timeout: Some(Duration::from_millis(default_recall_timeout_ms())),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
        }
    }
}

/// Complete validated configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub transport: TransportConfig,
    pub reader: ReaderConfig,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a YAML file.
    pub fn load_file(path: impl AsRef<Path>) -> PcbResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(PcbError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| PcbError::Io {
            context: "reading config file",
            source: e,
        })?;

        Self::load_string(&content)
    }

    /// Load and validate configuration from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn load_string(content: &str) -> PcbResult<Config> {
        if content.trim().is_empty() {
            return Self::validate(RawConfig::default());
        }

        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| PcbError::ConfigParse {
                message: format!("YAML parse error: {}", e),
            })?;

        Self::validate(raw)
    }

    /// Validate raw configuration and convert to validated types.
    fn validate(raw: RawConfig) -> PcbResult<Config> {
        let transport = Self::validate_transport(raw.transport)?;
        let reader = Self::validate_reader(raw.reader)?;

        Ok(Config { transport, reader })
    }

    /// Validate transport configuration.
    fn validate_transport(raw: RawTransportConfig) -> PcbResult<TransportConfig> {
        validate_name_component("namespace", &raw.namespace)?;

        let region = RegionName::new(&raw.region).map_err(|e| match e {
            ValidationError::InvalidFieldValue { value, reason, .. } => {
                ValidationError::InvalidFieldValue {
                    field: "transport.region",
                    value,
                    reason,
                }
            }
        })?;

        if raw.run_dir.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "run_dir",
                value: raw.run_dir,
                reason: "File backend directory cannot be empty".to_string(),
            }
            .into());
        }

        Ok(TransportConfig {
            namespace: raw.namespace,
            run_dir: PathBuf::from(raw.run_dir),
            region,
        })
    }

    /// Validate reader configuration.
    fn validate_reader(raw: RawReaderConfig) -> PcbResult<ReaderConfig> {
        // 1 hour max between polls
        const MIN_POLL_MS: u64 = 10;
        const MAX_POLL_MS: u64 = 3_600_000;

        if !(MIN_POLL_MS..=MAX_POLL_MS).contains(&raw.poll_interval_ms) {
            return Err(ValidationError::InvalidFieldValue {
                field: "poll_interval_ms",
                value: raw.poll_interval_ms.to_string(),
                reason: format!("Must be between {} and {}ms", MIN_POLL_MS, MAX_POLL_MS),
            }
            .into());
        }

        let recall_timeout = match raw.recall_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(ReaderConfig {
            recall_timeout,
            poll_interval: Duration::from_millis(raw.poll_interval_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CONFIG: &str = r#"
transport:
  namespace: board-a
  run_dir: /tmp/pcbshm
  region: Teensy2SharedMemory

reader:
  recall_timeout_ms: 250
  poll_interval_ms: 500
"#;

    #[test]
    fn test_valid_config() {
        let config = ConfigLoader::load_string(VALID_CONFIG).unwrap();
        assert_eq!(config.transport.namespace, "board-a");
        assert_eq!(config.transport.run_dir, PathBuf::from("/tmp/pcbshm"));
        assert_eq!(config.transport.region.as_str(), "Teensy2SharedMemory");
        assert_eq!(
            config.reader.recall_timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.reader.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_defaults_applied() {
        let yaml = r#"
transport:
  region: Teensy1SharedMemory
"#;
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.transport.namespace, default_namespace());
        assert_eq!(config.transport.run_dir, PathBuf::from("/var/run"));
        assert_eq!(config.reader, ReaderConfig::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = ConfigLoader::load_string("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let yaml = r#"
reader:
  recall_timeout_ms: 0
"#;
        let config = ConfigLoader::load_string(yaml).unwrap();
        assert_eq!(config.reader.recall_timeout, None);
    }

    #[test]
    fn test_invalid_namespace() {
        let yaml = r#"
transport:
  namespace: "Global\\pcb"
"#;
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_invalid_region() {
        let yaml = r#"
transport:
  region: ""
"#;
        let result = ConfigLoader::load_string(yaml);
        assert!(matches!(
            result,
            Err(PcbError::Validation(ValidationError::InvalidFieldValue {
                field: "transport.region",
                ..
            }))
        ));
    }

    #[test]
    fn test_poll_interval_out_of_bounds() {
        let yaml = r#"
reader:
  poll_interval_ms: 1
"#;
        assert!(ConfigLoader::load_string(yaml).is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        let result = ConfigLoader::load_string("transport: [unclosed");
        assert!(matches!(result, Err(PcbError::ConfigParse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::load_file("/nonexistent/pcbshm.yaml");
        assert!(matches!(result, Err(PcbError::ConfigNotFound { .. })));
    }
}
