// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use pcbshm_core::{
    CodecError, Config, ConfigLoader, PcbResult, PressurePcbData, SharedMemory, TransportConfig,
    PRESSURE_PCB_CSV_HEADERS,
};

pub mod publish;
pub mod read;
pub mod validate;
pub mod watch;

/// Record format on stdin/stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Csv,
}

impl Format {
    /// Decode one input line into a record that can be published.
    pub fn parse(self, line: &str) -> Result<PressurePcbData, CodecError> {
        let record = match self {
            Format::Json => PressurePcbData::from_json(line.as_bytes())?,
            Format::Csv => PressurePcbData::from_csv(line)?,
        };
        record.check_finite()?;
        Ok(record)
    }

    /// Encode one output line (no trailing newline).
    pub fn render(self, data: &PressurePcbData) -> Result<String, CodecError> {
        match self {
            Format::Json => Ok(String::from_utf8_lossy(&data.to_json()?).into_owned()),
            Format::Csv => Ok(data.to_csv()),
        }
    }

    /// Print the CSV header when requested and meaningful.
    pub fn print_header(self, header: bool) {
        if header && self == Format::Csv {
            println!("{}", PRESSURE_PCB_CSV_HEADERS);
        }
    }
}

/// Load the configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&str>) -> PcbResult<Config> {
    match path {
        Some(path) => {
            tracing::debug!(config = %path, "Loading configuration");
            ConfigLoader::load_file(path)
        }
        None => Ok(Config::default()),
    }
}

/// Region name from the command line, falling back to the configuration.
pub fn region_name(name: Option<&str>, config: &Config) -> String {
    name.map(str::to_string)
        .unwrap_or_else(|| config.transport.region.to_string())
}

/// Open the region read-only and decode the snapshot it holds.
///
/// `timeout` bounds the wait for the region mutex; `None` waits forever.
pub async fn recall_snapshot(
    name: &str,
    transport: &TransportConfig,
    timeout: Option<Duration>,
) -> PcbResult<PressurePcbData> {
    let region = Arc::new(SharedMemory::open_read_only_with(name, transport)?);

    let bytes = match timeout {
        Some(timeout) => region.recall_timeout(timeout).await?,
        None => region.recall()?,
    };

    Ok(PressurePcbData::from_json(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_and_render() {
        let data = PressurePcbData {
            unix_sec: 7,
            ..Default::default()
        };

        let json = Format::Json.render(&data).unwrap();
        assert!(json.starts_with('{'));
        assert_eq!(Format::Json.parse(&json).unwrap(), data);

        let csv = Format::Csv.render(&data).unwrap();
        assert!(csv.starts_with("7,0,"));
        assert_eq!(Format::Csv.parse(&csv).unwrap(), data);
    }

    #[test]
    fn test_format_parse_error() {
        assert!(Format::Csv.parse("1,2,3").is_err());
        assert!(Format::Json.parse("1,2,3").is_err());
    }

    #[test]
    fn test_format_parse_rejects_non_finite() {
        let line = PressurePcbData::default()
            .to_csv()
            .replacen("0.000000", "inf", 1);
        assert!(matches!(
            Format::Csv.parse(&line),
            Err(CodecError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_region_name_override() {
        let config = Config::default();
        assert_eq!(region_name(None, &config), "Teensy1SharedMemory");
        assert_eq!(region_name(Some("Other"), &config), "Other");
    }

    #[test]
    fn test_default_config_without_file() {
        assert_eq!(load_config(None).unwrap(), Config::default());
    }
}
