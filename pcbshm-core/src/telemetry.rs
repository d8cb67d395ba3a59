// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Pressure PCB telemetry record and its wire formats.
//!
//! JSON is the shared memory format: keyed, order-independent and exact.
//! CSV is the logging format: 26 columns in a fixed order. The CSV layout
//! predates the third pressure sensor and never carried it, so `ps3` is
//! neither written nor read and a CSV round trip leaves it at its default.
//! The header also labels the ps4/ps5 pressure columns in bar although the
//! values are the same mbar readings as every other sensor; existing log
//! consumers depend on that header, so it is kept verbatim.
//!
//! Missing JSON keys decode as zero, so records from producers that predate
//! `teensy_on_ms` or `temp_raw` are accepted. Readings must be finite: JSON
//! has no encoding for NaN or infinity.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::TransportConfig;
use crate::error::{CodecError, PcbResult};
use crate::shm::SharedMemory;

/// CSV header matching [`PressurePcbData::to_csv`].
pub const PRESSURE_PCB_CSV_HEADERS: &str = "unix_sec,teensy_on_ms,\
ps1_pressure_mbar,ps1_temp_c,ps1_pressure_raw,ps1_temp_raw,ps1_error,\
ps2_pressure_mbar,ps2_temp_c,ps2_pressure_raw,ps2_temp_raw,ps2_error,\
ps4_pressure_bar,ps4_temp_c,ps4_pressure_raw,ps4_temp_raw,ps4_error,\
ps5_pressure_bar,ps5_temp_c,ps5_pressure_raw,ps5_temp_raw,ps5_error,\
htuTemp,htuHum,j1_analog_mv,j1_analog_raw";

/// Number of comma-separated values in one CSV record.
pub const PRESSURE_PCB_CSV_VALUE_COUNT: usize = 26;

/// One pressure sensor reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureSensorData {
    pub pressure_mbar: f32,
    pub temp: f32,
    pub pressure_raw: f32,
    pub temp_raw: f32,
    pub error: u8,
}

impl PressureSensorData {
    fn write_csv(&self, out: &mut String) {
        let _ = write!(
            out,
            "{:.6},{:.6},{:.6},{:.6},{}",
            self.pressure_mbar, self.temp, self.pressure_raw, self.temp_raw, self.error
        );
    }

    fn read_csv(fields: &mut CsvFields<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            pressure_mbar: fields.next_value()?,
            temp: fields.next_value()?,
            pressure_raw: fields.next_value()?,
            temp_raw: fields.next_value()?,
            error: fields.next_value()?,
        })
    }
}

/// HTU humidity/temperature sensor reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtuData {
    pub temp: f32,
    pub hum: f32,
}

impl HtuData {
    fn write_csv(&self, out: &mut String) {
        let _ = write!(out, "{:.6},{:.6}", self.temp, self.hum);
    }

    fn read_csv(fields: &mut CsvFields<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            temp: fields.next_value()?,
            hum: fields.next_value()?,
        })
    }
}

/// Analog input reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogData {
    pub mv: f32,
    pub raw: u32,
}

impl AnalogData {
    fn write_csv(&self, out: &mut String) {
        let _ = write!(out, "{:.6},{}", self.mv, self.raw);
    }

    fn read_csv(fields: &mut CsvFields<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            mv: fields.next_value()?,
            raw: fields.next_value()?,
        })
    }
}

/// A full snapshot from the pressure PCB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressurePcbData {
    pub unix_sec: u32,
    pub teensy_on_ms: u32,
    pub ps1: PressureSensorData,
    pub ps2: PressureSensorData,
    pub ps3: PressureSensorData,
    pub ps4: PressureSensorData,
    pub ps5: PressureSensorData,
    pub htu: HtuData,
    pub j1: AnalogData,
}

fn check_finite(group: &str, field: &str, value: f32) -> Result<(), CodecError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CodecError::NonFinite {
            field: format!("{}.{}", group, field),
            value,
        })
    }
}

impl PressureSensorData {
    fn check_finite(&self, group: &str) -> Result<(), CodecError> {
        check_finite(group, "pressure_mbar", self.pressure_mbar)?;
        check_finite(group, "temp", self.temp)?;
        check_finite(group, "pressure_raw", self.pressure_raw)?;
        check_finite(group, "temp_raw", self.temp_raw)
    }
}

/// Sequential reader over the columns of one CSV line.
struct CsvFields<'a> {
    values: std::str::Split<'a, char>,
    index: usize,
}

impl<'a> CsvFields<'a> {
    fn next_value<T>(&mut self) -> Result<T, CodecError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let index = self.index;
        self.index += 1;

        let raw = self.values.next().ok_or_else(|| CodecError::Field {
            index,
            reason: "missing value".to_string(),
        })?;

        raw.parse::<T>().map_err(|e| CodecError::Field {
            index,
            reason: format!(
                "error parsing {} from {:?}: {}",
                std::any::type_name::<T>(),
                raw,
                e
            ),
        })
    }
}

impl PressurePcbData {
    /// Encode as one CSV line (no trailing newline).
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(256);
        let _ = write!(out, "{},{},", self.unix_sec, self.teensy_on_ms);
        for sensor in [&self.ps1, &self.ps2, &self.ps4, &self.ps5] {
            sensor.write_csv(&mut out);
            out.push(',');
        }
        self.htu.write_csv(&mut out);
        out.push(',');
        self.j1.write_csv(&mut out);
        out
    }

    /// Decode one CSV line. `ps3` is left at its default.
    pub fn from_csv(line: &str) -> Result<Self, CodecError> {
        let line = line.trim_end_matches(['\r', '\n']);

        let count = line.split(',').count();
        if count != PRESSURE_PCB_CSV_VALUE_COUNT {
            return Err(CodecError::FieldCount {
                expected: PRESSURE_PCB_CSV_VALUE_COUNT,
                actual: count,
            });
        }

        let mut fields = CsvFields {
            values: line.split(','),
            index: 0,
        };

        Ok(Self {
            unix_sec: fields.next_value()?,
            teensy_on_ms: fields.next_value()?,
            ps1: PressureSensorData::read_csv(&mut fields)?,
            ps2: PressureSensorData::read_csv(&mut fields)?,
            ps3: PressureSensorData::default(),
            ps4: PressureSensorData::read_csv(&mut fields)?,
            ps5: PressureSensorData::read_csv(&mut fields)?,
            htu: HtuData::read_csv(&mut fields)?,
            j1: AnalogData::read_csv(&mut fields)?,
        })
    }

    /// Fail on the first NaN or infinite reading.
    pub fn check_finite(&self) -> Result<(), CodecError> {
        self.ps1.check_finite("ps1")?;
        self.ps2.check_finite("ps2")?;
        self.ps3.check_finite("ps3")?;
        self.ps4.check_finite("ps4")?;
        self.ps5.check_finite("ps5")?;
        check_finite("htu", "temp", self.htu.temp)?;
        check_finite("htu", "hum", self.htu.hum)?;
        check_finite("j1", "mv", self.j1.mv)
    }

    /// Encode as JSON bytes. Non-finite readings are rejected.
    pub fn to_json(&self) -> Result<Vec<u8>, CodecError> {
        self.check_finite()?;
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Store this record as JSON into an open region.
    pub fn store(&self, region: &SharedMemory) -> PcbResult<()> {
        let json = self.to_json()?;
        region.store(&json)?;
        Ok(())
    }

    /// Create the named region and store this record into it.
    ///
    /// The returned handle owns the region; keep it alive for as long as
    /// consumers should be able to read the snapshot.
    pub fn create_store(&self, name: &str, config: &TransportConfig) -> PcbResult<SharedMemory> {
        let region = SharedMemory::create_with(name, config)?;
        self.store(&region)?;
        tracing::debug!(name = %name, unix_sec = self.unix_sec, "Published telemetry snapshot");
        Ok(region)
    }

    /// Decode the record currently held by an open region.
    pub fn recall_from(region: &SharedMemory) -> PcbResult<Self> {
        let bytes = region.recall()?;
        Ok(Self::from_json(&bytes)?)
    }

    /// Open the named region read-only and decode its record.
    pub fn recall(name: &str, config: &TransportConfig) -> PcbResult<Self> {
        let region = SharedMemory::open_read_only_with(name, config)?;
        Self::recall_from(&region)
    }
}
