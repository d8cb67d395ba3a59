//! PCB Shared Memory Core Library
//!
//! Moves the latest pressure PCB telemetry snapshot between processes on
//! one machine through a small named shared memory region. Provides the
//! region transport, the telemetry codec and configuration parsing.

pub mod config;
pub mod error;
pub mod shm;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigLoader, ReaderConfig, TransportConfig};
pub use error::{CodecError, PcbError, PcbResult, ShmError, ShmResult, ValidationError};
pub use shm::{SharedMemory, BACKEND, SHARED_DATA_BUFF_SIZE};
pub use telemetry::{
    AnalogData, HtuData, PressurePcbData, PressureSensorData, PRESSURE_PCB_CSV_HEADERS,
    PRESSURE_PCB_CSV_VALUE_COUNT,
};
pub use types::{AccessMode, HandleState, RegionName};
