//! Custom error types for pcbshm.
//!
//! Library errors are typed enums layered under `PcbError`: config problems,
//! transport failures and codec failures each have their own enum.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for pcbshm.
/// All errors are explicit variants - no catch-all or generic handling.
#[derive(Debug, Error)]
pub enum PcbError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Shared Memory Errors - Never Retried Internally
    // =========================================================================
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] ShmError),

    // =========================================================================
    // Telemetry Codec Errors
    // =========================================================================
    #[error("Malformed payload: {0}")]
    Codec(#[from] CodecError),

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Validation errors for configuration values and region names.
/// Raised at load time so an invalid setup never reaches the OS.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Shared memory transport errors.
///
/// Every variant names the region and, where the OS reported one, the
/// underlying error text.
#[derive(Debug, Error)]
pub enum ShmError {
    #[error("Failed to allocate shared memory region: {name} - {reason}")]
    AllocationFailed { name: String, reason: String },

    #[error("Shared memory region not found: {name} - {reason}")]
    NotFound { name: String, reason: String },

    #[error("Payload size exceeds capacity: {size} > {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Failed to write shared memory region {name}: {reason}")]
    WriteFailed { name: String, reason: String },

    #[error("Failed to read shared memory region {name}: {reason}")]
    ReadFailed { name: String, reason: String },

    #[error("Failed to map shared memory region {name}: {reason}")]
    MapFailed { name: String, reason: String },

    #[error("Mutex {operation} failed for region {name}: {reason}")]
    LockFailed {
        name: String,
        operation: &'static str,
        reason: String,
    },

    #[error("Invalid region name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Cannot {operation} region {name}: handle is closed")]
    Closed {
        name: String,
        operation: &'static str,
    },

    #[error("Recall from region {name} did not complete within {timeout_ms}ms")]
    TimedOut { name: String, timeout_ms: u64 },
}

/// Telemetry codec errors - the bytes or text do not describe a record.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Expected {expected} values from csv, but got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("Error reading item num {index}: {reason}")]
    Field { index: usize, reason: String },

    #[error("Non-finite value in {field}: {value}")]
    NonFinite { field: String, value: f32 },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for transport operations.
pub type ShmResult<T> = Result<T, ShmError>;

/// Result type alias using PcbError.
pub type PcbResult<T> = Result<T, PcbError>;
