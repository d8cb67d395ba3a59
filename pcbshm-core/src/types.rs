// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! Following the "Newtype" pattern in Rust to ensure valid state by construction.
//! All types validate their invariants at creation time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of a logical region name or namespace.
///
/// POSIX limits shm and semaphore names to NAME_MAX (255) including the
/// namespace, separators and the `sem.` prefix glibc adds.
pub const MAX_NAME_LEN: usize = 100;

/// Default logical region name used by the producer board.
pub const DEFAULT_REGION_NAME: &str = "Teensy1SharedMemory";

/// Validate a name component (region name or namespace).
pub(crate) fn validate_name_component(
    field: &'static str,
    value: &str,
) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::InvalidFieldValue {
            field,
            value: value.to_string(),
            reason: "Name cannot be empty".to_string(),
        });
    }

    if value.len() > MAX_NAME_LEN {
        return Err(ValidationError::InvalidFieldValue {
            field,
            value: value.to_string(),
            reason: format!("Name too long: {} chars (max {})", value.len(), MAX_NAME_LEN),
        });
    }

    // Slashes and backslashes are path/namespace separators on every platform
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::InvalidFieldValue {
            field,
            value: value.to_string(),
            reason: "Name must contain only ASCII alphanumeric characters, '-', '_' and '.'"
                .to_string(),
        });
    }

    Ok(())
}

/// Validated logical region name.
///
/// The same logical name resolves to the same OS objects in every process
/// once it is combined with the configured namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionName(String);

impl RegionName {
    /// Create a new RegionName with validation.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_name_component("region", &name)?;
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RegionName {
    fn default() -> Self {
        Self(DEFAULT_REGION_NAME.to_string())
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for RegionName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegionName> for String {
    fn from(name: RegionName) -> Self {
        name.0
    }
}

/// How a handle may touch the region's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    /// Store and recall.
    ReadWrite,
    /// Recall only; stores are rejected.
    ReadOnly,
}

impl AccessMode {
    pub const fn is_writable(&self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// Lifecycle of a region handle.
///
/// Uninitialized → Created (owner) | Opened (accessor) → Closed.
/// The uninitialized state is never observable: constructors return a
/// handle that is already Created or Opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleState {
    /// Handle allocated the OS resources and tears them down on close.
    Created,
    /// Handle resolved existing resources by name.
    Opened,
    /// Handle released its resources; further use fails.
    Closed,
}

impl HandleState {
    /// Get the state name for log messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Opened => "Opened",
            Self::Closed => "Closed",
        }
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_name_valid() {
        assert!(RegionName::new("Teensy1SharedMemory").is_ok());
        assert!(RegionName::new("pressure-pcb_2.data").is_ok());
        assert!(RegionName::new("a".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_region_name_invalid() {
        assert!(RegionName::new("").is_err());
        assert!(RegionName::new("a".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(RegionName::new("Global\\Teensy").is_err());
        assert!(RegionName::new("/dev/shm").is_err());
        assert!(RegionName::new("with space").is_err());
        assert!(RegionName::new("nul\0byte").is_err());
    }

    #[test]
    fn test_region_name_default() {
        assert_eq!(RegionName::default().as_str(), DEFAULT_REGION_NAME);
    }

    #[test]
    fn test_region_name_deserialize_validates() {
        let ok: Result<RegionName, _> = serde_json::from_str("\"Teensy1\"");
        assert!(ok.is_ok());
        let bad: Result<RegionName, _> = serde_json::from_str("\"bad/name\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_access_mode() {
        assert!(AccessMode::ReadWrite.is_writable());
        assert!(!AccessMode::ReadOnly.is_writable());
    }
}
