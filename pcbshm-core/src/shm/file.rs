// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! File-backed region for targets without a native named mapping.
//!
//! The region is a regular file in a well-known directory. There is no
//! cross-process locking: a store truncates and rewrites the file with
//! exactly the payload bytes, a recall reads the whole file. Concurrent
//! stores may interleave and a recall may observe a partially written file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::TransportConfig;
use crate::error::{ShmError, ShmResult};
use crate::shm::backend::RegionBackend;
use crate::shm::payload::{self, SHARED_DATA_BUFF_SIZE};
use crate::types::{AccessMode, HandleState, RegionName};

/// A region stored as a plain file.
#[derive(Debug)]
pub struct FileRegion {
    name: RegionName,
    path: PathBuf,
    mode: AccessMode,
    state: HandleState,
    is_owner: bool,
}

impl FileRegion {
    fn region_path(name: &RegionName, config: &TransportConfig) -> PathBuf {
        config
            .run_dir
            .join(format!("{}.{}", config.namespace, name.as_str()))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self, operation: &'static str) -> ShmResult<()> {
        if self.state.is_closed() {
            return Err(ShmError::Closed {
                name: self.name.to_string(),
                operation,
            });
        }
        Ok(())
    }
}

impl RegionBackend for FileRegion {
    fn create(name: &RegionName, config: &TransportConfig) -> ShmResult<Self> {
        let path = Self::region_path(name, config);

        // Create if missing, never truncate: an existing writer's data survives
        let created = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => true,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => false,
            Err(e) => {
                return Err(ShmError::AllocationFailed {
                    name: name.to_string(),
                    reason: format!("failed to create file {}: {}", path.display(), e),
                })
            }
        };

        tracing::debug!(
            name = %name,
            path = %path.display(),
            existed = !created,
            "Created file-backed region"
        );

        Ok(Self {
            name: name.clone(),
            path,
            mode: AccessMode::ReadWrite,
            state: HandleState::Created,
            is_owner: created,
        })
    }

    fn open(name: &RegionName, config: &TransportConfig, mode: AccessMode) -> ShmResult<Self> {
        // Lazy: the file may not exist yet, the first store or recall finds out
        let path = Self::region_path(name, config);

        tracing::debug!(name = %name, path = %path.display(), ?mode, "Opened file-backed region");

        Ok(Self {
            name: name.clone(),
            path,
            mode,
            state: HandleState::Opened,
            is_owner: false,
        })
    }

    fn store(&self, payload: &[u8]) -> ShmResult<()> {
        self.ensure_open("store")?;
        payload::validate_for_write(payload)?;

        if !self.mode.is_writable() {
            return Err(ShmError::WriteFailed {
                name: self.name.to_string(),
                reason: "handle was opened read-only".to_string(),
            });
        }

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| ShmError::WriteFailed {
                name: self.name.to_string(),
                reason: format!("failed to open file {}: {}", self.path.display(), e),
            })?;

        file.write_all(payload).map_err(|e| ShmError::WriteFailed {
            name: self.name.to_string(),
            reason: format!("failed to write data to file: {}", e),
        })?;

        tracing::trace!(name = %self.name, len = payload.len(), "Stored payload");
        Ok(())
    }

    fn recall(&self) -> ShmResult<Vec<u8>> {
        self.ensure_open("recall")?;

        let data = std::fs::read(&self.path).map_err(|e| ShmError::ReadFailed {
            name: self.name.to_string(),
            reason: format!("failed to open file {}: {}", self.path.display(), e),
        })?;

        if data.len() > SHARED_DATA_BUFF_SIZE {
            return Err(ShmError::ReadFailed {
                name: self.name.to_string(),
                reason: format!(
                    "region file holds {} bytes, capacity is {}",
                    data.len(),
                    SHARED_DATA_BUFF_SIZE
                ),
            });
        }

        tracing::trace!(name = %self.name, len = data.len(), "Recalled payload");
        Ok(data)
    }

    fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.state = HandleState::Closed;

        if !self.is_owner {
            return;
        }

        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(name = %self.name, "Removed file-backed region"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                name = %self.name,
                path = %self.path.display(),
                error = %e,
                "Failed to remove region file"
            ),
        }
    }

    fn name(&self) -> &RegionName {
        &self.name
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn state(&self) -> HandleState {
        self.state
    }

    fn is_owner(&self) -> bool {
        self.is_owner
    }
}

impl Drop for FileRegion {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TransportConfig) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = TransportConfig::default()
            .with_namespace("pcbshm-test")
            .with_run_dir(dir.path());
        (dir, config)
    }

    fn name(s: &str) -> RegionName {
        RegionName::new(s).unwrap()
    }

    #[test]
    fn test_store_recall_round_trip() {
        let (_dir, config) = setup();
        let region = FileRegion::create(&name("roundtrip"), &config).unwrap();

        region.store(b"Hello, World!").unwrap();
        assert_eq!(region.recall().unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_store_is_exact_with_zero_bytes() {
        let (_dir, config) = setup();
        let region = FileRegion::create(&name("zeros"), &config).unwrap();

        region.store(b"abc\0def").unwrap();
        assert_eq!(region.recall().unwrap(), b"abc\0def");
    }

    #[test]
    fn test_store_truncates_previous_payload() {
        let (_dir, config) = setup();
        let region = FileRegion::create(&name("truncate"), &config).unwrap();

        region.store(&[b'A'; 200]).unwrap();
        region.store(b"B").unwrap();
        assert_eq!(region.recall().unwrap(), b"B");
    }

    #[test]
    fn test_capacity_boundary() {
        let (_dir, config) = setup();
        let region = FileRegion::create(&name("capacity"), &config).unwrap();

        let full = vec![b'x'; SHARED_DATA_BUFF_SIZE];
        region.store(&full).unwrap();
        assert_eq!(region.recall().unwrap(), full);

        let too_big = vec![b'x'; SHARED_DATA_BUFF_SIZE + 1];
        assert!(matches!(
            region.store(&too_big),
            Err(ShmError::PayloadTooLarge { .. })
        ));
        // Rejected store leaves the previous payload in place
        assert_eq!(region.recall().unwrap(), full);
    }

    #[test]
    fn test_create_keeps_existing_data() {
        let (_dir, config) = setup();
        let first = FileRegion::create(&name("recreate"), &config).unwrap();
        first.store(b"keep me").unwrap();

        let second = FileRegion::create(&name("recreate"), &config).unwrap();
        assert!(first.is_owner());
        assert!(!second.is_owner());
        assert_eq!(second.recall().unwrap(), b"keep me");

        // Only the first creator removes the file
        drop(second);
        assert!(first.path().exists());
        assert_eq!(first.recall().unwrap(), b"keep me");
    }

    #[test]
    fn test_open_is_lazy() {
        let (_dir, config) = setup();
        let accessor = FileRegion::open(&name("missing"), &config, AccessMode::ReadWrite).unwrap();

        assert!(matches!(
            accessor.recall(),
            Err(ShmError::ReadFailed { .. })
        ));
        assert!(matches!(
            accessor.store(b"data"),
            Err(ShmError::WriteFailed { .. })
        ));
    }

    #[test]
    fn test_accessor_sees_owner_data() {
        let (_dir, config) = setup();
        let owner = FileRegion::create(&name("shared"), &config).unwrap();
        let accessor = FileRegion::open(&name("shared"), &config, AccessMode::ReadOnly).unwrap();

        owner.store(b"from owner").unwrap();
        assert_eq!(accessor.recall().unwrap(), b"from owner");
        assert!(!accessor.is_owner());
    }

    #[test]
    fn test_read_only_rejects_store() {
        let (_dir, config) = setup();
        let _owner = FileRegion::create(&name("readonly"), &config).unwrap();
        let accessor = FileRegion::open(&name("readonly"), &config, AccessMode::ReadOnly).unwrap();

        assert!(matches!(
            accessor.store(b"nope"),
            Err(ShmError::WriteFailed { .. })
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_dir, config) = setup();
        let mut region = FileRegion::create(&name("close"), &config).unwrap();
        let path = region.path().to_path_buf();

        region.close();
        region.close();

        assert_eq!(region.state(), HandleState::Closed);
        assert!(!path.exists());
        assert!(matches!(region.recall(), Err(ShmError::Closed { .. })));
    }

    #[test]
    fn test_accessor_close_keeps_file() {
        let (_dir, config) = setup();
        let owner = FileRegion::create(&name("keep"), &config).unwrap();
        let mut accessor = FileRegion::open(&name("keep"), &config, AccessMode::ReadWrite).unwrap();

        accessor.close();
        assert!(owner.path().exists());
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let (dir, config) = setup();
        let config = config.with_run_dir(dir.path().join("does-not-exist"));

        assert!(matches!(
            FileRegion::create(&name("nodir"), &config),
            Err(ShmError::AllocationFailed { .. })
        ));
    }
}
