// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Native region backend for Windows.
//!
//! A paging-file-backed file mapping object holds the payload and a named
//! mutex serializes access. Both live in the configured kernel object
//! namespace (`Global` by default) so every session resolves the same
//! objects. Named kernel objects are reference counted by the OS: they
//! disappear once the last handle in any process is closed.

use std::ptr;

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, ERROR_FILE_NOT_FOUND, HANDLE,
    INVALID_HANDLE_VALUE, WAIT_ABANDONED, WAIT_FAILED, WAIT_OBJECT_0,
};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_READ,
    FILE_MAP_WRITE, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
};
use windows_sys::Win32::System::Threading::{
    CreateMutexW, OpenMutexW, ReleaseMutex, WaitForSingleObject, INFINITE, MUTEX_MODIFY_STATE,
    SYNCHRONIZATION_SYNCHRONIZE,
};

use crate::config::TransportConfig;
use crate::error::{ShmError, ShmResult};
use crate::shm::backend::RegionBackend;
use crate::shm::payload::{self, SHARED_DATA_BUFF_SIZE};
use crate::types::{AccessMode, HandleState, RegionName};

/// NUL-terminated UTF-16 string for the W APIs.
fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn last_error() -> std::io::Error {
    std::io::Error::last_os_error()
}

/// Kernel object names derived from namespace + logical name.
struct ResourceNames {
    /// `{namespace}\{name}`
    region: Vec<u16>,
    /// `{namespace}\{name}Mutex`
    mutex: Vec<u16>,
}

impl ResourceNames {
    fn new(name: &RegionName, config: &TransportConfig) -> Self {
        let base = format!("{}\\{}", config.namespace, name.as_str());
        Self {
            mutex: wide(&format!("{}Mutex", base)),
            region: wide(&base),
        }
    }
}

/// An owned kernel handle, closed on drop.
struct OwnedHandle(HANDLE);

// SAFETY: kernel handles are process-wide values usable from any thread.
unsafe impl Send for OwnedHandle {}

// SAFETY: see Send; the handle value itself is never mutated.
unsafe impl Sync for OwnedHandle {}

impl OwnedHandle {
    fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: the handle was returned by a successful Create*/Open* call
        if unsafe { CloseHandle(self.0) } == 0 {
            tracing::warn!(error = %last_error(), "Failed to close kernel handle");
        }
    }
}

/// Held mutex; released on drop.
///
/// Win32 mutexes are owned by the acquiring thread, so the guard never
/// leaves the call that created it.
struct MutexGuard<'a> {
    mutex: &'a OwnedHandle,
    region: &'a RegionName,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard only exists after this thread acquired the mutex
        if unsafe { ReleaseMutex(self.mutex.raw()) } == 0 {
            tracing::error!(
                name = %self.region,
                error = %last_error(),
                "Failed to release region mutex"
            );
        }
    }
}

/// A view of the whole region, unmapped on drop.
struct MappedView {
    addr: MEMORY_MAPPED_VIEW_ADDRESS,
}

impl MappedView {
    fn map(mapping: &OwnedHandle, writable: bool, region: &RegionName) -> ShmResult<Self> {
        let access = if writable {
            FILE_MAP_READ | FILE_MAP_WRITE
        } else {
            FILE_MAP_READ
        };

        // SAFETY: mapping is a live file mapping handle of SHARED_DATA_BUFF_SIZE bytes
        let addr = unsafe { MapViewOfFile(mapping.raw(), access, 0, 0, SHARED_DATA_BUFF_SIZE) };
        if addr.Value.is_null() {
            return Err(ShmError::MapFailed {
                name: region.to_string(),
                reason: format!("MapViewOfFile failed: {}", last_error()),
            });
        }

        Ok(Self { addr })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: the view covers SHARED_DATA_BUFF_SIZE readable bytes
        unsafe { std::slice::from_raw_parts(self.addr.Value as *const u8, SHARED_DATA_BUFF_SIZE) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: only called on FILE_MAP_WRITE views, while the region mutex is held
        unsafe { std::slice::from_raw_parts_mut(self.addr.Value as *mut u8, SHARED_DATA_BUFF_SIZE) }
    }
}

impl Drop for MappedView {
    fn drop(&mut self) {
        // SAFETY: addr is the base address returned by MapViewOfFile
        if unsafe { UnmapViewOfFile(self.addr) } == 0 {
            tracing::error!(error = %last_error(), "Failed to unmap shared memory view");
        }
    }
}

/// Windows region: file mapping object + named mutex.
pub struct WindowsRegion {
    name: RegionName,
    mapping: Option<OwnedHandle>,
    mutex: Option<OwnedHandle>,
    mode: AccessMode,
    state: HandleState,
    is_owner: bool,
}

impl WindowsRegion {
    fn resources(&self, operation: &'static str) -> ShmResult<(&OwnedHandle, &OwnedHandle)> {
        match (&self.mapping, &self.mutex) {
            (Some(mapping), Some(mutex)) => Ok((mapping, mutex)),
            _ => Err(ShmError::Closed {
                name: self.name.to_string(),
                operation,
            }),
        }
    }

    /// Block until the mutex is acquired. No timeout.
    fn lock<'a>(&'a self, mutex: &'a OwnedHandle) -> ShmResult<MutexGuard<'a>> {
        // SAFETY: mutex is a live handle with SYNCHRONIZE access
        let result = unsafe { WaitForSingleObject(mutex.raw(), INFINITE) };
        match result {
            WAIT_OBJECT_0 => {}
            WAIT_ABANDONED => {
                // Previous holder died; ownership passes to us and every store
                // rewrites the whole buffer anyway
                tracing::warn!(name = %self.name, "Acquired abandoned region mutex");
            }
            WAIT_FAILED => {
                return Err(ShmError::LockFailed {
                    name: self.name.to_string(),
                    operation: "acquire",
                    reason: format!("WaitForSingleObject failed: {}", last_error()),
                })
            }
            other => {
                return Err(ShmError::LockFailed {
                    name: self.name.to_string(),
                    operation: "acquire",
                    reason: format!("unexpected wait result {:#x}", other),
                })
            }
        }

        Ok(MutexGuard {
            mutex,
            region: &self.name,
        })
    }
}

impl RegionBackend for WindowsRegion {
    fn create(name: &RegionName, config: &TransportConfig) -> ShmResult<Self> {
        let names = ResourceNames::new(name, config);

        // SAFETY: names are NUL-terminated UTF-16; null attributes are allowed.
        // An existing mutex is returned with ERROR_ALREADY_EXISTS, which is fine.
        let mutex = unsafe { CreateMutexW(ptr::null(), 0, names.mutex.as_ptr()) };
        if mutex.is_null() {
            return Err(ShmError::AllocationFailed {
                name: name.to_string(),
                reason: format!("CreateMutex failed: {}", last_error()),
            });
        }
        let mutex = OwnedHandle(mutex);

        // SAFETY: INVALID_HANDLE_VALUE selects the system paging file
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                ptr::null(),
                PAGE_READWRITE,
                0,
                SHARED_DATA_BUFF_SIZE as u32,
                names.region.as_ptr(),
            )
        };
        // SAFETY: reads the calling thread's last error
        let existed = unsafe { GetLastError() } == ERROR_ALREADY_EXISTS;
        if mapping.is_null() {
            return Err(ShmError::AllocationFailed {
                name: name.to_string(),
                reason: format!("CreateFileMapping failed: {}", last_error()),
            });
        }

        tracing::debug!(name = %name, namespace = %config.namespace, existed, "Created shared memory region");

        Ok(Self {
            name: name.clone(),
            mapping: Some(OwnedHandle(mapping)),
            mutex: Some(mutex),
            mode: AccessMode::ReadWrite,
            state: HandleState::Created,
            is_owner: !existed,
        })
    }

    fn open(name: &RegionName, config: &TransportConfig, mode: AccessMode) -> ShmResult<Self> {
        let names = ResourceNames::new(name, config);

        let not_found_or = |what: &str, err: std::io::Error| {
            if err.raw_os_error() == Some(ERROR_FILE_NOT_FOUND as i32) {
                ShmError::NotFound {
                    name: name.to_string(),
                    reason: format!("{} does not exist", what),
                }
            } else {
                ShmError::MapFailed {
                    name: name.to_string(),
                    reason: format!("{} failed: {}", what, err),
                }
            }
        };

        // SAFETY: names are NUL-terminated UTF-16
        let mutex = unsafe {
            OpenMutexW(
                SYNCHRONIZATION_SYNCHRONIZE | MUTEX_MODIFY_STATE,
                0,
                names.mutex.as_ptr(),
            )
        };
        if mutex.is_null() {
            return Err(not_found_or("OpenMutex", last_error()));
        }
        let mutex = OwnedHandle(mutex);

        let access = if mode.is_writable() {
            FILE_MAP_READ | FILE_MAP_WRITE
        } else {
            FILE_MAP_READ
        };

        // SAFETY: names are NUL-terminated UTF-16
        let mapping = unsafe { OpenFileMappingW(access, 0, names.region.as_ptr()) };
        if mapping.is_null() {
            return Err(not_found_or("OpenFileMapping", last_error()));
        }

        tracing::debug!(name = %name, ?mode, "Opened shared memory region");

        Ok(Self {
            name: name.clone(),
            mapping: Some(OwnedHandle(mapping)),
            mutex: Some(mutex),
            mode,
            state: HandleState::Opened,
            is_owner: false,
        })
    }

    fn store(&self, payload: &[u8]) -> ShmResult<()> {
        let (mapping, mutex) = self.resources("store")?;
        payload::validate_for_write(payload)?;

        if !self.mode.is_writable() {
            return Err(ShmError::WriteFailed {
                name: self.name.to_string(),
                reason: "handle was opened read-only".to_string(),
            });
        }

        let _lock = self.lock(mutex)?;
        let mut view = MappedView::map(mapping, true, &self.name)?;
        payload::encode_into(view.as_mut_slice(), payload);

        tracing::trace!(name = %self.name, len = payload.len(), "Stored payload");
        Ok(())
    }

    fn recall(&self) -> ShmResult<Vec<u8>> {
        let (mapping, mutex) = self.resources("recall")?;

        let _lock = self.lock(mutex)?;
        let view = MappedView::map(mapping, false, &self.name)?;
        let data = payload::decode_from(view.as_slice());

        tracing::trace!(name = %self.name, len = data.len(), "Recalled payload");
        Ok(data)
    }

    fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.state = HandleState::Closed;

        // Dropping the handles closes them; the kernel destroys the named
        // objects once no process holds a handle
        self.mapping = None;
        self.mutex = None;

        tracing::debug!(name = %self.name, owner = self.is_owner, "Closed shared memory region");
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

impl Drop for WindowsRegion {
    fn drop(&mut self) {
        self.close();
    }
}
