// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Native region backend for Linux.
//!
//! A POSIX shared memory object of exactly `SHARED_DATA_BUFF_SIZE` bytes holds
//! the payload and a named POSIX semaphore with an initial count of one acts as
//! the systemwide mutex. Every store and recall is a critical section:
//! lock, map, operate, unmap, unlock. The guards below release the mapping and
//! the semaphore on every exit path, in that order.

use std::ffi::{c_void, CString};
use std::fs::File;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;

use crate::config::TransportConfig;
use crate::error::{ShmError, ShmResult};
use crate::shm::backend::RegionBackend;
use crate::shm::payload::{self, SHARED_DATA_BUFF_SIZE};
use crate::types::{AccessMode, HandleState, RegionName};

const MAP_LEN: NonZeroUsize = match NonZeroUsize::new(SHARED_DATA_BUFF_SIZE) {
    Some(len) => len,
    None => panic!("region capacity must be non-zero"),
};

/// OS object names derived from namespace + logical name.
#[derive(Debug)]
struct ResourceNames {
    /// `/{namespace}.{name}`
    region: CString,
    /// `/{namespace}.{name}.mutex`
    mutex: CString,
}

impl ResourceNames {
    fn new(name: &RegionName, config: &TransportConfig) -> ShmResult<Self> {
        let base = format!("/{}.{}", config.namespace, name.as_str());
        let to_c = |s: String| {
            CString::new(s).map_err(|e| ShmError::InvalidName {
                name: name.to_string(),
                reason: e.to_string(),
            })
        };

        Ok(Self {
            mutex: to_c(format!("{}.mutex", base))?,
            region: to_c(base)?,
        })
    }
}

/// Named POSIX semaphore used as a binary, cross-process mutex.
struct NamedSemaphore {
    sem: NonNull<libc::sem_t>,
}

// SAFETY: a sem_t returned by sem_open is process-wide and every sem_* call on
// it is thread-safe.
unsafe impl Send for NamedSemaphore {}

// SAFETY: see Send; shared references only call sem_wait and sem_post.
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Create the semaphore, or attach to it if another process already did.
    ///
    /// Returns whether this call created it.
    fn create(region: &RegionName, name: &CString) -> ShmResult<(Self, bool)> {
        loop {
            // SAFETY: name is a valid CString; O_CREAT requires mode and initial value
            let sem = unsafe {
                libc::sem_open(
                    name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL,
                    0o600 as libc::c_uint,
                    1 as libc::c_uint,
                )
            };

            if sem != libc::SEM_FAILED {
                return NonNull::new(sem)
                    .map(|sem| (Self { sem }, true))
                    .ok_or_else(|| ShmError::AllocationFailed {
                        name: region.to_string(),
                        reason: "sem_open returned null".to_string(),
                    });
            }

            match Errno::last() {
                Errno::EEXIST => match Self::open(region, name) {
                    Ok(sem) => return Ok((sem, false)),
                    // Unlinked between the two calls; try to create it again
                    Err(ShmError::NotFound { .. }) => continue,
                    Err(e) => return Err(e),
                },
                errno => {
                    return Err(ShmError::AllocationFailed {
                        name: region.to_string(),
                        reason: format!("sem_open failed: {}", errno),
                    })
                }
            }
        }
    }

    /// Remove the semaphore name. Handles already attached keep working.
    fn unlink(region: &RegionName, name: &CString) {
        // SAFETY: name is a valid CString
        if unsafe { libc::sem_unlink(name.as_ptr()) } < 0 {
            let errno = Errno::last();
            if errno != Errno::ENOENT {
                tracing::warn!(name = %region, error = %errno, "Failed to unlink region mutex");
            }
        }
    }

    /// Attach to an existing semaphore.
    fn open(region: &RegionName, name: &CString) -> ShmResult<Self> {
        // SAFETY: name is a valid CString; without O_CREAT no variadic args are read
        let sem = unsafe { libc::sem_open(name.as_ptr(), 0) };

        if sem == libc::SEM_FAILED {
            let errno = Errno::last();
            return Err(match errno {
                Errno::ENOENT => ShmError::NotFound {
                    name: region.to_string(),
                    reason: format!("mutex {} does not exist", name.to_string_lossy()),
                },
                errno => ShmError::LockFailed {
                    name: region.to_string(),
                    operation: "open",
                    reason: format!("sem_open failed: {}", errno),
                },
            });
        }

        NonNull::new(sem)
            .map(|sem| Self { sem })
            .ok_or_else(|| ShmError::LockFailed {
                name: region.to_string(),
                operation: "open",
                reason: "sem_open returned null".to_string(),
            })
    }

    /// Block until the semaphore is acquired. No timeout.
    fn lock<'a>(&'a self, region: &'a RegionName) -> ShmResult<SemaphoreGuard<'a>> {
        loop {
            // SAFETY: sem is a live semaphore until self is dropped
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(SemaphoreGuard {
                    semaphore: self,
                    region,
                });
            }

            match Errno::last() {
                // Signal delivered while waiting
                Errno::EINTR => continue,
                errno => {
                    return Err(ShmError::LockFailed {
                        name: region.to_string(),
                        operation: "acquire",
                        reason: format!("sem_wait failed: {}", errno),
                    })
                }
            }
        }
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: sem came from sem_open and is closed exactly once
        if unsafe { libc::sem_close(self.sem.as_ptr()) } < 0 {
            tracing::warn!(error = %Errno::last(), "Failed to close semaphore");
        }
    }
}

/// Held semaphore; posts on drop.
struct SemaphoreGuard<'a> {
    semaphore: &'a NamedSemaphore,
    region: &'a RegionName,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard only exists after a successful sem_wait
        if unsafe { libc::sem_post(self.semaphore.sem.as_ptr()) } < 0 {
            tracing::error!(
                name = %self.region,
                error = %Errno::last(),
                "Failed to release region mutex"
            );
        }
    }
}

/// A view of the whole region, unmapped on drop.
struct MappedView {
    ptr: NonNull<c_void>,
}

impl MappedView {
    fn map(file: &File, writable: bool, region: &RegionName) -> ShmResult<Self> {
        let prot = if writable {
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE
        } else {
            ProtFlags::PROT_READ
        };

        // SAFETY: the object was sized to at least MAP_LEN before this handle
        // was handed out, and offset 0 is page aligned
        let ptr = unsafe { mmap(None, MAP_LEN, prot, MapFlags::MAP_SHARED, file, 0) }.map_err(
            |e| ShmError::MapFailed {
                name: region.to_string(),
                reason: format!("mmap failed: {}", e),
            },
        )?;

        Ok(Self { ptr })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr maps MAP_LEN readable bytes for the lifetime of self
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const u8, MAP_LEN.get()) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: only called on PROT_WRITE views, while the region mutex is held
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u8, MAP_LEN.get()) }
    }
}

impl Drop for MappedView {
    fn drop(&mut self) {
        // SAFETY: ptr and MAP_LEN are exactly what mmap returned and was given
        if let Err(e) = unsafe { munmap(self.ptr, MAP_LEN.get()) } {
            tracing::error!(error = %e, "Failed to unmap shared memory view");
        }
    }
}

/// Linux region: POSIX shm object + named semaphore.
pub struct PosixRegion {
    name: RegionName,
    names: ResourceNames,
    file: Option<File>,
    mutex: Option<NamedSemaphore>,
    mode: AccessMode,
    state: HandleState,
    /// This handle created the shm object and unlinks it on close.
    is_owner: bool,
    /// This handle created the semaphore and unlinks it on close.
    owns_mutex: bool,
}

impl PosixRegion {
    fn resources(&self, operation: &'static str) -> ShmResult<(&File, &NamedSemaphore)> {
        match (&self.file, &self.mutex) {
            (Some(file), Some(mutex)) => Ok((file, mutex)),
            _ => Err(ShmError::Closed {
                name: self.name.to_string(),
                operation,
            }),
        }
    }

    /// Open or create the shm object and size it. Returns whether this call
    /// created it.
    fn create_object(name: &RegionName, names: &ResourceNames) -> ShmResult<(File, bool)> {
        let mode = Mode::S_IRUSR | Mode::S_IWUSR;
        let (fd, created) = match shm_open(
            names.region.as_c_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            mode,
        ) {
            Ok(fd) => (fd, true),
            Err(Errno::EEXIST) => {
                let fd = shm_open(names.region.as_c_str(), OFlag::O_RDWR, Mode::empty())
                    .map_err(|e| ShmError::AllocationFailed {
                        name: name.to_string(),
                        reason: format!("shm_open of existing region failed: {}", e),
                    })?;
                (fd, false)
            }
            Err(e) => {
                return Err(ShmError::AllocationFailed {
                    name: name.to_string(),
                    reason: format!("shm_open failed: {}", e),
                })
            }
        };

        let file = File::from(fd);
        let sized = file.metadata().and_then(|meta| {
            // Grow only; shrinking or zeroing would destroy a live payload
            if meta.len() < SHARED_DATA_BUFF_SIZE as u64 {
                file.set_len(SHARED_DATA_BUFF_SIZE as u64)
            } else {
                Ok(())
            }
        });

        if let Err(e) = sized {
            if created {
                let _ = shm_unlink(names.region.as_c_str());
            }
            return Err(ShmError::AllocationFailed {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", e),
            });
        }

        Ok((file, created))
    }
}

impl RegionBackend for PosixRegion {
    fn create(name: &RegionName, config: &TransportConfig) -> ShmResult<Self> {
        let names = ResourceNames::new(name, config)?;
        let (mutex, owns_mutex) = NamedSemaphore::create(name, &names.mutex)?;

        let (file, created) = match Self::create_object(name, &names) {
            Ok(object) => object,
            Err(e) => {
                if owns_mutex {
                    NamedSemaphore::unlink(name, &names.mutex);
                }
                return Err(e);
            }
        };

        tracing::debug!(
            name = %name,
            object = %names.region.to_string_lossy(),
            existed = !created,
            "Created shared memory region"
        );

        Ok(Self {
            name: name.clone(),
            names,
            file: Some(file),
            mutex: Some(mutex),
            mode: AccessMode::ReadWrite,
            state: HandleState::Created,
            is_owner: created,
            owns_mutex,
        })
    }

    fn open(name: &RegionName, config: &TransportConfig, mode: AccessMode) -> ShmResult<Self> {
        let names = ResourceNames::new(name, config)?;
        let mutex = NamedSemaphore::open(name, &names.mutex)?;

        let oflag = if mode.is_writable() {
            OFlag::O_RDWR
        } else {
            OFlag::O_RDONLY
        };

        let fd = shm_open(names.region.as_c_str(), oflag, Mode::empty()).map_err(|e| match e {
            Errno::ENOENT => ShmError::NotFound {
                name: name.to_string(),
                reason: format!("{} does not exist", names.region.to_string_lossy()),
            },
            e => ShmError::MapFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", e),
            },
        })?;

        let file = File::from(fd);
        let len = file
            .metadata()
            .map_err(|e| ShmError::MapFailed {
                name: name.to_string(),
                reason: format!("fstat failed: {}", e),
            })?
            .len();

        // Mapping past the end of the object would fault on first access
        if len < SHARED_DATA_BUFF_SIZE as u64 {
            return Err(ShmError::NotFound {
                name: name.to_string(),
                reason: format!("region is {} bytes, creator has not sized it yet", len),
            });
        }

        tracing::debug!(name = %name, ?mode, "Opened shared memory region");

        Ok(Self {
            name: name.clone(),
            names,
            file: Some(file),
            mutex: Some(mutex),
            mode,
            state: HandleState::Opened,
            is_owner: false,
            owns_mutex: false,
        })
    }

    fn store(&self, payload: &[u8]) -> ShmResult<()> {
        let (file, mutex) = self.resources("store")?;
        payload::validate_for_write(payload)?;

        if !self.mode.is_writable() {
            return Err(ShmError::WriteFailed {
                name: self.name.to_string(),
                reason: "handle was opened read-only".to_string(),
            });
        }

        let _lock = mutex.lock(&self.name)?;
        let mut view = MappedView::map(file, true, &self.name)?;
        payload::encode_into(view.as_mut_slice(), payload);

        tracing::trace!(name = %self.name, len = payload.len(), "Stored payload");
        Ok(())
    }

    fn recall(&self) -> ShmResult<Vec<u8>> {
        let (file, mutex) = self.resources("recall")?;

        let _lock = mutex.lock(&self.name)?;
        let view = MappedView::map(file, false, &self.name)?;
        let data = payload::decode_from(view.as_slice());

        tracing::trace!(name = %self.name, len = data.len(), "Recalled payload");
        Ok(data)
    }

    fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        self.state = HandleState::Closed;

        // Process-local descriptors are released for every handle
        self.file = None;
        self.mutex = None;

        if self.owns_mutex {
            NamedSemaphore::unlink(&self.name, &self.names.mutex);
        }

        if !self.is_owner {
            return;
        }

        match shm_unlink(self.names.region.as_c_str()) {
            Ok(()) | Err(Errno::ENOENT) => {}
            Err(e) => tracing::warn!(
                name = %self.name,
                error = %e,
                "Failed to unlink shared memory region"
            ),
        }

        tracing::debug!(name = %self.name, "Unlinked shared memory region");
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

impl Drop for PosixRegion {
    fn drop(&mut self) {
        self.close();
    }
}
