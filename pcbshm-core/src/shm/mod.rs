// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Named shared memory transport.
//!
//! A region is a fixed 1024-byte buffer shared between processes by name.
//! On Linux and Windows the region is a native mapping guarded by a
//! systemwide mutex; elsewhere it falls back to a plain file without
//! locking. The backend is chosen at compile time behind `SharedMemory`.

mod backend;
mod file;
mod payload;
#[cfg(target_os = "linux")]
mod posix;
mod region;
#[cfg(windows)]
mod windows;

pub use backend::RegionBackend;
pub use file::FileRegion;
pub use payload::SHARED_DATA_BUFF_SIZE;
pub use region::{SharedMemory, BACKEND};
