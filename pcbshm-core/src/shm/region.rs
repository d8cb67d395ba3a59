//! SharedMemory - the platform-selected region facade.
//!
//! Exactly one backend is compiled in per target: the POSIX backend on Linux,
//! the Win32 backend on Windows and the file backend everywhere else. Callers
//! only ever see `SharedMemory`.

use std::sync::Arc;
use std::time::Duration;

use crate::config::TransportConfig;
use crate::error::{ShmError, ShmResult};
use crate::shm::backend::RegionBackend;
use crate::types::{AccessMode, HandleState, RegionName};

#[cfg(target_os = "linux")]
type PlatformRegion = crate::shm::posix::PosixRegion;

#[cfg(windows)]
type PlatformRegion = crate::shm::windows::WindowsRegion;

#[cfg(not(any(target_os = "linux", windows)))]
type PlatformRegion = crate::shm::file::FileRegion;

/// Name of the backend compiled into this build.
#[cfg(target_os = "linux")]
pub const BACKEND: &str = "posix-shm";

#[cfg(windows)]
pub const BACKEND: &str = "win32-mapping";

#[cfg(not(any(target_os = "linux", windows)))]
pub const BACKEND: &str = "file";

/// A handle to a named shared region.
///
/// A handle whose [`SharedMemory::create`] call made the region owns it and
/// tears it down on close or drop. Creating a name that already exists
/// attaches without taking ownership, and handles from the `open` family only
/// release their own descriptors. Stores are best-effort and not transactional: a store that
/// fails while copying can leave a partial payload behind, which the next
/// successful store fully replaces.
pub struct SharedMemory {
    inner: PlatformRegion,
}

impl SharedMemory {
    fn parse_name(name: &str) -> ShmResult<RegionName> {
        RegionName::new(name).map_err(|e| ShmError::InvalidName {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Create (or reuse) a region with the default configuration.
    pub fn create(name: &str) -> ShmResult<Self> {
        Self::create_with(name, &TransportConfig::default())
    }

    /// Create (or reuse) a region.
    pub fn create_with(name: &str, config: &TransportConfig) -> ShmResult<Self> {
        let name = Self::parse_name(name)?;
        let inner = PlatformRegion::create(&name, config)?;
        Ok(Self { inner })
    }

    /// Open an existing region for reading and writing with the default configuration.
    pub fn open(name: &str) -> ShmResult<Self> {
        Self::open_with(name, &TransportConfig::default())
    }

    /// Open an existing region for reading and writing.
    pub fn open_with(name: &str, config: &TransportConfig) -> ShmResult<Self> {
        let name = Self::parse_name(name)?;
        let inner = PlatformRegion::open(&name, config, AccessMode::ReadWrite)?;
        Ok(Self { inner })
    }

    /// Open an existing region for reading only.
    pub fn open_read_only_with(name: &str, config: &TransportConfig) -> ShmResult<Self> {
        let name = Self::parse_name(name)?;
        let inner = PlatformRegion::open(&name, config, AccessMode::ReadOnly)?;
        Ok(Self { inner })
    }

    /// Replace the region contents. Blocks while another process holds the
    /// region (native backends).
    pub fn store(&self, payload: &[u8]) -> ShmResult<()> {
        self.inner.store(payload)
    }

    /// Copy the current payload out of the region. Blocks while another
    /// process holds the region (native backends).
    pub fn recall(&self) -> ShmResult<Vec<u8>> {
        self.inner.recall()
    }

    /// Recall with an upper bound on the wait.
    ///
    /// The recall runs on tokio's blocking pool. If `timeout` expires first
    /// the result is discarded and `ShmError::TimedOut` is returned; the OS
    /// call itself cannot be cancelled and completes in the background,
    /// keeping the handle alive until it does.
    pub async fn recall_timeout(self: &Arc<Self>, timeout: Duration) -> ShmResult<Vec<u8>> {
        let region = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || region.recall());

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ShmError::ReadFailed {
                name: self.name().to_string(),
                reason: format!("recall task failed: {}", e),
            }),
            Err(_) => {
                tracing::warn!(
                    name = %self.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Recall timed out waiting for region"
                );
                Err(ShmError::TimedOut {
                    name: self.name().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Release this handle's resources. Safe to call more than once.
    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn name(&self) -> &RegionName {
        self.inner.name()
    }

    pub fn mode(&self) -> AccessMode {
        self.inner.mode()
    }

    pub fn state(&self) -> HandleState {
        self.inner.state()
    }

    pub fn is_owner(&self) -> bool {
        self.inner.is_owner()
    }
}

impl std::fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedMemory")
            .field("name", self.name())
            .field("backend", &BACKEND)
            .field("mode", &self.mode())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn unique_name(tag: &str) -> String {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", tag, std::process::id(), n)
    }

    fn setup() -> (TempDir, TransportConfig) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = TransportConfig::default()
            .with_namespace("pcbshm-test")
            .with_run_dir(dir.path());
        (dir, config)
    }

    #[test]
    fn test_facade_round_trip() {
        let (_dir, config) = setup();
        let name = unique_name("facade");
        let region = SharedMemory::create_with(&name, &config).unwrap();

        assert!(region.is_owner());
        assert_eq!(region.state(), HandleState::Created);
        assert_eq!(region.mode(), AccessMode::ReadWrite);

        region.store(b"Hello, World!").unwrap();
        assert_eq!(region.recall().unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_invalid_name_rejected() {
        let (_dir, config) = setup();
        assert!(matches!(
            SharedMemory::create_with("bad/name", &config),
            Err(ShmError::InvalidName { .. })
        ));
        assert!(matches!(
            SharedMemory::open_with("", &config),
            Err(ShmError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_read_only_handle() {
        let (_dir, config) = setup();
        let name = unique_name("facade-ro");
        let owner = SharedMemory::create_with(&name, &config).unwrap();
        owner.store(b"payload").unwrap();

        let reader = SharedMemory::open_read_only_with(&name, &config).unwrap();
        assert!(!reader.is_owner());
        assert_eq!(reader.state(), HandleState::Opened);
        assert_eq!(reader.mode(), AccessMode::ReadOnly);
        assert_eq!(reader.recall().unwrap(), b"payload");
    }

    #[test]
    fn test_double_close() {
        let (_dir, config) = setup();
        let name = unique_name("facade-close");
        let mut region = SharedMemory::create_with(&name, &config).unwrap();

        region.close();
        region.close();
        assert_eq!(region.state(), HandleState::Closed);
    }

    #[tokio::test]
    async fn test_recall_timeout_completes() {
        let (_dir, config) = setup();
        let name = unique_name("facade-timeout");
        let region = Arc::new(SharedMemory::create_with(&name, &config).unwrap());
        region.store(b"in time").unwrap();

        let data = region
            .recall_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(data, b"in time");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_default_config_create_and_open() {
        let name = unique_name("facade-default");
        let owner = SharedMemory::create(&name).unwrap();
        owner.store(b"default namespace").unwrap();

        let accessor = SharedMemory::open(&name).unwrap();
        assert_eq!(accessor.mode(), AccessMode::ReadWrite);
        assert_eq!(accessor.recall().unwrap(), b"default namespace");
    }

    #[test]
    fn test_second_create_does_not_own() {
        let (_dir, config) = setup();
        let name = unique_name("facade-recreate");
        let first = SharedMemory::create_with(&name, &config).unwrap();
        first.store(b"first").unwrap();

        let second = SharedMemory::create_with(&name, &config).unwrap();
        assert!(first.is_owner());
        assert!(!second.is_owner());
        drop(second);

        let reader = SharedMemory::open_read_only_with(&name, &config).unwrap();
        assert_eq!(reader.recall().unwrap(), b"first");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_recall_timeout_expires_while_mutex_held() {
        use std::ffi::CString;

        let (_dir, config) = setup();
        let name = unique_name("facade-held");
        let region = Arc::new(SharedMemory::create_with(&name, &config).unwrap());
        region.store(b"late").unwrap();

        // Hold the region mutex the way another process would
        let mutex_name = CString::new(format!("/pcbshm-test.{}.mutex", name)).unwrap();
        let sem = unsafe { libc::sem_open(mutex_name.as_ptr(), 0) };
        assert_ne!(sem, libc::SEM_FAILED);
        assert_eq!(unsafe { libc::sem_wait(sem) }, 0);

        let result = region.recall_timeout(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ShmError::TimedOut { .. })));

        assert_eq!(unsafe { libc::sem_post(sem) }, 0);
        unsafe { libc::sem_close(sem) };

        // The abandoned recall finishes in the background; a fresh one succeeds
        let data = region
            .recall_timeout(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(data, b"late");
    }
}
