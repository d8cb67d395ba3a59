//! The contract every region backend implements.

use crate::config::TransportConfig;
use crate::error::ShmResult;
use crate::types::{AccessMode, HandleState, RegionName};

/// A named, fixed-capacity region shared between processes.
///
/// Implementations differ in their consistency model: the native backends
/// serialize every store and recall through a systemwide mutex, the file
/// backend relies on the file system alone. All operations are synchronous
/// and may block the calling thread.
pub trait RegionBackend: Send + Sync + Sized {
    /// Allocate (or reuse) the OS resources for `name`. The handle owns the
    /// region only if this call allocated it. Existing region contents are
    /// left intact.
    fn create(name: &RegionName, config: &TransportConfig) -> ShmResult<Self>;

    /// Resolve an existing region by name and return an accessor handle.
    /// Never allocates.
    fn open(name: &RegionName, config: &TransportConfig, mode: AccessMode) -> ShmResult<Self>;

    /// Replace the region contents with `payload`.
    fn store(&self, payload: &[u8]) -> ShmResult<()>;

    /// Copy the current payload out of the region.
    fn recall(&self) -> ShmResult<Vec<u8>>;

    /// Release the resources held by this handle. Owners also tear down the
    /// named OS objects. Calling it again is a no-op.
    fn close(&mut self);

    fn name(&self) -> &RegionName;

    fn mode(&self) -> AccessMode;

    fn state(&self) -> HandleState;

    /// Whether this handle created the region and tears it down on close.
    fn is_owner(&self) -> bool;
}
