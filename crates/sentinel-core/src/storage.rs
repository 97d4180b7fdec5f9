use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::device::Device;
use crate::hazard::MemoryChecker;

// Storage — A device memory region shared by tensor views
//
// A Storage is an untyped run of bytes on one device. Tensors never own
// bytes directly; they hold an Arc<Storage> plus a Layout, so views made by
// transpose/narrow/broadcast alias the same region.
//
// LAZY MATERIALIZATION:
//
//   The bytes are not allocated when the Storage is created, only on first
//   data access. Until then the caller may request zero-on-allocation, which
//   makes the first materialization zero-fill. Without that request the
//   region is filled with POISON_BYTE so that reads of never-written memory
//   stand out.
//
// The region also owns the MemoryChecker for its bytes; all views share it.
// Creating a region never reads the debug settings: the checker's history
// limit is fixed by the first DebugGate that records a use.

/// Fill byte of regions materialized without zero-on-allocation.
pub const POISON_BYTE: u8 = 0xA5;

/// Unique identifier of a storage region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId(u64);

impl StorageId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        StorageId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct StorageState {
    data: Option<Vec<u8>>,
    zero_on_allocation: bool,
}

/// A lazily materialized byte region on a device.
#[derive(Debug)]
pub struct Storage {
    id: StorageId,
    len_bytes: usize,
    device: Device,
    state: RwLock<StorageState>,
    checker: MemoryChecker,
}

impl Storage {
    /// A region of `len_bytes` bytes. The history depth is left to the
    /// first gate that records a use.
    pub fn new(len_bytes: usize, device: Device) -> Self {
        Self::with_checker(len_bytes, device, MemoryChecker::unconfigured())
    }

    /// A region whose checker keeps at most `history_limit` records.
    pub fn with_history_limit(len_bytes: usize, device: Device, history_limit: usize) -> Self {
        Self::with_checker(len_bytes, device, MemoryChecker::new(history_limit))
    }

    fn with_checker(len_bytes: usize, device: Device, checker: MemoryChecker) -> Self {
        Storage {
            id: StorageId::new(),
            len_bytes,
            device,
            state: RwLock::new(StorageState {
                data: None,
                zero_on_allocation: false,
            }),
            checker,
        }
    }

    /// A region already holding `bytes`.
    pub fn from_bytes(bytes: Vec<u8>, device: Device) -> Self {
        let storage = Self::new(bytes.len(), device);
        storage.write_state().data = Some(bytes);
        storage
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StorageState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StorageState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> StorageId {
        self.id
    }

    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn is_materialized(&self) -> bool {
        self.read_state().data.is_some()
    }

    /// Request that the first materialization fill the region with zeros.
    ///
    /// Once the bytes exist the request is ignored: the flag is one-shot and
    /// never clears data that is already there.
    pub fn zero_on_allocation(&self) {
        let mut state = self.write_state();
        if state.data.is_some() {
            tracing::debug!(storage = ?self.id, "zero-on-allocation ignored, region already materialized");
            return;
        }
        state.zero_on_allocation = true;
    }

    /// The use history of this region.
    pub fn memory_checker(&self) -> &MemoryChecker {
        &self.checker
    }

    fn materialize(&self, state: &mut StorageState) {
        if state.data.is_none() {
            let fill = if state.zero_on_allocation { 0 } else { POISON_BYTE };
            tracing::trace!(storage = ?self.id, len = self.len_bytes, fill, "materialize");
            state.data = Some(vec![fill; self.len_bytes]);
            state.zero_on_allocation = false;
        }
    }

    /// Run `f` over the region's bytes, materializing them first if needed.
    pub fn read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        {
            let state = self.read_state();
            if let Some(data) = state.data.as_deref() {
                return f(data);
            }
        }
        let mut state = self.write_state();
        self.materialize(&mut state);
        f(state.data.as_deref().unwrap_or(&[]))
    }

    /// Run `f` over the region's bytes mutably, materializing them first if needed.
    pub fn write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut state = self.write_state();
        self.materialize(&mut state);
        match state.data.as_deref_mut() {
            Some(data) => f(data),
            None => f(&mut []),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_poisoned_materialization() {
        let s = Storage::new(8, Device::Cpu);
        assert!(!s.is_materialized());
        s.read(|bytes| assert!(bytes.iter().all(|&b| b == POISON_BYTE)));
        assert!(s.is_materialized());
    }

    #[test]
    fn test_zero_on_allocation_before_materialization() {
        let s = Storage::new(16, Device::Cpu);
        s.zero_on_allocation();
        s.read(|bytes| {
            assert_eq!(bytes.len(), 16);
            assert!(bytes.iter().all(|&b| b == 0));
        });
    }

    #[test]
    fn test_zero_on_allocation_after_materialization_is_noop() {
        let s = Storage::new(4, Device::Cpu);
        s.write(|bytes| bytes.copy_from_slice(&[1, 2, 3, 4]));
        s.zero_on_allocation();
        s.read(|bytes| assert_eq!(bytes, &[1, 2, 3, 4]));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Storage::new(0, Device::Cpu);
        let b = Storage::new(0, Device::Cpu);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_from_bytes() {
        let s = Storage::from_bytes(vec![7; 3], Device::Cuda(0));
        assert!(s.is_materialized());
        assert_eq!(s.len_bytes(), 3);
        assert_eq!(s.device(), Device::Cuda(0));
    }

    #[test]
    fn test_history_limit_left_open_until_first_use() {
        let s = Storage::new(16, Device::Cpu);
        assert_eq!(s.memory_checker().history_limit(), None);
        let t = Storage::with_history_limit(16, Device::Cpu, 3);
        assert_eq!(t.memory_checker().history_limit(), Some(3));
    }
}
