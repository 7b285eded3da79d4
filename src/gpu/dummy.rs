//! Dummy backend and guest memory for testing
//!
//! `DummyBackend` keeps counters in plain integers and resolves queries when asked to
//! update or flush, so pipelines can be driven deterministically without GPU hardware.
//! `VecGuestMemory` stores guest RAM in a `Vec<u8>` and tracks dirty pages.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::traits::*;
use crate::counter::{CounterResolver, CounterType, QueryHandle};
use crate::sync::atomics::AtomicCounter;
use crate::sync::mutex::Mutex;

/// Operation observed by the dummy backend, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    ReportCounter(CounterType),
    ResetCounter(CounterType),
    UpdateCounters,
    FlushCounters,
    DisposeCounter(QueryHandle),
    CreateSync(u64),
    SetBufferData {
        buffer: BufferHandle,
        offset: u64,
        len: usize,
    },
    Marker(u64),
}

#[derive(Default)]
struct DummyState {
    counters: HashMap<CounterType, u64>,
    pending: Vec<(QueryHandle, CounterResolver)>,
    next_query: u64,
    unsupported: HashSet<CounterType>,
    buffers: HashMap<u32, Vec<u8>>,
    ops: Vec<BackendOp>,
}

/// Deterministic in-memory backend.
pub struct DummyBackend {
    state: Arc<Mutex<DummyState>>,
}

/// Test-side view of a [`DummyBackend`] that has been moved into a context.
#[derive(Clone)]
pub struct DummyBackendHandle {
    state: Arc<Mutex<DummyState>>,
}

impl DummyBackend {
    /// Create a backend plus a handle for inspecting it.
    pub fn new() -> (Self, DummyBackendHandle) {
        let state = Arc::new(Mutex::new(DummyState::default()));
        (
            Self {
                state: state.clone(),
            },
            DummyBackendHandle { state },
        )
    }

    /// Resolve every pending query with the current counter values.
    fn resolve_pending(&mut self) {
        let (pending, counters) = {
            let mut state = self.state.lock();
            (std::mem::take(&mut state.pending), state.counters.clone())
        };
        // Resolvers run guest writes; keep the state lock out of them.
        for (_, resolver) in pending {
            let value = counters.get(&resolver.kind()).copied().unwrap_or(0);
            resolver.resolve(value);
        }
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &str {
        "dummy"
    }

    fn report_counter(
        &mut self,
        kind: CounterType,
        resolver: CounterResolver,
    ) -> Result<QueryHandle, BackendError> {
        let mut state = self.state.lock();
        state.ops.push(BackendOp::ReportCounter(kind));
        if state.unsupported.contains(&kind) {
            return Err(BackendError::UnsupportedCounter(kind));
        }
        state.next_query += 1;
        let query = QueryHandle(state.next_query);
        state.pending.push((query, resolver));
        Ok(query)
    }

    fn reset_counter(&mut self, kind: CounterType) {
        let mut state = self.state.lock();
        state.ops.push(BackendOp::ResetCounter(kind));
        state.counters.insert(kind, 0);
    }

    fn update_counters(&mut self) {
        self.state.lock().ops.push(BackendOp::UpdateCounters);
        self.resolve_pending();
    }

    fn flush_counters(&mut self) {
        self.state.lock().ops.push(BackendOp::FlushCounters);
        self.resolve_pending();
    }

    fn dispose_counter(&mut self, query: QueryHandle) {
        let disposed = {
            let mut state = self.state.lock();
            state.ops.push(BackendOp::DisposeCounter(query));
            let index = state.pending.iter().position(|(q, _)| *q == query);
            index.map(|index| state.pending.remove(index))
        };
        // Dropping the resolver cancels its event.
        drop(disposed);
    }

    fn create_sync(&mut self, id: u64) {
        self.state.lock().ops.push(BackendOp::CreateSync(id));
    }

    fn set_buffer_data(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.ops.push(BackendOp::SetBufferData {
            buffer,
            offset,
            len: data.len(),
        });
        let start = usize::try_from(offset).map_err(|_| BackendError::InvalidBuffer(buffer.0))?;
        let end = start
            .checked_add(data.len())
            .ok_or(BackendError::InvalidBuffer(buffer.0))?;
        let storage = state.buffers.entry(buffer.0).or_default();
        if storage.len() < end {
            storage.resize(end, 0);
        }
        storage[start..end].copy_from_slice(data);
        Ok(())
    }

    fn marker(&mut self, tag: u64) {
        self.state.lock().ops.push(BackendOp::Marker(tag));
    }
}

impl Drop for DummyBackend {
    fn drop(&mut self) {
        // Queries die with the backend; their resolvers cancel outside the lock.
        let pending = std::mem::take(&mut self.state.lock().pending);
        drop(pending);
    }
}

impl DummyBackendHandle {
    /// Set the value the next resolution of `kind` reports.
    pub fn set_counter(&self, kind: CounterType, value: u64) {
        self.state.lock().counters.insert(kind, value);
    }

    /// Current value of `kind`.
    pub fn counter(&self, kind: CounterType) -> u64 {
        self.state.lock().counters.get(&kind).copied().unwrap_or(0)
    }

    /// Make `report_counter` fail for `kind`.
    pub fn set_unsupported(&self, kind: CounterType) {
        self.state.lock().unsupported.insert(kind);
    }

    /// Number of queries waiting for an update or flush.
    pub fn pending_queries(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Every operation executed so far.
    pub fn ops(&self) -> Vec<BackendOp> {
        self.state.lock().ops.clone()
    }

    /// Tags of executed markers, in order.
    pub fn markers(&self) -> Vec<u64> {
        self.state
            .lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                BackendOp::Marker(tag) => Some(*tag),
                _ => None,
            })
            .collect()
    }

    /// Contents of a buffer written through `set_buffer_data`.
    pub fn buffer(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer.0).cloned()
    }
}

/// Guest page granularity used for dirty tracking.
pub const GUEST_PAGE_SIZE: u64 = 0x1000;

/// A simple in-memory guest memory backed by a single `Vec<u8>`.
///
/// The address space starts at 0. Tracked writes mark the touched pages dirty;
/// untracked writes do not.
pub struct VecGuestMemory {
    data: Mutex<Vec<u8>>,
    dirty: Mutex<BTreeSet<u64>>,
    tracked_writes: AtomicCounter,
    untracked_writes: AtomicCounter,
}

impl VecGuestMemory {
    pub fn new(size_bytes: usize) -> Self {
        Self {
            data: Mutex::new(vec![0u8; size_bytes]),
            dirty: Mutex::new(BTreeSet::new()),
            tracked_writes: AtomicCounter::default(),
            untracked_writes: AtomicCounter::default(),
        }
    }

    /// Read a little-endian `u32`.
    pub fn read_u32(&self, address: u64) -> Result<u32, GuestMemoryError> {
        let mut bytes = [0u8; 4];
        self.read(address, &mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Read a little-endian `u64`.
    pub fn read_u64(&self, address: u64) -> Result<u64, GuestMemoryError> {
        let mut bytes = [0u8; 8];
        self.read(address, &mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Dirty page indices, ascending.
    pub fn dirty_pages(&self) -> Vec<u64> {
        self.dirty.lock().iter().copied().collect()
    }

    /// Return and clear the dirty page set.
    pub fn take_dirty_pages(&self) -> Vec<u64> {
        std::mem::take(&mut *self.dirty.lock()).into_iter().collect()
    }

    /// Number of successful tracked writes.
    pub fn tracked_writes(&self) -> u64 {
        self.tracked_writes.get()
    }

    /// Number of successful untracked writes.
    pub fn untracked_writes(&self) -> u64 {
        self.untracked_writes.get()
    }

    fn range(&self, address: u64, len: usize, size: usize) -> Result<std::ops::Range<usize>, GuestMemoryError> {
        let out_of_bounds = GuestMemoryError::OutOfBounds { address, len };
        let start = usize::try_from(address).map_err(|_| out_of_bounds.clone())?;
        let end = start.checked_add(len).ok_or_else(|| out_of_bounds.clone())?;
        if end > size {
            return Err(out_of_bounds);
        }
        Ok(start..end)
    }

    fn store(&self, address: u64, src: &[u8]) -> Result<(), GuestMemoryError> {
        let mut data = self.data.lock();
        let range = self.range(address, src.len(), data.len())?;
        data[range].copy_from_slice(src);
        Ok(())
    }
}

impl GuestMemory for VecGuestMemory {
    fn read(&self, address: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        let data = self.data.lock();
        let range = self.range(address, dst.len(), data.len())?;
        dst.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write(&self, address: u64, src: &[u8]) -> Result<(), GuestMemoryError> {
        self.store(address, src)?;
        if !src.is_empty() {
            let first = address / GUEST_PAGE_SIZE;
            let last = (address + src.len() as u64 - 1) / GUEST_PAGE_SIZE;
            self.dirty.lock().extend(first..=last);
        }
        self.tracked_writes.increment();
        Ok(())
    }

    fn write_untracked(&self, address: u64, src: &[u8]) -> Result<(), GuestMemoryError> {
        self.store(address, src)?;
        self.untracked_writes.increment();
        Ok(())
    }
}

impl std::fmt::Debug for VecGuestMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VecGuestMemory")
            .field("size", &self.data.lock().len())
            .field("dirty_pages", &self.dirty.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_write_marks_pages() {
        let memory = VecGuestMemory::new(0x4000);
        memory.write(0x0ffc, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(memory.dirty_pages(), vec![0, 1]);
        assert_eq!(memory.take_dirty_pages(), vec![0, 1]);
        assert!(memory.dirty_pages().is_empty());
    }

    #[test]
    fn test_untracked_write_skips_dirty_tracking() {
        let memory = VecGuestMemory::new(0x2000);
        memory.write_untracked(0x1000, &42u64.to_le_bytes()).unwrap();
        assert!(memory.dirty_pages().is_empty());
        assert_eq!(memory.read_u64(0x1000).unwrap(), 42);
        assert_eq!(memory.untracked_writes(), 1);
        assert_eq!(memory.tracked_writes(), 0);
    }

    #[test]
    fn test_out_of_bounds() {
        let memory = VecGuestMemory::new(16);
        assert_eq!(
            memory.write(12, &[0u8; 8]),
            Err(GuestMemoryError::OutOfBounds { address: 12, len: 8 })
        );
        assert!(memory.read_u64(u64::MAX).is_err());
        assert_eq!(memory.tracked_writes(), 0);
    }

    #[test]
    fn test_dummy_backend_buffer_upload() {
        let (mut backend, handle) = DummyBackend::new();
        backend.set_buffer_data(BufferHandle(3), 2, &[9, 9]).unwrap();
        assert_eq!(handle.buffer(BufferHandle(3)), Some(vec![0, 0, 9, 9]));
    }

    #[test]
    fn test_dummy_backend_unsupported_counter() {
        let (_backend, handle) = DummyBackend::new();
        handle.set_unsupported(CounterType::PrimitivesGenerated);
        handle.set_counter(CounterType::SamplesPassed, 3);
        assert_eq!(handle.counter(CounterType::SamplesPassed), 3);
        assert_eq!(handle.pending_queries(), 0);
    }
}
