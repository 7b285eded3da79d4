//! Contracts for the external collaborators: the host GPU backend and guest memory.
//!
//! This module defines the interfaces WITHOUT pulling in any graphics API. The pipeline
//! depends on these traits, not on implementations.

use std::fmt;

use crate::counter::{CounterResolver, CounterType, QueryHandle};

/// Errors raised by guest memory accesses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuestMemoryError {
    /// The access falls outside mapped guest memory.
    OutOfBounds {
        address: u64,
        len: usize,
    },
}

impl fmt::Display for GuestMemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestMemoryError::OutOfBounds { address, len } => {
                write!(f, "guest memory access out of bounds (address={address:#x}, len={len})")
            }
        }
    }
}

impl std::error::Error for GuestMemoryError {}

/// Guest physical memory as seen by the GPU.
///
/// Every write must be atomic with respect to concurrent accesses of the same range.
pub trait GuestMemory: Send + Sync {
    /// Read `dst.len()` bytes starting at `address`.
    fn read(&self, address: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError>;

    /// Write through the emulation thread's tracked path (marks pages dirty).
    fn write(&self, address: u64, src: &[u8]) -> Result<(), GuestMemoryError>;

    /// Write without touching dirty tracking; used for out-of-band backend writes.
    fn write_untracked(&self, address: u64, src: &[u8]) -> Result<(), GuestMemoryError>;
}

/// Errors raised by a GPU backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend does not implement the requested counter.
    UnsupportedCounter(CounterType),
    /// A buffer handle does not name a live buffer.
    InvalidBuffer(u32),
    /// Backend-specific error (opaque)
    Backend(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::UnsupportedCounter(kind) => write!(f, "unsupported counter: {kind:?}"),
            BackendError::InvalidBuffer(id) => write!(f, "invalid buffer handle: {id}"),
            BackendError::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Host buffer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// The host rendering backend driven by the executor.
///
/// All methods run on the backend execution context, one at a time, in the order the
/// producer issued them.
pub trait GpuBackend: Send {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Start a native query for `kind`.
    ///
    /// The backend must eventually call `resolver.resolve(value)`, or drop the resolver
    /// (which cancels the event) if the query is abandoned.
    fn report_counter(
        &mut self,
        kind: CounterType,
        resolver: CounterResolver,
    ) -> Result<QueryHandle, BackendError>;

    /// Reset the running value of a counter.
    fn reset_counter(&mut self, kind: CounterType);

    /// Deliver results for queries that have completed natively.
    fn update_counters(&mut self);

    /// Wait for every outstanding query and deliver its result.
    fn flush_counters(&mut self);

    /// Release a native query; an unresolved resolver is dropped.
    fn dispose_counter(&mut self, query: QueryHandle);

    /// Create a host fence with the given id.
    fn create_sync(&mut self, id: u64);

    /// Upload `data` into `buffer` at `offset`.
    fn set_buffer_data(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Debug marker inserted into the command stream.
    fn marker(&mut self, _tag: u64) {}
}
