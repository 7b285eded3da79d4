//! Host backend and guest memory
//!
//! The pipeline talks to the outside world through two traits: [`GpuBackend`] for the
//! native graphics API and [`GuestMemory`] for emulated RAM.
//!
//! ## Implementations
//! - `dummy`: deterministic in-memory backend and `Vec`-backed guest memory (always available)

// Always present for API stability: traits define the interface
pub mod traits;
pub use traits::{BackendError, BufferHandle, GpuBackend, GuestMemory, GuestMemoryError};

// Dummy implementations for testing (always available)
pub mod dummy;
pub use dummy::{BackendOp, DummyBackend, DummyBackendHandle, VecGuestMemory, GUEST_PAGE_SIZE};
