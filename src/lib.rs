//! # gpuquery
//!
//! Deferred command execution and counter/semaphore reporting for an emulated console
//! GPU.
//!
//! ## Features
//!
//! - Ordered command channel between the emulation thread and a host backend
//! - Inline or dedicated-thread backend execution with identical semantics
//! - Counter events with explicit lifetime, invalidation and address backpressure
//! - Semaphore release/counter decoding with explicit hardware code tables
//! - Guest GPU clock emulation (384/625 tick ratio, optional fast GPU time)
//! - Pipeline statistics and rustc-like diagnostics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gpuquery::{DummyBackend, GpuConfig, GpuContext, SemaphoreReporter, VecGuestMemory};
//!
//! let (backend, _handle) = DummyBackend::new();
//! let memory = Arc::new(VecGuestMemory::new(0x10000));
//! let ctx = GpuContext::new(GpuConfig::threaded(), backend, memory);
//!
//! let mut semaphore = SemaphoreReporter::new();
//! semaphore.set_address_low(0x1000);
//!
//! // Report SamplesPassed (operation 2, counter code 0x15).
//! if let Some(event) = semaphore.report(&ctx, 2 | (0x15 << 23)) {
//!     ctx.flush_counters();
//!     event.wait();
//! }
//! ```

pub mod api;
pub mod channel;
pub mod core;
pub mod counter;
pub mod diagnostics;
pub mod gpu;
pub mod sync;

// Re-export public API at crate root for convenience
pub use api::config::{BackendThreading, GpuConfig};
pub use api::context::GpuContext;
pub use api::reporter::{SemaphoreReporter, SemaphoreState};
pub use api::stats::PipelineStats;

// Clock
pub use crate::core::clock::{nanoseconds_to_ticks, GuestClock, HostClock, ManualClock, StdHostClock};

// Counters
pub use counter::{
    Completion, CounterEvent, CounterEventId, CounterQuery, CounterRecord, CounterResolver,
    CounterType, Decoded, EventState, QueryHandle, ReportCounterType, ResetCounterType,
    SemaphoreOperation, COUNTER_RECORD_SIZE,
};

// Command channel
pub use channel::{ChannelError, Command, DeferredAction};

// Backend and guest memory
pub use gpu::{
    BackendError, BackendOp, BufferHandle, DummyBackend, DummyBackendHandle, GpuBackend,
    GuestMemory, GuestMemoryError, VecGuestMemory,
};

// Synchronization
pub use sync::SyncMap;

// Diagnostics - Core types and predefined codes
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use diagnostics::{set_strict_mode, StrictMode, StrictModeGuard};
pub use diagnostics::{GQ101, GQ102, GQ201, GQ202, GQ301, GQ401, GQ402, GQ901};
