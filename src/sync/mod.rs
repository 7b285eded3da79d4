//! Synchronization primitives.
//!
//! Provides thin wrappers over std or parking_lot locks, statistics atomics and the
//! in-flight registry used for producer backpressure.

pub(crate) mod atomics;
pub(crate) mod mutex;
pub mod sync_map;

pub use sync_map::SyncMap;
