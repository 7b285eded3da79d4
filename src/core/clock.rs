//! Guest GPU clock emulation.
//!
//! The guest GPU timestamps counter reports with a 614.4 MHz tick counter. Host time is
//! measured in nanoseconds since the session started and converted with the fixed ratio
//! 384/625.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Numerator of the nanosecond to tick ratio.
pub const TICKS_NUMERATOR: u64 = 384;

/// Denominator of the nanosecond to tick ratio.
pub const TICKS_DENOMINATOR: u64 = 625;

/// Divisor applied to reported timestamps in fast GPU time mode.
pub const FAST_GPU_TIME_DIVISOR: u64 = 256;

/// Convert elapsed host nanoseconds to guest GPU ticks.
///
/// Divides before multiplying so large elapsed times cannot overflow, then adds back the
/// fraction lost in the division.
pub const fn nanoseconds_to_ticks(ns: u64) -> u64 {
    let whole = ns / TICKS_DENOMINATOR;
    let rounded = whole * TICKS_DENOMINATOR;
    let bias = (ns - rounded) * TICKS_NUMERATOR / TICKS_DENOMINATOR;
    whole * TICKS_NUMERATOR + bias
}

/// Source of host elapsed time.
pub trait HostClock: Send + Sync {
    /// Nanoseconds elapsed since the clock's origin.
    fn elapsed_ns(&self) -> u64;
}

/// Monotonic host clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct StdHostClock {
    origin: Instant,
}

impl StdHostClock {
    /// Start a clock at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdHostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl HostClock for StdHostClock {
    fn elapsed_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Host clock driven explicitly, for deterministic tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start_ns`.
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    /// Set the current reading.
    pub fn set(&self, ns: u64) {
        self.now_ns.store(ns, Ordering::SeqCst);
    }

    /// Move the clock forward by `delta_ns`.
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst) + delta_ns
    }
}

impl HostClock for ManualClock {
    fn elapsed_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// Guest GPU clock bound to a host time source.
#[derive(Clone)]
pub struct GuestClock {
    host: Arc<dyn HostClock>,
    fast_gpu_time: bool,
}

impl GuestClock {
    /// Create a guest clock reading from `host`.
    pub fn new(host: Arc<dyn HostClock>, fast_gpu_time: bool) -> Self {
        Self {
            host,
            fast_gpu_time,
        }
    }

    /// Raw guest ticks for the current host time.
    pub fn ticks(&self) -> u64 {
        nanoseconds_to_ticks(self.host.elapsed_ns())
    }

    /// Timestamp as reported to the guest in counter records.
    pub fn timestamp(&self) -> u64 {
        let ticks = self.ticks();
        if self.fast_gpu_time {
            ticks / FAST_GPU_TIME_DIVISOR
        } else {
            ticks
        }
    }

    /// Whether reported timestamps are scaled down.
    pub fn fast_gpu_time(&self) -> bool {
        self.fast_gpu_time
    }
}

impl std::fmt::Debug for GuestClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestClock")
            .field("elapsed_ns", &self.host.elapsed_ns())
            .field("fast_gpu_time", &self.fast_gpu_time)
            .finish()
    }
}
