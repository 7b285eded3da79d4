//! Guest timing core.

pub mod clock;

pub use clock::{nanoseconds_to_ticks, GuestClock, HostClock, ManualClock, StdHostClock};
