//! Guest-visible counter report layout.

/// Size in bytes of a counter report in guest memory.
pub const COUNTER_RECORD_SIZE: usize = 16;

/// A counter value and the guest tick at which it was requested.
///
/// Written as two little-endian `u64`s: counter first, timestamp second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterRecord {
    pub counter: u64,
    pub timestamp: u64,
}

impl CounterRecord {
    pub const fn new(counter: u64, timestamp: u64) -> Self {
        Self { counter, timestamp }
    }

    pub fn to_bytes(self) -> [u8; COUNTER_RECORD_SIZE] {
        let mut bytes = [0u8; COUNTER_RECORD_SIZE];
        bytes[..8].copy_from_slice(&self.counter.to_le_bytes());
        bytes[8..].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: [u8; COUNTER_RECORD_SIZE]) -> Self {
        let mut counter = [0u8; 8];
        let mut timestamp = [0u8; 8];
        counter.copy_from_slice(&bytes[..8]);
        timestamp.copy_from_slice(&bytes[8..]);
        Self {
            counter: u64::from_le_bytes(counter),
            timestamp: u64::from_le_bytes(timestamp),
        }
    }
}
