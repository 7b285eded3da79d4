//! In-flight handle registry with blocking availability waits.
//!
//! Ids enter the map when the producer hands work to the backend and leave it when the
//! backend reports completion. A producer that wants to reuse an id (a counter address,
//! a fence id) waits until the previous user of that id has been released.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::sync::mutex::{Condvar, Mutex};

/// Set of in-flight ids plus a wake signal shared by every waiter.
#[derive(Debug, Default)]
pub struct SyncMap {
    in_flight: Mutex<HashSet<u64>>,
    changed: Condvar,
}

impl SyncMap {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as in flight.
    pub fn create_sync_handle(&self, id: u64) {
        self.in_flight.lock().insert(id);
    }

    /// Mark `id` as resolved and wake every waiter.
    ///
    /// Returns `false` if `id` was not in flight.
    pub fn assign_sync(&self, id: u64) -> bool {
        let removed = self.in_flight.lock().remove(&id);
        self.changed.notify_all();
        removed
    }

    /// Block until `id` is no longer in flight.
    ///
    /// Must not be called from the backend execution context: the release it waits for
    /// is produced there.
    pub fn wait_sync_availability(&self, id: u64) {
        let mut in_flight = self.in_flight.lock();
        let mut woken = false;

        // A wake for another id re-checks and parks again.
        while in_flight.contains(&id) {
            self.changed.wait(&mut in_flight);
            woken = true;
        }
        drop(in_flight);

        if woken {
            // Re-raise the wake for the other waiters.
            self.changed.notify_all();
        }
    }

    /// Like [`wait_sync_availability`](Self::wait_sync_availability), bounded by `timeout`.
    ///
    /// Returns `true` if `id` became available, `false` if the timeout expired first.
    pub fn wait_sync_availability_timeout(&self, id: u64, timeout: Duration) -> bool {
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => {
                self.wait_sync_availability(id);
                return true;
            }
        };
        let mut in_flight = self.in_flight.lock();
        let mut woken = false;

        while in_flight.contains(&id) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.changed.wait_for(&mut in_flight, remaining);
            woken = true;
        }
        drop(in_flight);

        if woken {
            self.changed.notify_all();
        }
        true
    }

    /// Check whether `id` is currently in flight.
    pub fn is_in_flight(&self, id: u64) -> bool {
        self.in_flight.lock().contains(&id)
    }

    /// Number of ids currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_create_and_assign() {
        let map = SyncMap::new();
        map.create_sync_handle(7);
        assert!(map.is_in_flight(7));
        assert_eq!(map.in_flight_count(), 1);

        assert!(map.assign_sync(7));
        assert!(!map.is_in_flight(7));
        assert!(!map.assign_sync(7));
    }

    #[test]
    fn test_wait_returns_immediately_when_absent() {
        let map = SyncMap::new();
        map.wait_sync_availability(42);
        assert!(map.wait_sync_availability_timeout(42, Duration::from_millis(1)));
    }

    #[test]
    fn test_wait_blocks_until_assigned() {
        let map = Arc::new(SyncMap::new());
        map.create_sync_handle(1);

        let released = Arc::new(AtomicBool::new(false));
        let waiter = {
            let map = map.clone();
            let released = released.clone();
            thread::spawn(move || {
                map.wait_sync_availability(1);
                assert!(released.load(Ordering::SeqCst));
            })
        };

        thread::sleep(Duration::from_millis(20));
        released.store(true, Ordering::SeqCst);
        map.assign_sync(1);

        waiter.join().unwrap();
    }

    #[test]
    fn test_unrelated_id_does_not_block() {
        let map = SyncMap::new();
        map.create_sync_handle(0xA);
        assert!(map.wait_sync_availability_timeout(0xB, Duration::from_millis(50)));
        map.wait_sync_availability(0xB);
        assert!(map.is_in_flight(0xA));
    }

    #[test]
    fn test_wake_for_other_id_is_not_false_positive() {
        let map = Arc::new(SyncMap::new());
        map.create_sync_handle(1);
        map.create_sync_handle(2);

        let waiter = {
            let map = map.clone();
            thread::spawn(move || map.wait_sync_availability_timeout(1, Duration::from_millis(100)))
        };

        thread::sleep(Duration::from_millis(10));
        map.assign_sync(2);

        assert!(!waiter.join().unwrap());
        assert!(map.is_in_flight(1));
    }

    #[test]
    fn test_two_waiters_same_id_both_wake() {
        let map = Arc::new(SyncMap::new());
        map.create_sync_handle(5);

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let map = map.clone();
                thread::spawn(move || map.wait_sync_availability(5))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        map.assign_sync(5);

        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    #[test]
    fn test_timeout_expires_while_in_flight() {
        let map = SyncMap::new();
        map.create_sync_handle(3);
        let start = Instant::now();
        assert!(!map.wait_sync_availability_timeout(3, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_unrepresentable_timeout_waits_unbounded() {
        let map = Arc::new(SyncMap::new());
        map.create_sync_handle(9);

        let waiter = {
            let map = map.clone();
            thread::spawn(move || map.wait_sync_availability_timeout(9, Duration::MAX))
        };

        thread::sleep(Duration::from_millis(10));
        map.assign_sync(9);
        assert!(waiter.join().unwrap());
    }
}
