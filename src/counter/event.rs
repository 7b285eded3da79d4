//! Counter events: handles for asynchronous counter results.
//!
//! A [`CounterEvent`] is created on the emulation thread when the guest asks for a counter
//! report and is shared with the backend executor until the backend produces a value.
//! The backend never sees the event directly; it receives a [`CounterResolver`], which
//! can be consumed exactly once. Dropping an unused resolver cancels the event, so a
//! backend that discards a query can never leave a producer waiting forever.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::stats::StatsCounters;
use crate::counter::kind::{CounterType, ReportCounterType};
use crate::sync::mutex::{Condvar, Mutex};
use crate::sync::SyncMap;

/// Handler invoked with the resolved counter value.
pub type ResultHandler = Box<dyn FnOnce(u64) + Send>;

/// Unique identifier of a counter event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterEventId(u64);

impl CounterEventId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw 64-bit value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque backend handle for a native query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryHandle(pub u64);

/// Lifecycle state of a counter event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Waiting for the backend.
    Pending,
    /// The backend produced a value.
    Resolved(u64),
    /// The query was disposed or rejected before producing a value.
    Cancelled,
}

/// What happened when an event was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The handler ran with the resolved value.
    Delivered,
    /// A value arrived but the event had been invalidated; the handler was dropped.
    Suppressed,
    /// No value arrived; the handler was dropped.
    Cancelled,
    /// The event had already been settled; nothing happened.
    AlreadySettled,
}

struct Slot {
    handler: Option<ResultHandler>,
    claimed: bool,
    state: EventState,
    query: Option<QueryHandle>,
}

/// A single outstanding counter report.
pub struct CounterEvent {
    id: CounterEventId,
    kind: ReportCounterType,
    address: u64,
    invalid: AtomicBool,
    disposed: AtomicBool,
    slot: Mutex<Slot>,
    settled: Condvar,
}

impl CounterEvent {
    pub(crate) fn new(kind: ReportCounterType, address: u64, handler: ResultHandler) -> Arc<Self> {
        Arc::new(Self {
            id: CounterEventId::next(),
            kind,
            address,
            invalid: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            slot: Mutex::new(Slot {
                handler: Some(handler),
                claimed: false,
                state: EventState::Pending,
                query: None,
            }),
            settled: Condvar::new(),
        })
    }

    pub fn id(&self) -> CounterEventId {
        self.id
    }

    pub fn kind(&self) -> ReportCounterType {
        self.kind
    }

    /// Guest address the result is written to; also the backpressure key.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Suppress the pending memory write.
    ///
    /// The event stays registered until the backend settles it, so producers waiting on
    /// its address still observe normal ordering.
    pub fn invalidate(&self) {
        self.invalid.store(true, Ordering::SeqCst);
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Returns `true` only for the first caller.
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::SeqCst)
    }

    pub fn state(&self) -> EventState {
        self.slot.lock().state
    }

    pub fn is_settled(&self) -> bool {
        self.state() != EventState::Pending
    }

    /// Resolved value, if any.
    pub fn result(&self) -> Option<u64> {
        match self.state() {
            EventState::Resolved(value) => Some(value),
            _ => None,
        }
    }

    /// Block until the backend settles this event.
    ///
    /// Must not be called from the backend execution context.
    pub fn wait(&self) -> EventState {
        let mut slot = self.slot.lock();
        while slot.state == EventState::Pending {
            self.settled.wait(&mut slot);
        }
        slot.state
    }

    /// Block until settled or until `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<EventState> {
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => return Some(self.wait()),
        };
        let mut slot = self.slot.lock();
        while slot.state == EventState::Pending {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            self.settled.wait_for(&mut slot, remaining);
        }
        Some(slot.state)
    }

    pub(crate) fn query(&self) -> Option<QueryHandle> {
        self.slot.lock().query
    }

    pub(crate) fn set_query(&self, query: QueryHandle) {
        self.slot.lock().query = Some(query);
    }

    /// Settle the event with `value`, or cancel it with `None`.
    ///
    /// The handler is taken under the lock but runs outside it, and the state only leaves
    /// `Pending` once the handler has returned, so `wait()` never observes a resolution
    /// whose memory write is still in progress. The state is published even if the
    /// handler panics.
    pub(crate) fn complete(&self, value: Option<u64>) -> Completion {
        let handler = {
            let mut slot = self.slot.lock();
            if slot.claimed {
                return Completion::AlreadySettled;
            }
            slot.claimed = true;
            slot.handler.take()
        };

        let _publish = PublishState { event: self, value };
        match (value, handler) {
            (Some(value), Some(handler)) if !self.is_invalid() => {
                handler(value);
                Completion::Delivered
            }
            (Some(_), _) => Completion::Suppressed,
            (None, _) => Completion::Cancelled,
        }
    }
}

/// Publishes the final state of a claimed event when dropped, unwinding included.
struct PublishState<'a> {
    event: &'a CounterEvent,
    value: Option<u64>,
}

impl Drop for PublishState<'_> {
    fn drop(&mut self) {
        let mut slot = self.event.slot.lock();
        slot.state = match self.value {
            Some(value) => EventState::Resolved(value),
            None => EventState::Cancelled,
        };
        drop(slot);
        self.event.settled.notify_all();
    }
}

/// Releases an address in the in-flight registry when dropped, unwinding included.
struct ReleaseAddress<'a> {
    sync: Option<&'a SyncMap>,
    address: u64,
}

impl Drop for ReleaseAddress<'_> {
    fn drop(&mut self) {
        if let Some(sync) = self.sync.take() {
            sync.assign_sync(self.address);
        }
    }
}

impl std::fmt::Debug for CounterEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterEvent")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("address", &format_args!("{:#x}", self.address))
            .field("invalid", &self.is_invalid())
            .field("disposed", &self.is_disposed())
            .field("state", &self.state())
            .finish()
    }
}

/// Settle `event` and release its address in `sync`.
///
/// Pass `None` for events that were never registered. The registry entry is released
/// exactly once, by whichever path settles first, even if the result handler panics.
pub(crate) fn settle(
    event: &CounterEvent,
    sync: Option<&SyncMap>,
    stats: &StatsCounters,
    value: Option<u64>,
) -> Completion {
    let mut release = ReleaseAddress {
        sync,
        address: event.address(),
    };
    let completion = event.complete(value);
    match completion {
        Completion::Delivered => stats.counters_resolved.increment(),
        Completion::Suppressed => {
            stats.counters_resolved.increment();
            stats.writes_suppressed.increment();
        }
        Completion::Cancelled => stats.counters_cancelled.increment(),
        Completion::AlreadySettled => {
            release.sync = None;
            return completion;
        }
    }
    drop(release);
    log::trace!(
        "counter event {} at {:#x} settled: {:?}",
        event.id().raw(),
        event.address(),
        completion
    );
    completion
}

/// Single-use completion token handed to the backend for one query.
pub struct CounterResolver {
    event: Option<Arc<CounterEvent>>,
    kind: CounterType,
    sync: Arc<SyncMap>,
    stats: Arc<StatsCounters>,
}

impl CounterResolver {
    pub(crate) fn new(
        event: Arc<CounterEvent>,
        kind: CounterType,
        sync: Arc<SyncMap>,
        stats: Arc<StatsCounters>,
    ) -> Self {
        Self {
            event: Some(event),
            kind,
            sync,
            stats,
        }
    }

    /// Counter kind being queried.
    pub fn kind(&self) -> CounterType {
        self.kind
    }

    /// Identity of the event this resolver settles.
    pub fn event_id(&self) -> Option<CounterEventId> {
        self.event.as_ref().map(|event| event.id())
    }

    pub(crate) fn event(&self) -> Option<&Arc<CounterEvent>> {
        self.event.as_ref()
    }

    /// Deliver the native query result.
    pub fn resolve(mut self, value: u64) -> Completion {
        match self.event.take() {
            Some(event) => settle(&event, Some(&self.sync), &self.stats, Some(value)),
            None => Completion::AlreadySettled,
        }
    }

    /// Give up on the query without a value.
    pub fn cancel(mut self) -> Completion {
        match self.event.take() {
            Some(event) => settle(&event, Some(&self.sync), &self.stats, None),
            None => Completion::AlreadySettled,
        }
    }
}

impl Drop for CounterResolver {
    fn drop(&mut self) {
        if let Some(event) = self.event.take() {
            settle(&event, Some(&self.sync), &self.stats, None);
        }
    }
}

impl std::fmt::Debug for CounterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterResolver")
            .field("kind", &self.kind)
            .field("event", &self.event_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn counting_handler(calls: &Arc<AtomicUsize>, last: &Arc<AtomicU64>) -> ResultHandler {
        let calls = calls.clone();
        let last = last.clone();
        Box::new(move |value| {
            calls.fetch_add(1, Ordering::SeqCst);
            last.store(value, Ordering::SeqCst);
        })
    }

    fn resolver_for(event: &Arc<CounterEvent>, sync: &Arc<SyncMap>) -> CounterResolver {
        sync.create_sync_handle(event.address());
        CounterResolver::new(
            event.clone(),
            CounterType::SamplesPassed,
            sync.clone(),
            Arc::new(StatsCounters::default()),
        )
    }

    #[test]
    fn test_ids_are_unique() {
        let a = CounterEvent::new(ReportCounterType::Zero, 0, Box::new(|_| {}));
        let b = CounterEvent::new(ReportCounterType::Zero, 0, Box::new(|_| {}));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_resolve_invokes_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicU64::new(0));
        let event = CounterEvent::new(
            ReportCounterType::SamplesPassed,
            0x1000,
            counting_handler(&calls, &last),
        );
        let sync = Arc::new(SyncMap::new());
        let resolver = resolver_for(&event, &sync);

        assert_eq!(resolver.resolve(42), Completion::Delivered);
        assert_eq!(event.complete(Some(7)), Completion::AlreadySettled);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 42);
        assert_eq!(event.state(), EventState::Resolved(42));
        assert!(!sync.is_in_flight(0x1000));
    }

    #[test]
    fn test_invalidated_event_suppresses_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicU64::new(0));
        let event = CounterEvent::new(
            ReportCounterType::SamplesPassed,
            0x2000,
            counting_handler(&calls, &last),
        );
        let sync = Arc::new(SyncMap::new());
        let resolver = resolver_for(&event, &sync);

        event.invalidate();
        assert!(sync.is_in_flight(0x2000));
        assert_eq!(resolver.resolve(9), Completion::Suppressed);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(event.result(), Some(9));
        assert!(!sync.is_in_flight(0x2000));
    }

    #[test]
    fn test_dropped_resolver_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicU64::new(0));
        let event = CounterEvent::new(
            ReportCounterType::PrimitivesGenerated,
            0x3000,
            counting_handler(&calls, &last),
        );
        let sync = Arc::new(SyncMap::new());
        drop(resolver_for(&event, &sync));

        assert_eq!(event.state(), EventState::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!sync.is_in_flight(0x3000));
    }

    #[test]
    fn test_wait_observes_resolution_from_other_thread() {
        let event = CounterEvent::new(ReportCounterType::SamplesPassed, 0x10, Box::new(|_| {}));
        let sync = Arc::new(SyncMap::new());
        let resolver = resolver_for(&event, &sync);

        let waiter = {
            let event = event.clone();
            thread::spawn(move || event.wait())
        };
        thread::sleep(Duration::from_millis(10));
        resolver.resolve(5);

        assert_eq!(waiter.join().unwrap(), EventState::Resolved(5));
        assert_eq!(event.wait_timeout(Duration::from_millis(1)), Some(EventState::Resolved(5)));
    }

    #[test]
    fn test_wait_timeout_on_pending() {
        let event = CounterEvent::new(ReportCounterType::SamplesPassed, 0x10, Box::new(|_| {}));
        assert_eq!(event.wait_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_panicking_handler_still_settles() {
        let event = CounterEvent::new(
            ReportCounterType::SamplesPassed,
            0x4000,
            Box::new(|_| panic!("guest write failed")),
        );
        let sync = Arc::new(SyncMap::new());
        let resolver = resolver_for(&event, &sync);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            resolver.resolve(8);
        }));

        assert!(result.is_err());
        assert_eq!(event.wait_timeout(Duration::from_secs(1)), Some(EventState::Resolved(8)));
        assert!(!sync.is_in_flight(0x4000));
    }

    #[test]
    fn test_unregistered_event_leaves_registry_alone() {
        let event = CounterEvent::new(ReportCounterType::Zero, 0x5000, Box::new(|_| {}));
        let sync = SyncMap::new();
        // Someone else owns the address.
        sync.create_sync_handle(0x5000);

        let stats = StatsCounters::default();
        assert_eq!(settle(&event, None, &stats, Some(0)), Completion::Delivered);

        assert_eq!(event.state(), EventState::Resolved(0));
        assert!(sync.is_in_flight(0x5000));
    }

    #[test]
    fn test_wait_timeout_with_huge_duration() {
        let event = CounterEvent::new(ReportCounterType::SamplesPassed, 0x10, Box::new(|_| {}));
        let sync = Arc::new(SyncMap::new());
        resolver_for(&event, &sync).resolve(1);
        assert_eq!(event.wait_timeout(Duration::MAX), Some(EventState::Resolved(1)));
    }

    #[test]
    fn test_mark_disposed_once() {
        let event = CounterEvent::new(ReportCounterType::Zero, 0, Box::new(|_| {}));
        assert!(event.mark_disposed());
        assert!(!event.mark_disposed());
        assert!(event.is_disposed());
    }
}
