//! The GPU session object.
//!
//! A [`GpuContext`] owns everything one emulated GPU needs: the guest clock, the
//! release sequence counter, guest memory, the command channel and its executor, and
//! the registries that track in-flight counter reports and fences. Handles are cheap to
//! clone and share one session; dropping the last one shuts the backend down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::config::GpuConfig;
use super::stats::{PipelineStats, StatsCounters};
use crate::channel::executor::{BackendExecutor, ExecutorShared};
use crate::channel::{ChannelError, Command, CommandChannel, DeferredAction};
use crate::core::clock::{GuestClock, HostClock, StdHostClock};
use crate::counter::event::settle;
use crate::diagnostics::set_strict_mode;
use crate::counter::{
    CounterEvent, CounterQuery, CounterRecord, CounterResolver, CounterType, ReportCounterType,
    ResultHandler,
};
use crate::gpu::{BufferHandle, GpuBackend, GuestMemory};
use crate::sync::mutex::Mutex;
use crate::sync::SyncMap;
use crate::gq_emit_ctx;

struct ContextInner {
    config: GpuConfig,
    clock: GuestClock,
    sequence: AtomicU64,
    memory: Arc<dyn GuestMemory>,
    shared: Arc<ExecutorShared>,
    executor: BackendExecutor,
    /// In-flight counter reports, keyed by guest address.
    counter_sync: Arc<SyncMap>,
    /// Most recent counter event reported at each guest address.
    counters: Mutex<HashMap<u64, Arc<CounterEvent>>>,
    stats: Arc<StatsCounters>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.executor.shutdown();
        log::debug!("gpu context shut down\n{}", self.stats.snapshot());
    }
}

/// Handle to one emulated GPU pipeline.
///
/// All producer-side methods are called from the emulation thread. None of them may be
/// called from inside a [`run_on_backend`](Self::run_on_backend) closure: the backend
/// would then wait on itself.
#[derive(Clone)]
pub struct GpuContext {
    inner: Arc<ContextInner>,
}

impl GpuContext {
    /// Create a session timed by the host's monotonic clock.
    pub fn new(
        config: GpuConfig,
        backend: impl GpuBackend + 'static,
        memory: Arc<dyn GuestMemory>,
    ) -> Self {
        Self::with_clock(config, backend, memory, Arc::new(StdHostClock::new()))
    }

    /// Create a session timed by `host_clock`.
    ///
    /// A strict mode in `config` (see [`GpuConfig::from_env`]) is installed process-wide.
    pub fn with_clock(
        config: GpuConfig,
        backend: impl GpuBackend + 'static,
        memory: Arc<dyn GuestMemory>,
        host_clock: Arc<dyn HostClock>,
    ) -> Self {
        if let Some(mode) = config.strict {
            set_strict_mode(mode);
        }

        let stats = Arc::new(StatsCounters::default());
        let shared = Arc::new(ExecutorShared {
            channel: Arc::new(CommandChannel::new(config.command_queue_capacity, stats.clone())),
            stats: stats.clone(),
            fences: Arc::new(SyncMap::new()),
        });

        let backend_name = backend.name().to_string();
        let mut executor = BackendExecutor::inline(shared.clone(), Box::new(backend));
        if config.threading.resolve() {
            if let Err(err) = executor.spawn_worker(&config.worker_name) {
                log::warn!("failed to spawn backend worker, running inline: {err}");
            }
        }
        log::debug!(
            "gpu context created (backend={}, threaded={}, fast_gpu_time={})",
            backend_name,
            executor.is_threaded(),
            config.fast_gpu_time
        );

        Self {
            inner: Arc::new(ContextInner {
                clock: GuestClock::new(host_clock, config.fast_gpu_time),
                config,
                sequence: AtomicU64::new(0),
                memory,
                shared,
                executor,
                counter_sync: Arc::new(SyncMap::new()),
                counters: Mutex::new(HashMap::new()),
                stats,
            }),
        }
    }

    pub fn config(&self) -> &GpuConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &GuestClock {
        &self.inner.clock
    }

    /// Raw guest ticks for the current host time.
    pub fn ticks(&self) -> u64 {
        self.inner.clock.ticks()
    }

    /// Timestamp as written into counter records.
    pub fn timestamp(&self) -> u64 {
        self.inner.clock.timestamp()
    }

    pub fn memory(&self) -> &Arc<dyn GuestMemory> {
        &self.inner.memory
    }

    /// Whether commands run on a dedicated backend thread.
    pub fn is_threaded(&self) -> bool {
        self.inner.executor.is_threaded()
    }

    /// Snapshot of pipeline statistics.
    pub fn stats(&self) -> PipelineStats {
        self.inner.stats.snapshot()
    }

    // -------------------------------------------------------------------------
    // Sequencing
    // -------------------------------------------------------------------------

    /// Bump the release sequence number, returning the new value.
    pub fn advance_sequence(&self) -> u64 {
        self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn sequence_number(&self) -> u64 {
        self.inner.sequence.load(Ordering::SeqCst)
    }

    /// Write a 32-bit semaphore payload through the tracked path and advance the
    /// sequence number.
    pub fn release(&self, address: u64, payload: u32) {
        if let Err(err) = self.inner.memory.write(address, &payload.to_le_bytes()) {
            gq_emit_ctx!(GQ102, "{}", err);
        }
        self.inner.stats.releases.increment();
        let sequence = self.advance_sequence();
        log::trace!("release {payload:#x} at {address:#x} (sequence {sequence})");
    }

    // -------------------------------------------------------------------------
    // Counters
    // -------------------------------------------------------------------------

    /// Report a counter into guest memory at `address`.
    ///
    /// `Zero` reports are written before this returns. Backend counters are written by
    /// the executor once the native query completes; the returned event tracks that.
    /// Kinds that are not emulated return `None` and write nothing.
    ///
    /// A still-pending report at the same address is superseded: its write is
    /// suppressed and this call blocks until the backend has settled it. Reports to one
    /// address must come from a single producer thread.
    pub fn report_counter(
        &self,
        kind: ReportCounterType,
        address: u64,
    ) -> Option<Arc<CounterEvent>> {
        let counter_type = match kind.query() {
            CounterQuery::Unsupported => {
                log::trace!("ignoring unsupported counter report {kind:?} at {address:#x}");
                self.inner.stats.ignored_operations.increment();
                return None;
            }
            CounterQuery::Zero => None,
            CounterQuery::Backend(counter_type) => Some(counter_type),
        };

        // Sampled at issue time, not at resolution.
        let timestamp = self.timestamp();
        self.supersede(address);

        let event = CounterEvent::new(kind, address, self.counter_handler(address, timestamp));
        self.inner.stats.counters_reported.increment();
        self.inner.counters.lock().insert(address, event.clone());

        match counter_type {
            None => {
                // Never registered, so the address stays untouched in the registry.
                settle(&event, None, &self.inner.stats, Some(0));
            }
            Some(counter_type) => {
                self.inner.counter_sync.create_sync_handle(address);
                let resolver = CounterResolver::new(
                    event.clone(),
                    counter_type,
                    self.inner.counter_sync.clone(),
                    self.inner.stats.clone(),
                );
                let resolver = self.inner.shared.channel.insert(resolver);
                // A rejected command drops the resolver, which cancels the event.
                let _ = self.submit(Command::ReportCounter {
                    resolver,
                    kind: counter_type,
                });
            }
        }

        Some(event)
    }

    fn counter_handler(&self, address: u64, timestamp: u64) -> ResultHandler {
        let memory = self.inner.memory.clone();
        Box::new(move |counter| {
            let record = CounterRecord::new(counter, timestamp);
            if let Err(err) = memory.write_untracked(address, &record.to_bytes()) {
                gq_emit_ctx!(GQ101, "{}", err);
            }
        })
    }

    /// Retire whatever is still outstanding at `address`.
    fn supersede(&self, address: u64) {
        let previous = self.inner.counters.lock().get(&address).cloned();
        if let Some(previous) = previous {
            if !previous.is_settled() {
                previous.invalidate();
                gq_emit_ctx!(GQ301, "event {} at {:#x}", previous.id().raw(), address);
            }
        }

        if self.inner.counter_sync.is_in_flight(address) {
            // Without a live channel nothing would ever settle the old report.
            if self.submit(Command::FlushCounters).is_ok() {
                self.inner.counter_sync.wait_sync_availability(address);
            }
        }
    }

    /// Most recent counter event reported at `address`, settled or not.
    pub fn pending_counter(&self, address: u64) -> Option<Arc<CounterEvent>> {
        self.inner.counters.lock().get(&address).cloned()
    }

    /// Block until no counter report is in flight for `address`.
    pub fn wait_counter(&self, address: u64) {
        self.inner.counter_sync.wait_sync_availability(address);
    }

    /// Number of counter reports still waiting for the backend.
    pub fn counters_in_flight(&self) -> usize {
        self.inner.counter_sync.in_flight_count()
    }

    /// Release the native query behind `event`; its result will not be written.
    pub fn dispose_counter(&self, event: &Arc<CounterEvent>) {
        if !event.mark_disposed() {
            return;
        }
        event.invalidate();
        {
            let mut counters = self.inner.counters.lock();
            if counters
                .get(&event.address())
                .map_or(false, |current| Arc::ptr_eq(current, event))
            {
                counters.remove(&event.address());
            }
        }
        if event.kind().query() == CounterQuery::Zero {
            return;
        }
        let event = self.inner.shared.channel.insert(event.clone());
        let _ = self.submit(Command::DisposeCounter { event });
    }

    /// Reset the backend's running value of `kind`.
    pub fn reset_counter(&self, kind: CounterType) {
        let _ = self.submit(Command::ResetCounter { kind });
    }

    /// Let the backend deliver results for queries that have completed.
    pub fn update_counters(&self) {
        let _ = self.submit(Command::UpdateCounters);
    }

    /// Make the backend deliver every outstanding result.
    pub fn flush_counters(&self) {
        let _ = self.submit(Command::FlushCounters);
    }

    // -------------------------------------------------------------------------
    // Fences and generic commands
    // -------------------------------------------------------------------------

    /// Insert a host fence; [`wait_sync`](Self::wait_sync) on `id` returns once every
    /// command submitted before it has executed.
    pub fn create_sync(&self, id: u64) {
        self.inner.shared.fences.create_sync_handle(id);
        let _ = self.submit(Command::CreateSync { id });
    }

    /// Block until fence `id` has been reached.
    pub fn wait_sync(&self, id: u64) {
        self.inner.shared.fences.wait_sync_availability(id);
    }

    /// Upload a copy of `data` into a host buffer.
    pub fn set_buffer_data(&self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let data = self.inner.shared.channel.insert::<Box<[u8]>>(data.into());
        let _ = self.submit(Command::SetBufferData {
            buffer,
            offset,
            data,
        });
    }

    /// Run a closure against the backend, in order with every other command.
    pub fn run_on_backend(&self, action: impl FnOnce(&mut dyn GpuBackend) + Send + 'static) {
        let action: DeferredAction = Box::new(action);
        let action = self.inner.shared.channel.insert(action);
        let _ = self.submit(Command::Action { action });
    }

    /// Insert a debug marker into the command stream.
    pub fn marker(&self, tag: u64) {
        let _ = self.submit(Command::Marker { tag });
    }

    pub(crate) fn note_ignored(&self) {
        self.inner.stats.ignored_operations.increment();
    }

    fn submit(&self, command: Command) -> Result<(), ChannelError> {
        self.inner.executor.submit(command)
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("clock", &self.inner.clock)
            .field("threaded", &self.is_threaded())
            .field("sequence", &self.sequence_number())
            .field("channel", &self.inner.shared.channel)
            .field("counters_in_flight", &self.counters_in_flight())
            .finish()
    }
}
