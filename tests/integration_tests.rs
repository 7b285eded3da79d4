//! Integration tests for gpuquery.

use gpuquery::diagnostics::{set_sink, CollectingSink};
use gpuquery::{
    nanoseconds_to_ticks, BackendOp, BackendThreading, CounterRecord, CounterType, DummyBackend,
    DummyBackendHandle, EventState, GpuConfig, GpuContext, GuestMemory, GuestMemoryError,
    ManualClock, ReportCounterType, SemaphoreReporter, VecGuestMemory, COUNTER_RECORD_SIZE,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SAMPLES_PASSED: u32 = 2 | (0x15 << 23);
const PRIMITIVES_GENERATED: u32 = 2 | (0x12 << 23);
const ZERO: u32 = 2;

struct Harness {
    ctx: GpuContext,
    backend: DummyBackendHandle,
    memory: Arc<VecGuestMemory>,
    clock: Arc<ManualClock>,
}

fn harness(config: GpuConfig) -> Harness {
    let (backend, handle) = DummyBackend::new();
    let memory = Arc::new(VecGuestMemory::new(0x10000));
    let clock = Arc::new(ManualClock::new(0));
    let ctx = GpuContext::with_clock(config, backend, memory.clone(), clock.clone());
    Harness {
        ctx,
        backend: handle,
        memory,
        clock,
    }
}

fn read_record(memory: &VecGuestMemory, address: u64) -> CounterRecord {
    let mut bytes = [0u8; COUNTER_RECORD_SIZE];
    memory.read(address, &mut bytes).unwrap();
    CounterRecord::from_bytes(bytes)
}

fn reporter_at(address: u64) -> SemaphoreReporter {
    let mut reporter = SemaphoreReporter::new();
    reporter.set_address_high((address >> 32) as u32);
    reporter.set_address_low(address as u32);
    reporter
}

#[test]
fn test_release_writes_payload_and_advances_sequence() {
    let h = harness(GpuConfig::synchronous());
    let mut reporter = reporter_at(0x2000);
    reporter.set_payload(0xcafe_f00d);

    reporter.report(&h.ctx, 0);

    assert_eq!(h.memory.read_u32(0x2000).unwrap(), 0xcafe_f00d);
    assert_eq!(h.ctx.sequence_number(), 1);
    assert_eq!(h.memory.dirty_pages(), vec![2]);
    assert_eq!(h.ctx.stats().releases, 1);
}

#[test]
fn test_zero_report_resolves_before_returning() {
    for config in [GpuConfig::synchronous(), GpuConfig::threaded()] {
        let h = harness(config);
        h.clock.set(1_000_000_000);
        let reporter = reporter_at(0x3000);

        let event = reporter.report(&h.ctx, ZERO).unwrap();

        assert_eq!(event.state(), EventState::Resolved(0));
        let record = read_record(&h.memory, 0x3000);
        assert_eq!(record.counter, 0);
        assert_eq!(record.timestamp, 614_400_000);
        // Counter records bypass dirty tracking.
        assert!(h.memory.dirty_pages().is_empty());
    }
}

#[test]
fn test_samples_passed_end_to_end_threaded() {
    let h = harness(GpuConfig::threaded());
    assert!(h.ctx.is_threaded());
    h.backend.set_counter(CounterType::SamplesPassed, 42);
    h.clock.set(1_000_000);
    let issued_at = nanoseconds_to_ticks(1_000_000);

    let reporter = reporter_at(0x1000);
    let event = reporter.report(&h.ctx, SAMPLES_PASSED).unwrap();
    assert_eq!(event.address(), 0x1000);

    let waiter = {
        let ctx = h.ctx.clone();
        let memory = h.memory.clone();
        thread::spawn(move || {
            ctx.wait_counter(0x1000);
            read_record(&memory, 0x1000)
        })
    };

    // Time moves on before the backend answers.
    h.clock.advance(5_000_000);
    thread::sleep(Duration::from_millis(10));
    h.ctx.update_counters();

    let record = waiter.join().unwrap();
    assert_eq!(record, CounterRecord::new(42, issued_at));
    assert_eq!(event.wait(), EventState::Resolved(42));
    assert_eq!(h.ctx.counters_in_flight(), 0);
}

#[test]
fn test_invalidated_event_writes_nothing() {
    let h = harness(GpuConfig::threaded());
    h.backend.set_counter(CounterType::PrimitivesGenerated, 77);
    let reporter = reporter_at(0x4000);

    let event = reporter.report(&h.ctx, PRIMITIVES_GENERATED).unwrap();
    event.invalidate();
    h.ctx.flush_counters();
    h.ctx.wait_counter(0x4000);

    assert_eq!(event.state(), EventState::Resolved(77));
    assert_eq!(read_record(&h.memory, 0x4000), CounterRecord::new(0, 0));
    assert_eq!(h.memory.untracked_writes(), 0);
    assert_eq!(h.ctx.stats().writes_suppressed, 1);
}

#[test]
fn test_supersession_at_same_address() {
    let h = harness(GpuConfig::threaded());
    let reporter = reporter_at(0x5000);

    h.backend.set_counter(CounterType::SamplesPassed, 1);
    let first = reporter.report(&h.ctx, SAMPLES_PASSED).unwrap();

    // The second report retires the first before registering itself.
    let second = reporter.report(&h.ctx, SAMPLES_PASSED).unwrap();
    assert!(first.is_invalid());
    assert_eq!(first.state(), EventState::Resolved(1));
    assert_eq!(read_record(&h.memory, 0x5000).counter, 0);
    assert!(Arc::ptr_eq(&h.ctx.pending_counter(0x5000).unwrap(), &second));

    h.backend.set_counter(CounterType::SamplesPassed, 2);
    h.ctx.update_counters();
    h.ctx.wait_counter(0x5000);

    assert_eq!(second.wait(), EventState::Resolved(2));
    assert_eq!(read_record(&h.memory, 0x5000).counter, 2);
    assert_eq!(h.memory.untracked_writes(), 1);
}

#[test]
fn test_commands_execute_in_fifo_order() {
    for config in [
        GpuConfig::synchronous(),
        GpuConfig::threaded(),
        GpuConfig::threaded().with_command_queue_capacity(4),
    ] {
        let h = harness(config);
        for tag in 0..1000 {
            h.ctx.marker(tag);
        }
        h.ctx.create_sync(1);
        h.ctx.wait_sync(1);

        assert_eq!(h.backend.markers(), (0..1000).collect::<Vec<_>>());
    }
}

#[test]
fn test_many_waiters_on_one_address() {
    let h = harness(GpuConfig::threaded());
    h.backend.set_counter(CounterType::SamplesPassed, 3);
    reporter_at(0x6000).report(&h.ctx, SAMPLES_PASSED).unwrap();

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let ctx = h.ctx.clone();
            let memory = h.memory.clone();
            thread::spawn(move || {
                ctx.wait_counter(0x6000);
                read_record(&memory, 0x6000).counter
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(10));
    h.ctx.update_counters();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), 3);
    }
}

#[test]
fn test_independent_addresses_do_not_block() {
    let h = harness(GpuConfig::threaded());
    let first = reporter_at(0x7000).report(&h.ctx, SAMPLES_PASSED).unwrap();
    let second = reporter_at(0x7100).report(&h.ctx, SAMPLES_PASSED).unwrap();

    assert!(!first.is_invalid());
    assert!(!second.is_invalid());
    assert_eq!(h.ctx.counters_in_flight(), 2);

    h.ctx.flush_counters();
    h.ctx.wait_counter(0x7000);
    h.ctx.wait_counter(0x7100);
    assert_eq!(h.ctx.counters_in_flight(), 0);
}

#[test]
fn test_reset_counter_reaches_backend() {
    let h = harness(GpuConfig::synchronous());
    h.backend.set_counter(CounterType::SamplesPassed, 500);
    let reporter = reporter_at(0x8000);

    reporter.reset_counter(&h.ctx, 0x01);
    let event = reporter.report(&h.ctx, SAMPLES_PASSED).unwrap();
    h.ctx.update_counters();

    assert_eq!(event.result(), Some(0));
    assert_eq!(
        h.backend.ops(),
        vec![
            BackendOp::ResetCounter(CounterType::SamplesPassed),
            BackendOp::ReportCounter(CounterType::SamplesPassed),
            BackendOp::UpdateCounters,
        ]
    );
}

#[test]
fn test_unrecognized_operations_are_noops() {
    let h = harness(GpuConfig::synchronous());
    let reporter = reporter_at(0x9000);

    for argument in [1, 3, 2 | (0x02 << 23), 2 | (0x1f << 23), 2 | (0x1e << 23)] {
        assert!(reporter.report(&h.ctx, argument).is_none());
    }
    reporter.reset_counter(&h.ctx, 0x55);

    assert_eq!(h.memory.tracked_writes() + h.memory.untracked_writes(), 0);
    assert_eq!(h.ctx.sequence_number(), 0);
    assert!(h.backend.ops().is_empty());
}

#[test]
fn test_fast_gpu_time_scales_timestamps_only() {
    let h = harness(GpuConfig::synchronous().with_fast_gpu_time(true));
    h.clock.set(1_000_000_000);
    let mut reporter = reporter_at(0xa000);
    reporter.set_payload(0x1234);

    reporter.report(&h.ctx, ZERO).unwrap();
    reporter.set_address_low(0xa100);
    reporter.report(&h.ctx, 0);

    assert_eq!(read_record(&h.memory, 0xa000).timestamp, 614_400_000 / 256);
    assert_eq!(h.memory.read_u32(0xa100).unwrap(), 0x1234);
}

#[test]
fn test_inline_and_threaded_are_equivalent() {
    fn run(config: GpuConfig) -> (Vec<u8>, Vec<BackendOp>) {
        let h = harness(config);
        h.clock.set(123_456_789);
        let mut reporter = reporter_at(0x100);

        for round in 0..16u32 {
            h.backend.set_counter(CounterType::SamplesPassed, u64::from(round) * 10);
            reporter.set_address_low(0x100 + round * 0x20);
            reporter.set_payload(round);
            reporter.report(&h.ctx, 0);
            reporter.set_address_low(0x1000 + round * 0x20);
            reporter.report(&h.ctx, SAMPLES_PASSED);
            h.ctx.update_counters();
        }
        h.ctx.create_sync(1);
        h.ctx.wait_sync(1);

        let mut bytes = vec![0u8; 0x2000];
        h.memory.read(0, &mut bytes).unwrap();
        (bytes, h.backend.ops())
    }

    let inline = run(GpuConfig::synchronous());
    let threaded = run(GpuConfig::threaded());
    assert_eq!(inline, threaded);
}

#[test]
fn test_dropping_context_cancels_pending_events() {
    for threading in [BackendThreading::Off, BackendThreading::On] {
        let h = harness(GpuConfig::default().with_threading(threading));
        let event = reporter_at(0xb000).report(&h.ctx, SAMPLES_PASSED).unwrap();

        drop(h.ctx);

        assert_eq!(event.wait(), EventState::Cancelled);
        assert_eq!(h.backend.pending_queries(), 0);
        assert_eq!(h.memory.untracked_writes(), 0);
    }
}

#[test]
fn test_out_of_range_write_is_diagnosed() {
    let sink = Arc::new(CollectingSink::new());
    set_sink(Some(sink.clone()));

    let h = harness(GpuConfig::synchronous());
    let event = h.ctx.report_counter(ReportCounterType::Zero, 0xffff_0000).unwrap();
    h.ctx.release(0xffff_0000, 1);

    set_sink(None);
    assert_eq!(event.state(), EventState::Resolved(0));
    assert!(sink.contains("GQ101"));
    assert!(sink.contains("GQ102"));
    assert_eq!(h.ctx.sequence_number(), 1);
}

#[test]
fn test_stats_track_pipeline_activity() {
    let h = harness(GpuConfig::synchronous());
    let reporter = reporter_at(0xc000);

    reporter.report(&h.ctx, SAMPLES_PASSED).unwrap();
    reporter.report(&h.ctx, ZERO).unwrap();
    h.ctx.update_counters();
    reporter.report(&h.ctx, 1);

    let stats = h.ctx.stats();
    assert_eq!(stats.counters_reported, 2);
    assert_eq!(stats.counters_resolved, 2);
    assert_eq!(stats.writes_suppressed, 1);
    assert_eq!(stats.counters_pending(), 0);
    assert_eq!(stats.ignored_operations, 1);
    assert_eq!(stats.queue_depth, 0);
    assert!(stats.commands_executed >= 3);
    assert!(stats.to_string().contains("Pipeline Statistics:"));
}

/// Guest memory whose out-of-band writes blow up, as under fatal diagnostics.
struct PanickingMemory(VecGuestMemory);

impl GuestMemory for PanickingMemory {
    fn read(&self, address: u64, dst: &mut [u8]) -> Result<(), GuestMemoryError> {
        self.0.read(address, dst)
    }

    fn write(&self, address: u64, src: &[u8]) -> Result<(), GuestMemoryError> {
        self.0.write(address, src)
    }

    fn write_untracked(&self, _address: u64, _src: &[u8]) -> Result<(), GuestMemoryError> {
        panic!("untracked guest write failed");
    }
}

#[test]
fn test_panicking_write_on_worker_releases_address() {
    let (backend, handle) = DummyBackend::new();
    handle.set_counter(CounterType::SamplesPassed, 9);
    let memory = Arc::new(PanickingMemory(VecGuestMemory::new(0x1000)));
    let ctx = GpuContext::new(GpuConfig::threaded(), backend, memory);

    let event = ctx.report_counter(ReportCounterType::SamplesPassed, 0x100).unwrap();
    ctx.update_counters();

    assert_eq!(
        event.wait_timeout(Duration::from_secs(5)),
        Some(EventState::Resolved(9))
    );
    ctx.wait_counter(0x100);
    assert_eq!(ctx.counters_in_flight(), 0);
}
