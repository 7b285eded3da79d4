//! Pipeline statistics.

use crate::sync::atomics::{AtomicCounter, DepthGauge};

/// Snapshot of pipeline activity since the context was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Commands accepted by the channel.
    pub commands_enqueued: u64,

    /// Commands run by the backend executor.
    pub commands_executed: u64,

    /// Commands dropped because the channel was closed.
    pub commands_abandoned: u64,

    /// Commands currently waiting in the channel.
    pub queue_depth: usize,

    /// Highest queue depth observed (high water mark).
    pub peak_queue_depth: usize,

    /// Semaphore release writes.
    pub releases: u64,

    /// Counter reports issued, including inline zero reports.
    pub counters_reported: u64,

    /// Counter events settled with a value.
    pub counters_resolved: u64,

    /// Counter events settled without a value.
    pub counters_cancelled: u64,

    /// Resolved events whose write was suppressed by invalidation.
    pub writes_suppressed: u64,

    /// Semaphore or reset arguments that decoded to a no-op.
    pub ignored_operations: u64,
}

impl PipelineStats {
    /// Counter events still waiting for the backend.
    pub fn counters_pending(&self) -> u64 {
        self.counters_reported
            .saturating_sub(self.counters_resolved)
            .saturating_sub(self.counters_cancelled)
    }
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pipeline Statistics:")?;
        writeln!(f, "  Commands enqueued:  {}", self.commands_enqueued)?;
        writeln!(f, "  Commands executed:  {}", self.commands_executed)?;
        writeln!(f, "  Commands abandoned: {}", self.commands_abandoned)?;
        writeln!(
            f,
            "  Queue depth:        {} (peak {})",
            self.queue_depth, self.peak_queue_depth
        )?;
        writeln!(f, "  Releases:           {}", self.releases)?;
        writeln!(f, "  Counters reported:  {}", self.counters_reported)?;
        writeln!(f, "  Counters resolved:  {}", self.counters_resolved)?;
        writeln!(f, "  Counters cancelled: {}", self.counters_cancelled)?;
        writeln!(f, "  Writes suppressed:  {}", self.writes_suppressed)?;
        writeln!(f, "  Ignored operations: {}", self.ignored_operations)?;
        Ok(())
    }
}

/// Live counters shared by the producer and the executor.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub commands_enqueued: AtomicCounter,
    pub commands_executed: AtomicCounter,
    pub commands_abandoned: AtomicCounter,
    pub queue_depth: DepthGauge,
    pub releases: AtomicCounter,
    pub counters_reported: AtomicCounter,
    pub counters_resolved: AtomicCounter,
    pub counters_cancelled: AtomicCounter,
    pub writes_suppressed: AtomicCounter,
    pub ignored_operations: AtomicCounter,
}

impl StatsCounters {
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            commands_enqueued: self.commands_enqueued.get(),
            commands_executed: self.commands_executed.get(),
            commands_abandoned: self.commands_abandoned.get(),
            queue_depth: self.queue_depth.get(),
            peak_queue_depth: self.queue_depth.peak(),
            releases: self.releases.get(),
            counters_reported: self.counters_reported.get(),
            counters_resolved: self.counters_resolved.get(),
            counters_cancelled: self.counters_cancelled.get(),
            writes_suppressed: self.writes_suppressed.get(),
            ignored_operations: self.ignored_operations.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_counters() {
        let stats = PipelineStats {
            counters_reported: 10,
            counters_resolved: 6,
            counters_cancelled: 1,
            ..Default::default()
        };
        assert_eq!(stats.counters_pending(), 3);
    }

    #[test]
    fn test_snapshot_reflects_counters() {
        let counters = StatsCounters::default();
        counters.releases.increment();
        counters.queue_depth.push();
        counters.queue_depth.push();
        counters.queue_depth.pop();

        let stats = counters.snapshot();
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.queue_depth, 1);
        assert_eq!(stats.peak_queue_depth, 2);
        assert!(stats.to_string().contains("Releases:           1"));
    }
}
