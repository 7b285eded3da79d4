//! Command channel between the emulation thread and the backend executor.
//!
//! Commands are pushed onto a lock-free queue and popped in FIFO order by a single
//! consumer. The mutex only guards the wake-up handshake (and the capacity check when
//! the channel is bounded); it is never held while a command executes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;

use super::command::Command;
use super::table::{RefTable, TableObject, TableRef};
use crate::api::stats::StatsCounters;
use crate::sync::mutex::{Condvar, Mutex};

/// Errors raised by the command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel no longer accepts commands.
    Closed,
    /// A table reference did not match a live slot.
    StaleRef { index: u32, generation: u32 },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "command channel is closed"),
            ChannelError::StaleRef { index, generation } => {
                write!(f, "stale table reference (slot {index}, generation {generation})")
            }
        }
    }
}

impl std::error::Error for ChannelError {}

/// Ordered multi-producer, single-consumer command queue plus its payload table.
pub struct CommandChannel {
    queue: SegQueue<Command>,
    table: RefTable,
    /// Maximum queued commands; 0 means unbounded.
    capacity: usize,
    closed: AtomicBool,
    signal: Mutex<()>,
    available: Condvar,
    space: Condvar,
    stats: Arc<StatsCounters>,
}

impl CommandChannel {
    pub(crate) fn new(capacity: usize, stats: Arc<StatsCounters>) -> Self {
        Self {
            queue: SegQueue::new(),
            table: RefTable::new(),
            capacity,
            closed: AtomicBool::new(false),
            signal: Mutex::new(()),
            available: Condvar::new(),
            space: Condvar::new(),
            stats,
        }
    }

    /// Park a payload for a command about to be enqueued.
    pub fn insert<T: TableObject>(&self, value: T) -> TableRef<T> {
        self.table.insert(value)
    }

    /// Take a payload referenced by a dequeued command.
    pub fn take<T: TableObject>(&self, reference: TableRef<T>) -> Result<T, ChannelError> {
        self.table.take(reference)
    }

    /// Append a command.
    ///
    /// Blocks while a bounded channel is full. A closed channel abandons the command.
    pub fn enqueue(&self, command: Command) -> Result<(), ChannelError> {
        let mut signal = self.signal.lock();
        if self.capacity > 0 {
            while self.queue.len() >= self.capacity && !self.is_closed() {
                self.space.wait(&mut signal);
            }
        }

        if self.is_closed() {
            drop(signal);
            self.abandon(command);
            return Err(ChannelError::Closed);
        }

        self.queue.push(command);
        self.stats.commands_enqueued.increment();
        self.stats.queue_depth.push();
        drop(signal);
        self.available.notify_one();
        Ok(())
    }

    /// Pop the next command without blocking.
    pub fn try_pop(&self) -> Option<Command> {
        let command = self.queue.pop()?;
        self.stats.queue_depth.pop();
        if self.capacity > 0 {
            let _signal = self.signal.lock();
            self.space.notify_all();
        }
        Some(command)
    }

    /// Pop the next command, blocking until one arrives.
    ///
    /// Returns `None` once the channel is closed and drained.
    pub fn pop_blocking(&self) -> Option<Command> {
        loop {
            if let Some(command) = self.try_pop() {
                return Some(command);
            }
            let mut signal = self.signal.lock();
            if !self.queue.is_empty() {
                continue;
            }
            if self.is_closed() {
                return None;
            }
            self.available.wait(&mut signal);
        }
    }

    /// Stop accepting commands and wake every blocked thread.
    ///
    /// Commands already queued stay available to the consumer.
    pub fn close(&self) {
        let _signal = self.signal.lock();
        self.closed.store(true, Ordering::SeqCst);
        self.available.notify_all();
        self.space.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drop a command's payloads without executing it.
    pub(crate) fn abandon(&self, command: Command) {
        log::debug!("abandoning {} command", command.name());
        self.stats.commands_abandoned.increment();
        command.abandon(&self.table);
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }

    /// Payloads parked and not yet consumed.
    pub fn parked(&self) -> usize {
        self.table.len()
    }
}

impl fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn channel(capacity: usize) -> Arc<CommandChannel> {
        Arc::new(CommandChannel::new(capacity, Arc::new(StatsCounters::default())))
    }

    #[test]
    fn test_fifo_order() {
        let channel = channel(0);
        for tag in 0..100 {
            channel.enqueue(Command::Marker { tag }).unwrap();
        }
        for tag in 0..100 {
            assert_eq!(channel.try_pop(), Some(Command::Marker { tag }));
        }
        assert_eq!(channel.try_pop(), None);
    }

    #[test]
    fn test_consumer_wakes_on_enqueue() {
        let channel = channel(0);
        let consumer = {
            let channel = channel.clone();
            thread::spawn(move || {
                let mut tags = Vec::new();
                while let Some(Command::Marker { tag }) = channel.pop_blocking() {
                    tags.push(tag);
                }
                tags
            })
        };

        for tag in 0..50 {
            channel.enqueue(Command::Marker { tag }).unwrap();
        }
        channel.close();

        assert_eq!(consumer.join().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_enqueue_after_close_abandons() {
        let stats = Arc::new(StatsCounters::default());
        let channel = CommandChannel::new(0, stats.clone());
        let data = channel.insert::<Box<[u8]>>(Box::new([1, 2, 3]));
        channel.close();

        let result = channel.enqueue(Command::SetBufferData {
            buffer: crate::gpu::BufferHandle(0),
            offset: 0,
            data,
        });
        assert_eq!(result, Err(ChannelError::Closed));
        assert_eq!(channel.parked(), 0);
        assert_eq!(stats.commands_abandoned.get(), 1);
        assert_eq!(channel.pop_blocking(), None);
    }

    #[test]
    fn test_bounded_channel_blocks_producer() {
        let channel = channel(2);
        channel.enqueue(Command::Marker { tag: 0 }).unwrap();
        channel.enqueue(Command::Marker { tag: 1 }).unwrap();

        let producer = {
            let channel = channel.clone();
            thread::spawn(move || channel.enqueue(Command::Marker { tag: 2 }))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(channel.len(), 2);

        assert_eq!(channel.try_pop(), Some(Command::Marker { tag: 0 }));
        producer.join().unwrap().unwrap();
        assert_eq!(channel.try_pop(), Some(Command::Marker { tag: 1 }));
        assert_eq!(channel.try_pop(), Some(Command::Marker { tag: 2 }));
    }

    #[test]
    fn test_close_releases_blocked_producer() {
        let channel = channel(1);
        channel.enqueue(Command::UpdateCounters).unwrap();

        let producer = {
            let channel = channel.clone();
            thread::spawn(move || channel.enqueue(Command::FlushCounters))
        };
        thread::sleep(Duration::from_millis(20));
        channel.close();

        assert_eq!(producer.join().unwrap(), Err(ChannelError::Closed));
        assert_eq!(channel.pop_blocking(), Some(Command::UpdateCounters));
        assert_eq!(channel.pop_blocking(), None);
    }
}
