//! Backend executor: drains the command channel and drives the backend.
//!
//! With threading on, a named worker thread owns the consumer side of the channel.
//! With threading off, the submitting thread drains the channel itself right after each
//! enqueue. Both paths run [`run_command`] under the backend lock, one command at a
//! time, in FIFO order.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::command::Command;
use super::queue::{ChannelError, CommandChannel};
use crate::api::stats::StatsCounters;
use crate::gpu::GpuBackend;
use crate::sync::mutex::Mutex;
use crate::sync::SyncMap;
use crate::{gq_emit, gq_emit_ctx};

/// State the executor shares with the producer side.
pub(crate) struct ExecutorShared {
    pub channel: Arc<CommandChannel>,
    pub stats: Arc<StatsCounters>,
    /// Fence ids created by `CreateSync`, released once the command has run.
    pub fences: Arc<SyncMap>,
}

impl ExecutorShared {
    /// Drop a command without running it, releasing anything waiting on it.
    pub fn abandon(&self, command: Command) {
        if let Command::CreateSync { id } = command {
            self.fences.assign_sync(id);
        }
        self.channel.abandon(command);
    }
}

pub(crate) struct BackendExecutor {
    shared: Arc<ExecutorShared>,
    backend: Arc<Mutex<Box<dyn GpuBackend>>>,
    threaded: bool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackendExecutor {
    /// Executor that runs commands on the submitting thread.
    pub fn inline(shared: Arc<ExecutorShared>, backend: Box<dyn GpuBackend>) -> Self {
        Self {
            shared,
            backend: Arc::new(Mutex::new(backend)),
            threaded: false,
            worker: Mutex::new(None),
        }
    }

    /// Move execution onto a named worker thread.
    ///
    /// On failure the executor stays inline.
    pub fn spawn_worker(&mut self, worker_name: &str) -> std::io::Result<()> {
        let shared = self.shared.clone();
        let backend = self.backend.clone();
        let handle = thread::Builder::new()
            .name(worker_name.to_string())
            .spawn(move || worker_loop(&shared, &backend))?;

        *self.worker.lock() = Some(handle);
        self.threaded = true;
        Ok(())
    }

    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    /// Enqueue a command and, in inline mode, run it before returning.
    pub fn submit(&self, command: Command) -> Result<(), ChannelError> {
        if let Err(err) = self.shared.channel.enqueue(command) {
            // The channel already dropped the payloads.
            if let Command::CreateSync { id } = command {
                self.shared.fences.assign_sync(id);
            }
            gq_emit_ctx!(GQ402, "{} command", command.name());
            return Err(err);
        }
        if !self.threaded {
            self.drain_inline();
        }
        Ok(())
    }

    /// Run queued commands on this thread until the channel is empty.
    ///
    /// If another thread is already draining, it picks up whatever this thread queued.
    fn drain_inline(&self) {
        loop {
            let Some(mut backend) = self.backend.try_lock() else {
                return;
            };
            while let Some(command) = self.shared.channel.try_pop() {
                run_command(&mut **backend, &self.shared, command);
            }
            drop(backend);

            // Commands queued after the last pop but before the unlock.
            if self.shared.channel.is_empty() {
                return;
            }
        }
    }

    /// Close the channel and wait for every queued command to finish.
    pub fn shutdown(&self) {
        self.shared.channel.close();
        let worker = self.worker.lock().take();
        match worker {
            // The last context handle was dropped by the worker itself.
            Some(handle) if handle.thread().id() == thread::current().id() => {}
            Some(handle) => {
                if handle.join().is_err() {
                    log::error!("backend worker exited with a panic");
                }
            }
            None => self.drain_inline(),
        }
    }
}

impl Drop for BackendExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Closes the channel when the worker exits, abandoning leftovers after a panic.
struct WorkerGuard<'a> {
    shared: &'a ExecutorShared,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        self.shared.channel.close();
        if thread::panicking() {
            gq_emit!(GQ901);
            while let Some(command) = self.shared.channel.try_pop() {
                self.shared.abandon(command);
            }
        }
    }
}

fn worker_loop(shared: &ExecutorShared, backend: &Mutex<Box<dyn GpuBackend>>) {
    let _guard = WorkerGuard { shared };
    log::debug!("backend worker started");

    while let Some(command) = shared.channel.pop_blocking() {
        let mut backend = backend.lock();
        run_command(&mut **backend, shared, command);
        // Drain the batch under one lock acquisition.
        while let Some(command) = shared.channel.try_pop() {
            run_command(&mut **backend, shared, command);
        }
    }

    log::debug!("backend worker stopped");
}

/// Execute one command against the backend.
pub(crate) fn run_command(backend: &mut dyn GpuBackend, shared: &ExecutorShared, command: Command) {
    log::trace!("executing {:?}", command);
    if let Err(err) = dispatch(backend, shared, command) {
        gq_emit_ctx!(GQ401, "{} command: {}", command.name(), err);
    }
    shared.stats.commands_executed.increment();
}

fn dispatch(
    backend: &mut dyn GpuBackend,
    shared: &ExecutorShared,
    command: Command,
) -> Result<(), ChannelError> {
    let channel = &shared.channel;
    match command {
        Command::ReportCounter { resolver, kind } => {
            let resolver = channel.take(resolver)?;
            let event = resolver.event().cloned();
            match backend.report_counter(kind, resolver) {
                Ok(query) => {
                    // A dispose issued meanwhile is queued behind this command and
                    // releases the query itself.
                    if let Some(event) = event {
                        event.set_query(query);
                    }
                }
                Err(err) => {
                    gq_emit_ctx!(GQ201, "{} rejected {:?}: {}", backend.name(), kind, err);
                }
            }
        }
        Command::ResetCounter { kind } => backend.reset_counter(kind),
        Command::UpdateCounters => backend.update_counters(),
        Command::FlushCounters => backend.flush_counters(),
        Command::DisposeCounter { event } => {
            let event = channel.take(event)?;
            if let Some(query) = event.query() {
                backend.dispose_counter(query);
            }
        }
        Command::CreateSync { id } => {
            backend.create_sync(id);
            shared.fences.assign_sync(id);
        }
        Command::SetBufferData {
            buffer,
            offset,
            data,
        } => {
            let data = channel.take(data)?;
            if let Err(err) = backend.set_buffer_data(buffer, offset, &data) {
                gq_emit_ctx!(GQ202, "{:?} at offset {:#x}: {}", buffer, offset, err);
            }
        }
        Command::Action { action } => {
            let action = channel.take(action)?;
            action(backend);
        }
        Command::Marker { tag } => backend.marker(tag),
    }
    Ok(())
}
