//! Backend commands.

use std::sync::Arc;

use super::table::{RefTable, TableRef};
use crate::counter::{CounterEvent, CounterResolver, CounterType};
use crate::gpu::{BufferHandle, GpuBackend};

/// Closure run against the backend on its execution context.
pub type DeferredAction = Box<dyn FnOnce(&mut dyn GpuBackend) + Send>;

/// A single backend operation.
///
/// Commands are plain values; heap-owned payloads live in the channel's [`RefTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start a native query and settle its event when the value arrives.
    ReportCounter {
        resolver: TableRef<CounterResolver>,
        kind: CounterType,
    },
    ResetCounter {
        kind: CounterType,
    },
    UpdateCounters,
    FlushCounters,
    /// Release the native query behind an event.
    DisposeCounter {
        event: TableRef<Arc<CounterEvent>>,
    },
    CreateSync {
        id: u64,
    },
    SetBufferData {
        buffer: BufferHandle,
        offset: u64,
        data: TableRef<Box<[u8]>>,
    },
    Action {
        action: TableRef<DeferredAction>,
    },
    Marker {
        tag: u64,
    },
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::ReportCounter { .. } => "ReportCounter",
            Command::ResetCounter { .. } => "ResetCounter",
            Command::UpdateCounters => "UpdateCounters",
            Command::FlushCounters => "FlushCounters",
            Command::DisposeCounter { .. } => "DisposeCounter",
            Command::CreateSync { .. } => "CreateSync",
            Command::SetBufferData { .. } => "SetBufferData",
            Command::Action { .. } => "Action",
            Command::Marker { .. } => "Marker",
        }
    }

    /// Drop the payloads this command owns without running it.
    ///
    /// An abandoned counter report drops its resolver, which cancels the event.
    pub(crate) fn abandon(self, table: &RefTable) {
        match self {
            Command::ReportCounter { resolver, .. } => drop(table.take(resolver)),
            Command::DisposeCounter { event } => drop(table.take(event)),
            Command::SetBufferData { data, .. } => drop(table.take(data)),
            Command::Action { action } => drop(table.take(action)),
            Command::ResetCounter { .. }
            | Command::UpdateCounters
            | Command::FlushCounters
            | Command::CreateSync { .. }
            | Command::Marker { .. } => {}
        }
    }
}
