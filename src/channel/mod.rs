//! Deferred command channel between the emulation thread and the backend.

pub mod command;
pub(crate) mod executor;
pub mod queue;
pub mod table;

pub use command::{Command, DeferredAction};
pub use queue::{ChannelError, CommandChannel};
pub use table::{RefTable, TableEntry, TableObject, TableRef};
