//! Counter virtualization: argument decoding, report records and counter events.

pub mod event;
pub mod kind;
pub mod record;

pub use event::{
    Completion, CounterEvent, CounterEventId, CounterResolver, EventState, QueryHandle,
    ResultHandler,
};
pub use kind::{
    CounterQuery, CounterType, Decoded, ReportCounterType, ResetCounterType, SemaphoreOperation,
};
pub use record::{CounterRecord, COUNTER_RECORD_SIZE};
