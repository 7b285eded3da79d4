//! Guest-facing semaphore unit.
//!
//! The guest programs the semaphore address and payload registers, then writes an
//! argument that selects what to do: release the payload, acquire (a no-op on this
//! engine), or report a counter. Reset-counter writes go through the same unit.

use std::sync::Arc;

use super::context::GpuContext;
use crate::counter::{
    CounterEvent, Decoded, ReportCounterType, ResetCounterType, SemaphoreOperation,
};

/// Semaphore registers as last written by the guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SemaphoreState {
    pub address_high: u32,
    pub address_low: u32,
    pub payload: u32,
}

impl SemaphoreState {
    /// Packed 40-bit guest address.
    pub fn address(&self) -> u64 {
        u64::from(self.address_low) | (u64::from(self.address_high & 0xff) << 32)
    }
}

/// Decodes semaphore arguments and forwards them to a [`GpuContext`].
#[derive(Debug, Default)]
pub struct SemaphoreReporter {
    state: SemaphoreState,
}

impl SemaphoreReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SemaphoreState {
        self.state
    }

    /// Only the low 8 bits are significant.
    pub fn set_address_high(&mut self, value: u32) {
        self.state.address_high = value;
    }

    pub fn set_address_low(&mut self, value: u32) {
        self.state.address_low = value;
    }

    pub fn set_payload(&mut self, value: u32) {
        self.state.payload = value;
    }

    /// Execute a semaphore operation.
    ///
    /// Returns the counter event for backend counter reports and inline zero reports;
    /// every other outcome returns `None`.
    pub fn report(&self, ctx: &GpuContext, argument: u32) -> Option<Arc<CounterEvent>> {
        match SemaphoreOperation::decode(argument) {
            Some(SemaphoreOperation::Release) => {
                self.release(ctx);
                None
            }
            Some(SemaphoreOperation::Counter) => match ReportCounterType::decode(argument) {
                Decoded::Mapped(kind) => self.report_counter(ctx, kind),
                Decoded::Unmapped(code) => {
                    log::trace!("ignoring counter report with unmapped type {code:#x}");
                    ctx.note_ignored();
                    None
                }
            },
            Some(SemaphoreOperation::Acquire) => {
                log::trace!("semaphore acquire ignored");
                ctx.note_ignored();
                None
            }
            None => {
                log::trace!("ignoring semaphore argument {argument:#x}");
                ctx.note_ignored();
                None
            }
        }
    }

    /// Write the payload register at the semaphore address.
    pub fn release(&self, ctx: &GpuContext) {
        ctx.release(self.state.address(), self.state.payload);
    }

    /// Report `kind` at the semaphore address.
    pub fn report_counter(
        &self,
        ctx: &GpuContext,
        kind: ReportCounterType,
    ) -> Option<Arc<CounterEvent>> {
        ctx.report_counter(kind, self.state.address())
    }

    /// Execute a reset-counter method write.
    pub fn reset_counter(&self, ctx: &GpuContext, argument: u32) {
        match ResetCounterType::decode(argument) {
            Decoded::Mapped(kind) => match kind.counter_type() {
                Some(counter_type) => ctx.reset_counter(counter_type),
                None => {
                    log::trace!("reset of untracked counter {kind:?} ignored");
                    ctx.note_ignored();
                }
            },
            Decoded::Unmapped(code) => {
                log::trace!("ignoring reset with unmapped counter {code:#x}");
                ctx.note_ignored();
            }
        }
    }
}
