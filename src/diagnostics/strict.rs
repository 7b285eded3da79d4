//! Fatal diagnostics.
//!
//! CI runs can turn pipeline diagnostics into panics so a suppressed counter write or
//! a rejected query fails the test that caused it instead of scrolling past in a log.
//! The mode is process-wide; a [`GpuContext`](crate::GpuContext) built from a config
//! with [`GpuConfig::strict`](crate::GpuConfig::strict) set installs it on creation.

use std::sync::atomic::{AtomicU8, Ordering};

use super::kind::DiagnosticKind;

/// Which diagnostics abort the emitting thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrictMode {
    /// Log only.
    #[default]
    Warn,
    /// Panic on errors.
    PanicOnError,
    /// Panic on errors and warnings.
    PanicOnWarning,
}

impl StrictMode {
    /// Parse a `GPUQUERY_STRICT` value; `None` for anything unrecognized.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "0" | "off" | "warn" => Some(StrictMode::Warn),
            "1" | "error" | "true" => Some(StrictMode::PanicOnError),
            "2" | "warning" | "all" => Some(StrictMode::PanicOnWarning),
            _ => None,
        }
    }

    /// Whether a diagnostic of `kind` panics under this mode.
    pub fn is_fatal(self, kind: DiagnosticKind) -> bool {
        match kind {
            DiagnosticKind::Error => self != StrictMode::Warn,
            DiagnosticKind::Warning => self == StrictMode::PanicOnWarning,
            DiagnosticKind::Note | DiagnosticKind::Help => false,
        }
    }

    fn encode(self) -> u8 {
        match self {
            StrictMode::Warn => 0,
            StrictMode::PanicOnError => 1,
            StrictMode::PanicOnWarning => 2,
        }
    }

    fn decode(raw: u8) -> Self {
        match raw {
            1 => StrictMode::PanicOnError,
            2 => StrictMode::PanicOnWarning,
            _ => StrictMode::Warn,
        }
    }
}

static MODE: AtomicU8 = AtomicU8::new(0);

/// Install `mode` process-wide.
pub fn set_strict_mode(mode: StrictMode) {
    MODE.store(mode.encode(), Ordering::Relaxed);
}

/// Mode currently in force.
pub fn strict_mode() -> StrictMode {
    StrictMode::decode(MODE.load(Ordering::Relaxed))
}

/// Restores the previous mode when dropped.
pub struct StrictModeGuard {
    previous: StrictMode,
}

impl StrictModeGuard {
    pub fn new(mode: StrictMode) -> Self {
        let previous = strict_mode();
        set_strict_mode(mode);
        Self { previous }
    }
}

impl Drop for StrictModeGuard {
    fn drop(&mut self) {
        set_strict_mode(self.previous);
    }
}
