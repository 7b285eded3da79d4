//! Diagnostic emission backend.
//!
//! Diagnostics go to the `log` facade and, when one is installed, to a global
//! [`DiagnosticSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::kind::{Diagnostic, DiagnosticKind};
use super::strict::strict_mode;
use crate::sync::mutex::Mutex;

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Global sink receiving every emitted diagnostic.
static SINK: RwLock<Option<Arc<dyn DiagnosticSink>>> = RwLock::new(None);

/// Suppress all diagnostic output.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Install a global sink, replacing any previous one.
pub fn set_sink(sink: Option<Arc<dyn DiagnosticSink>>) {
    *SINK.write().unwrap_or_else(|e| e.into_inner()) = sink;
}

/// Emit a diagnostic.
pub fn emit(diag: &Diagnostic) {
    emit_inner(diag, None);
}

/// Emit a diagnostic with additional runtime context.
pub fn emit_with_context(diag: &Diagnostic, context: &str) {
    emit_inner(diag, Some(context));
}

fn emit_inner(diag: &Diagnostic, context: Option<&str>) {
    if is_suppressed() {
        return;
    }

    emit_to_log(diag, context);

    let sink = SINK.read().unwrap_or_else(|e| e.into_inner()).clone();
    if let Some(sink) = sink {
        sink.emit(diag);
    }

    let fatal = strict_mode().is_fatal(diag.kind);
    // Never turn an unwind into an abort.
    if fatal && !std::thread::panicking() {
        panic!(
            "{}\nContext: {}\nStrict mode enabled - diagnostics are fatal.",
            diag,
            context.unwrap_or("-")
        );
    }
}

fn emit_to_log(diag: &Diagnostic, context: Option<&str>) {
    let level = match diag.kind {
        DiagnosticKind::Error => log::Level::Error,
        DiagnosticKind::Warning => log::Level::Warn,
        DiagnosticKind::Note | DiagnosticKind::Help => log::Level::Debug,
    };
    if !log::log_enabled!(target: "gpuquery::diagnostics", level) {
        return;
    }

    log::log!(target: "gpuquery::diagnostics", level, "[{}] {}", diag.code, diag.message);
    if let Some(context) = context {
        log::log!(target: "gpuquery::diagnostics", level, "  context: {}", context);
    }
    if let Some(note) = diag.note {
        log::log!(target: "gpuquery::diagnostics", level, "  note: {}", note);
    }
    if let Some(help) = diag.help {
        log::log!(target: "gpuquery::diagnostics", level, "  help: {}", help);
    }
}

/// A diagnostic sink trait for custom output.
pub trait DiagnosticSink: Send + Sync {
    /// Handle a diagnostic.
    fn emit(&self, diag: &Diagnostic);
}

/// A simple sink that collects diagnostics.
#[derive(Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    /// Create a new collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    /// Whether a diagnostic with `code` was collected.
    pub fn contains(&self, code: &str) -> bool {
        self.diagnostics.lock().iter().any(|d| d.code == code)
    }

    /// Clear collected diagnostics.
    pub fn clear(&self) {
        self.diagnostics.lock().clear();
    }

    /// Check if any errors were collected.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .lock()
            .iter()
            .any(|d| d.kind == DiagnosticKind::Error)
    }
}

impl DiagnosticSink for CollectingSink {
    fn emit(&self, diag: &Diagnostic) {
        self.diagnostics.lock().push(diag.clone());
    }
}
