//! Diagnostic kinds and core types.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - something is probably wrong or suboptimal.
    Warning,
    /// Additional context about pipeline behavior.
    Note,
    /// Actionable suggestion to fix the issue.
    Help,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
            DiagnosticKind::Help => "help",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
///
/// Diagnostic codes follow the pattern:
/// - `GQ1xx` - Guest memory issues
/// - `GQ2xx` - Backend issues
/// - `GQ3xx` - Counter issues
/// - `GQ4xx` - Command channel issues
/// - `GQ9xx` - Internal errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "GQ101").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new informational diagnostic.
    pub const fn note(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Note,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[gpuquery][{}] {}: {}", self.code, self.kind.prefix(), self.message)
    }
}

// =============================================================================
// Predefined diagnostics (GQ1xx - Guest memory)
// =============================================================================

/// GQ101: Counter record could not be written.
pub const GQ101: Diagnostic = Diagnostic::warning(
    "GQ101",
    "counter report write to guest memory failed"
).with_note("the report address is not backed by guest memory")
 .with_help("check the semaphore address registers before issuing the report");

/// GQ102: Semaphore release payload could not be written.
pub const GQ102: Diagnostic = Diagnostic::warning(
    "GQ102",
    "semaphore release write to guest memory failed"
).with_note("the release address is not backed by guest memory")
 .with_help("check the semaphore address registers before issuing the release");

// =============================================================================
// Predefined diagnostics (GQ2xx - Backend)
// =============================================================================

/// GQ201: Backend refused a counter query.
pub const GQ201: Diagnostic = Diagnostic::warning(
    "GQ201",
    "backend rejected a counter query"
).with_note("the counter event was cancelled and its address released without a write");

/// GQ202: Backend refused a buffer upload.
pub const GQ202: Diagnostic = Diagnostic::warning(
    "GQ202",
    "backend rejected a buffer upload"
).with_note("the data was dropped");

// =============================================================================
// Predefined diagnostics (GQ3xx - Counters)
// =============================================================================

/// GQ301: A pending report was superseded by a newer one at the same address.
pub const GQ301: Diagnostic = Diagnostic::note(
    "GQ301",
    "counter report superseded by a newer report at the same address"
).with_note("the older result will not be written; the new report waits for it to settle");

// =============================================================================
// Predefined diagnostics (GQ4xx - Command channel)
// =============================================================================

/// GQ401: A command referenced a table slot that was already consumed.
pub const GQ401: Diagnostic = Diagnostic::error(
    "GQ401",
    "command referenced a stale table entry"
).with_note("the slot's generation doesn't match, indicating it was already taken")
 .with_help("each table reference must be consumed by exactly one command");

/// GQ402: A command was submitted after the channel closed.
pub const GQ402: Diagnostic = Diagnostic::warning(
    "GQ402",
    "command submitted after the channel was closed"
).with_note("the command was abandoned; counter reports it carried were cancelled");

// =============================================================================
// Predefined diagnostics (GQ9xx - Internal)
// =============================================================================

/// GQ901: The backend worker stopped unexpectedly.
pub const GQ901: Diagnostic = Diagnostic::error(
    "GQ901",
    "backend worker thread panicked"
).with_note("the command channel was closed and queued commands were abandoned")
 .with_help("this indicates a bug in the backend implementation");
