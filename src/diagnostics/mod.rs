//! Pipeline diagnostics.
//!
//! This module provides:
//! - **Runtime diagnostics**: Pipeline-aware messages with codes
//! - **Sinks**: Route diagnostics into tests or tooling
//! - **Strict mode**: Optional panic-on-diagnostic for CI
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                        |
//! |-------|--------------------------------|
//! | GQ1xx | Guest memory issues            |
//! | GQ2xx | Backend issues                 |
//! | GQ3xx | Counter issues                 |
//! | GQ4xx | Command channel issues         |
//! | GQ9xx | Internal errors                |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gpuquery::{gq_diagnostic, gq_emit};
//!
//! // Emit a custom diagnostic
//! gq_diagnostic!(
//!     Warning,
//!     code = "GQ301",
//!     message = "counter report superseded",
//!     help = "wait for the previous report"
//! );
//!
//! // Emit a predefined diagnostic
//! gq_emit!(GQ402);
//! ```

pub mod emit;
pub mod kind;
pub mod macros;
pub mod strict;

pub use emit::{emit, emit_with_context, set_sink, suppress_diagnostics, CollectingSink, DiagnosticSink};
pub use kind::{Diagnostic, DiagnosticKind};
pub use strict::{set_strict_mode, strict_mode, StrictMode, StrictModeGuard};

// Re-export predefined diagnostics
pub use kind::{GQ101, GQ102, GQ201, GQ202, GQ301, GQ401, GQ402, GQ901};
