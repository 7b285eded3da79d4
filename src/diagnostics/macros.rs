//! Diagnostic macros.
//!
//! These macros provide a clean, rustc-like diagnostic experience.

/// Emit a custom runtime diagnostic.
///
/// Compiled out of release builds unless the `diagnostics` feature is on.
///
/// # Example
///
/// ```rust,ignore
/// gq_diagnostic!(
///     Warning,
///     code = "GQ301",
///     message = "counter report superseded",
///     help = "wait for the previous report before reusing its address"
/// );
/// ```
#[macro_export]
macro_rules! gq_diagnostic {
    (
        $kind:ident,
        code = $code:expr,
        message = $msg:expr
        $(, note = $note:expr)?
        $(, help = $help:expr)?
    ) => {{
        #[cfg(any(debug_assertions, feature = "diagnostics"))]
        {
            let diag = $crate::diagnostics::Diagnostic {
                kind: $crate::diagnostics::DiagnosticKind::$kind,
                code: $code,
                message: $msg,
                note: None $(.or(Some($note)))?,
                help: None $(.or(Some($help)))?,
            };
            $crate::diagnostics::emit::emit(&diag);
        }
    }};
}

/// Emit a predefined diagnostic by code.
///
/// # Example
///
/// ```rust,ignore
/// gq_emit!(GQ402);
/// ```
#[macro_export]
macro_rules! gq_emit {
    ($code:ident) => {{
        $crate::diagnostics::emit::emit(&$crate::diagnostics::$code);
    }};
}

/// Emit a predefined diagnostic with formatted runtime context.
///
/// # Example
///
/// ```rust,ignore
/// gq_emit_ctx!(GQ101, "address {:#x}", address);
/// ```
#[macro_export]
macro_rules! gq_emit_ctx {
    ($code:ident, $($arg:tt)+) => {{
        $crate::diagnostics::emit::emit_with_context(
            &$crate::diagnostics::$code,
            &format!($($arg)+),
        );
    }};
}

// Re-export macros at module level for convenience
pub use crate::{gq_diagnostic, gq_emit, gq_emit_ctx};
