//! Diagnostic reporting for the code generator.
//!
//! The code generator treats its input as well-typed, so the errors produced
//! here are not user-facing source diagnostics: they are internal assertions
//! (an unexpected type classification, a missing cached binding) and module
//! verification failures. Emitters return `DiagnosticResult` and the public
//! API converts to `anyhow::Error` at the boundary.

use std::fmt;

/// Severity of a diagnostic.
///
/// `Bug` marks internal assertion failures: the generator received input it
/// believes the type checker can never produce, or its own caches are
/// inconsistent. `Error` marks failures surfaced to the caller, such as a
/// module that does not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Bug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Bug => write!(f, "internal error"),
        }
    }
}

/// A single diagnostic produced during code generation.
///
/// The optional `note` carries secondary context. For verification failures
/// and internal assertions it holds the dumped IR of the partial module so
/// the failure can be inspected without re-running generation.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub note: Option<String>,
}

impl Diagnostic {
    /// Creates a boxed diagnostic with only a message.
    ///
    /// Boxed because `DiagnosticResult` is threaded through every lowering
    /// call; keeping the error arm a single pointer keeps the Ok path lean.
    pub fn simple_boxed(severity: Severity, msg: impl Into<String>) -> Box<Diagnostic> {
        Box::new(Diagnostic {
            severity,
            message: msg.into(),
            note: None,
        })
    }

    /// Creates a boxed diagnostic with an attached note (typically an IR dump).
    pub fn with_note_boxed(
        severity: Severity,
        msg: impl Into<String>,
        note: impl Into<String>,
    ) -> Box<Diagnostic> {
        Box::new(Diagnostic {
            severity,
            message: msg.into(),
            note: Some(note.into()),
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(note) = &self.note {
            write!(f, "\nnote: {}", note)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Result alias used by all lowering functions.
pub type DiagnosticResult<T> = Result<T, Box<Diagnostic>>;

/// Shorthand for the pervasive "internal error" case.
pub fn bug<T>(msg: impl Into<String>) -> DiagnosticResult<T> {
    Err(Diagnostic::simple_boxed(Severity::Bug, msg))
}
