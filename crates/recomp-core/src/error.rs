//! Error taxonomy. Plain hand-rolled enums, `Display` and `std::error::Error`
//! implemented by hand rather than via `thiserror`/`anyhow`.

use std::fmt;

/// Errors raised by the slot table, change list, and composition layers.
#[derive(Debug)]
pub enum CoreError {
    /// Structural invariant violation — parent anchor mismatch, group size mismatch, writer opened
    /// while a reader is outstanding, etc. Always fatal; carries the
    /// offending group index and expected-vs-actual detail in the message.
    StructuralInvariant(String),
    /// Concurrent misuse — writer opened while readers are outstanding, two concurrent
    /// writers, or a reader whose version is stale (the writer moved on).
    ConcurrentMisuse(&'static str),
    /// A reader's captured version no longer matches the table's current
    /// version: a writer opened and mutated the table after this reader was
    /// created.
    ConcurrentModification,
    /// User code exception — raised during composition or apply. Carries the
    /// operation name the change list was executing and a reconstructed
    /// composition stack trace built from slot-table source-information
    /// anchors, when available.
    UserCode {
        operation: &'static str,
        stack: Vec<String>,
        cause: String,
    },
    /// Paused-composition misuse — resume-after-apply, apply-before-complete, double apply,
    /// cancel-then-resume on a [`crate::recomposer::PausedComposition`].
    PausedCompositionMisuse(&'static str),
    /// Recomposer error state — recorded into the Recomposer's `errorState`; recoverable
    /// under hot-reload, otherwise rethrown on the next frame attempt.
    Recomposer { recoverable: bool, cause: String },
    /// Operation not supported in the caller's current mode (e.g. reading a
    /// slot value outside an open group run).
    Unsupported(&'static str),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::StructuralInvariant(msg) => write!(f, "structural invariant violated: {msg}"),
            CoreError::ConcurrentMisuse(msg) => write!(f, "concurrent misuse: {msg}"),
            CoreError::ConcurrentModification => {
                write!(f, "slot table was mutated while a reader was outstanding")
            }
            CoreError::UserCode { operation, cause, .. } => {
                write!(f, "user code raised during `{operation}`: {cause}")
            }
            CoreError::PausedCompositionMisuse(msg) => write!(f, "paused composition misuse: {msg}"),
            CoreError::Recomposer { recoverable, cause } => {
                write!(f, "recomposer error (recoverable={recoverable}): {cause}")
            }
            CoreError::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl CoreError {
    pub fn user_code(operation: &'static str, stack: Vec<String>, cause: impl fmt::Display) -> Self {
        CoreError::UserCode {
            operation,
            stack,
            cause: cause.to_string(),
        }
    }
}
