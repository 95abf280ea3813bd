//! Error kinds and host-level failures.
//!
//! Two layers of errors exist: language-level errors ([`ErrorKind`]) are
//! heap objects thrown through the interpreter's unwind path and catchable
//! by user code; host-level failures ([`FatalError`]) propagate out of the
//! step loop and cannot be caught.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a language-level error.
///
/// These correspond to the language's built-in error constructors and select
/// the prototype an error object is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Plain Error
    Error,
    /// EvalError
    EvalError,
    /// Value out of allowed range
    RangeError,
    /// Reference to an unresolvable identifier
    ReferenceError,
    /// Malformed source text
    SyntaxError,
    /// Operation applied to a value of the wrong type
    TypeError,
    /// Malformed URI handed to the URI functions
    URIError,
}

impl ErrorKind {
    /// The constructor name, used for the error object's `name` property.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::URIError => "URIError",
        }
    }

    /// All kinds, in the order their constructors are installed.
    pub fn all() -> [ErrorKind; 7] {
        [
            ErrorKind::Error,
            ErrorKind::EvalError,
            ErrorKind::RangeError,
            ErrorKind::ReferenceError,
            ErrorKind::SyntaxError,
            ErrorKind::TypeError,
            ErrorKind::URIError,
        ]
    }
}

/// A host-level failure.
///
/// These reflect either misuse of the embedding API or source constructs the
/// runtime refuses to execute; user code can never catch them, and legal
/// user-code operations can never produce one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    /// A construct the runtime does not execute (`with`, break/continue
    /// crossing a call boundary, malformed eval/appendCode/Function source).
    Syntax(String),
    /// An internal invariant was violated; indicates a bug, not user error.
    Internal(String),
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::Syntax(msg) => write!(f, "unsupported syntax: {}", msg),
            FatalError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for FatalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ErrorKind::TypeError.name(), "TypeError");
        assert_eq!(ErrorKind::Error.name(), "Error");
        assert_eq!(ErrorKind::all().len(), 7);
    }

    #[test]
    fn test_fatal_error_display() {
        let e = FatalError::Syntax("with statement".to_string());
        assert_eq!(e.to_string(), "unsupported syntax: with statement");
    }
}
