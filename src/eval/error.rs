//! Runtime failure kinds.
//!
//! Every failure is immediate and propagates untouched to the fixed-point
//! driver; nothing inside the evaluator recovers. The kinds are distinct and
//! carry the source location of the expression that raised them.

use thiserror::Error;

use crate::ir::symbol::Loc;

/// The discriminant of an [`EvalError`], for callers that dispatch on kind.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    Arithmetic,
    NonExhaustiveMatch,
    NonExhaustiveSwitch,
    User,
    UnboundVariable,
    TypeMismatch,
    Integrity,
    Host,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EvalError {
    /// Division or modulo by zero on an integer type, or a shift/exponent
    /// out of range.
    #[error("{msg} at {loc}")]
    Arithmetic { msg: &'static str, loc: Loc },
    /// A non-exhaustive pattern match fell through every case.
    #[error("non-exhaustive match at {loc}")]
    NonExhaustiveMatch { loc: Loc },
    /// A non-exhaustive switch fell through every branch.
    #[error("non-exhaustive switch at {loc}")]
    NonExhaustiveSwitch { loc: Loc },
    /// An explicit raise in the source program.
    #[error("explicit error raised at {loc}")]
    User { loc: Loc },
    /// Internal: a variable or definition symbol had no binding. Well-typed
    /// IR never reaches this.
    #[error("unbound symbol `{name}` at {loc}")]
    UnboundVariable { name: String, loc: Loc },
    /// Internal: a value had the wrong shape for its context, or an
    /// expression that may not be evaluated was reached.
    #[error("{msg} at {loc}")]
    TypeMismatch { msg: String, loc: Loc },
    /// A constraint with a `false` head had a satisfied body.
    #[error("integrity violation: a rule with a false head fired at {loc}")]
    Integrity { loc: Loc },
    /// A host callback reported failure.
    #[error("host call failed at {loc}: {msg}")]
    Host { msg: String, loc: Loc },
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::Arithmetic { .. } => ErrorKind::Arithmetic,
            EvalError::NonExhaustiveMatch { .. } => ErrorKind::NonExhaustiveMatch,
            EvalError::NonExhaustiveSwitch { .. } => ErrorKind::NonExhaustiveSwitch,
            EvalError::User { .. } => ErrorKind::User,
            EvalError::UnboundVariable { .. } => ErrorKind::UnboundVariable,
            EvalError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            EvalError::Integrity { .. } => ErrorKind::Integrity,
            EvalError::Host { .. } => ErrorKind::Host,
        }
    }

    pub fn loc(&self) -> Loc {
        match self {
            EvalError::Arithmetic { loc, .. }
            | EvalError::NonExhaustiveMatch { loc }
            | EvalError::NonExhaustiveSwitch { loc }
            | EvalError::User { loc }
            | EvalError::UnboundVariable { loc, .. }
            | EvalError::TypeMismatch { loc, .. }
            | EvalError::Integrity { loc }
            | EvalError::Host { loc, .. } => *loc,
        }
    }

    pub(crate) fn mismatch(msg: impl Into<String>, loc: Loc) -> Self {
        EvalError::TypeMismatch {
            msg: msg.into(),
            loc,
        }
    }

    pub(crate) fn arithmetic(msg: &'static str, loc: Loc) -> Self {
        EvalError::Arithmetic { msg, loc }
    }
}
