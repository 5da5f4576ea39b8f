//! Lowering and evaluation errors.
//!
//! `LoweringError` is an internal-consistency failure: the input violated a
//! precondition the earlier compiler phases are supposed to guarantee, or the
//! rewriter reached a state it cannot handle. Lowering of that method is
//! abandoned; there is no partial result.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoweringError {
    #[error(
        "conditional branch to '{label}' leaves a try block containing 'yield return' without running its finally block"
    )]
    ConditionalGotoLeavesFinallyFrame { label: String },

    #[error("finally frame {frame} has neither a state dispatch nor a handler")]
    EmptyFinallyFrame { frame: u32 },

    #[error("try statement #{ordinal} was not visited by the yields-in-try analysis")]
    UnknownTryStatement { ordinal: u32 },

    #[error("cannot return a value from an iterator; use 'yield return' or 'yield break'")]
    ReturnWithValue,

    #[error("cannot yield a value in the body of a {clause} clause")]
    YieldInHandler { clause: &'static str },

    #[error("cannot yield a value in the body of a try block with a catch clause")]
    YieldInTryWithCatch,

    #[error("control cannot leave the body of a finally clause")]
    ExitFromFinally,

    #[error("label #{label} is used but was never declared")]
    UnknownLabel { label: u32 },

    #[error("statement nesting exceeds the limit of {limit}")]
    NestingTooDeep { limit: u32 },

    #[error("{kind} #{id} is used but the method names only {declared} {kind}s")]
    NameTableTooShort {
        kind: &'static str,
        id: u32,
        declared: usize,
    },
}

/// Failure while executing a lowered state machine with the reference
/// evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("unhandled exception: {0}")]
    Unhandled(String),

    #[error("no statement declares label '{0}'")]
    UnknownLabel(String),

    #[error("evaluation exceeded {0} steps")]
    StepLimitExceeded(u64),

    #[error("call depth exceeded {0}")]
    CallDepthExceeded(u32),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("method #{0} does not exist or has no body")]
    UnknownMethod(u32),

    #[error("instance #{0} does not exist")]
    UnknownInstance(usize),

    #[error("'this' used in a static context")]
    NoReceiver,

    #[error("parameter {0} is out of range")]
    UnknownParameter(u32),

    #[error("expression is not assignable")]
    NotAssignable,

    #[error("'yield' statement reached at run time; the body was not lowered")]
    UnloweredYield,
}
