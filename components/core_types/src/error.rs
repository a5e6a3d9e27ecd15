//! Errors surfaced by the public invocation API.

use thiserror::Error;

use crate::{FaultKind, FunctionId, Value};

/// Error returned by the runtime's invocation entry points.
///
/// Exceptions that unwind out of an invocation are delivered here rather
/// than terminating the process; only a throw with no recovery point at all
/// is fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// An exception propagated to the invocation boundary without being
    /// handled by any try region. The thrown object is carried verbatim and
    /// is also stored as the thread's last exception.
    #[error("uncaught exception: {0:?}")]
    UncaughtException(Value),
    /// The invoked function id is not registered.
    #[error("unknown function {0}")]
    UnknownFunction(FunctionId),
    /// A builtin fault escaped before any exception object existed.
    #[error("runtime fault: {0}")]
    Fault(#[from] FaultKind),
}
