//! Normalized builtin runtime fault codes.
//!
//! Every fault the interpreter can raise on its own - arithmetic traps,
//! bad guard checks, resource exhaustion during execution - funnels through
//! one of these codes. A fault is translated to an exception object by the
//! per-thread fault handler, after which it is indistinguishable from a
//! user-thrown exception.

use thiserror::Error;

/// A builtin runtime fault raised during interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FaultKind {
    /// Integer arithmetic overflowed in a checked operation.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// A bounds-check guard failed.
    #[error("array index out of bounds")]
    OutOfBounds,
    /// A null-check guard failed or a null callable was invoked.
    #[error("null pointer dereferenced")]
    NullReference,
    /// A branch targeted a label outside the instruction stream.
    #[error("undefined label")]
    UndefinedLabel,
    /// Memory could not be obtained while executing.
    #[error("out of memory")]
    OutOfMemory,
    /// A function could not be prepared for execution on demand.
    #[error("compilation of called function failed")]
    CompileFailed,
    /// A nested function was called from a context without a parent frame.
    #[error("nested function called from non-nested context")]
    CalledNested,
    /// Non-tail call recursion exceeded the configured depth bound.
    #[error("call stack exhausted")]
    StackOverflow,
    /// The instruction stream was malformed (truncated operands, unknown
    /// opcode tag, bad register index, mismatched operand types).
    #[error("invalid instruction")]
    InvalidInstruction,
}

impl FaultKind {
    /// Stable numeric code for this fault, usable by foreign collaborators.
    ///
    /// Codes are negative so that zero and positive values remain free for
    /// caller-defined success results.
    pub fn code(self) -> i32 {
        match self {
            FaultKind::ArithmeticOverflow => -1,
            FaultKind::DivisionByZero => -2,
            FaultKind::OutOfBounds => -3,
            FaultKind::NullReference => -4,
            FaultKind::UndefinedLabel => -5,
            FaultKind::OutOfMemory => -6,
            FaultKind::CompileFailed => -7,
            FaultKind::CalledNested => -8,
            FaultKind::StackOverflow => -9,
            FaultKind::InvalidInstruction => -10,
        }
    }

    /// Reverse of [`FaultKind::code`].
    pub fn from_code(code: i32) -> Option<FaultKind> {
        Some(match code {
            -1 => FaultKind::ArithmeticOverflow,
            -2 => FaultKind::DivisionByZero,
            -3 => FaultKind::OutOfBounds,
            -4 => FaultKind::NullReference,
            -5 => FaultKind::UndefinedLabel,
            -6 => FaultKind::OutOfMemory,
            -7 => FaultKind::CompileFailed,
            -8 => FaultKind::CalledNested,
            -9 => FaultKind::StackOverflow,
            -10 => FaultKind::InvalidInstruction,
            _ => return None,
        })
    }
}
