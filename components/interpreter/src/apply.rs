//! Argument-marshalling adapter for calls into native code.
//!
//! `CallExternal` leaves the interpreter's frame model: operands are
//! marshalled into a fixed-capacity argument block, a backtrace node is
//! pushed around the foreign invocation, and a fault returned by the
//! callee is normalized onto the same exception path a `Throw` takes.

use arrayvec::ArrayVec;

use core_types::{FaultKind, FunctionId, Signature, Value, ValueType};

use crate::exception::{self, Thrown};
use crate::unwind;

/// A registered native (external) callable.
///
/// Faults are signaled by return value; a native that needs to throw a
/// language-level exception returns the fault its installed handler maps
/// to that exception.
pub type NativeFn = fn(&[Value]) -> Result<Value, FaultKind>;

/// Capacity of the marshalled argument block.
pub const MAX_CALL_ARGS: usize = 16;

/// A native callable together with the signature it is invoked under.
#[derive(Clone)]
pub struct NativeEntry {
    pub(crate) func: NativeFn,
    pub(crate) signature: Signature,
}

impl NativeEntry {
    /// Pair a callable with its signature.
    pub fn new(func: NativeFn, signature: Signature) -> Self {
        NativeEntry { func, signature }
    }
}

impl std::fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeEntry")
            .field("signature", &self.signature)
            .finish()
    }
}

fn return_type_matches(value: &Value, expected: ValueType) -> bool {
    match expected {
        ValueType::Void => matches!(value, Value::Void),
        other => value.value_type() == other,
    }
}

/// Invoke `entry` with `args`, marshalling through the fixed argument
/// block. `caller` and `return_pc` label the backtrace node pushed around
/// the foreign call.
pub(crate) fn apply(
    entry: &NativeEntry,
    caller: FunctionId,
    return_pc: usize,
    args: &[Value],
) -> Result<Value, Thrown> {
    if args.len() != entry.signature.arity() || args.len() > MAX_CALL_ARGS {
        return Err(exception::throw_fault(FaultKind::InvalidInstruction));
    }
    let mut block: ArrayVec<Value, MAX_CALL_ARGS> = ArrayVec::new();
    for (value, expected) in args.iter().zip(&entry.signature.params) {
        if value.value_type() != *expected {
            return Err(exception::throw_fault(FaultKind::InvalidInstruction));
        }
        block.push(value.clone());
    }

    unwind::push_frame(caller, return_pc);
    let outcome = (entry.func)(&block);
    unwind::pop_frame();

    match outcome {
        Ok(value) => {
            if return_type_matches(&value, entry.signature.return_type) {
                Ok(value)
            } else {
                Err(exception::throw_fault(FaultKind::InvalidInstruction))
            }
        }
        Err(kind) => Err(exception::throw_fault(kind)),
    }
}
