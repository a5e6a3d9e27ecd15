//! Per-thread unwind bookkeeping: recovery points and the backtrace list.
//!
//! Every logical thread carries its own unwind state with a lifecycle tied
//! to the thread. The recovery-point stack marks the places an exception
//! can transfer control back to (each `invoke` boundary and each frame of
//! a function with try regions); the backtrace list records one node per
//! in-flight call so a raw call stack can be reconstructed without any
//! separate bookkeeping.
//!
//! Unwinding itself is rendered as error propagation through the dispatch
//! loop; the stacks here are the observable protocol around it. Both are
//! pushed on call entry and popped on return or on exception propagation.

use std::any::Any;
use std::cell::RefCell;

use core_types::{FunctionId, Value};

use crate::exception::{FaultHandler, InFlight};

/// One recovery point: where an unwind may deliver control.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecoveryPoint {
    /// Backtrace length captured when the point was pushed.
    pub backtrace_depth: usize,
    /// Frame dynamic-allocation watermark to restore on handler entry.
    pub alloca_mark: usize,
}

/// One call's entry in the backtrace list.
struct BacktraceNode {
    owner: FunctionId,
    return_pc: usize,
    /// Attached context object; released when the node is popped.
    context: Option<Box<dyn Any>>,
}

/// Thread-local exception and unwind context.
pub(crate) struct UnwindState {
    recovery: Vec<RecoveryPoint>,
    backtrace: Vec<BacktraceNode>,
    pub(crate) last_exception: Option<Value>,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) handler: Option<FaultHandler>,
    /// Identity and program counter of the most recent throw site.
    pub(crate) throw_site: Option<(FunctionId, usize)>,
}

impl UnwindState {
    const fn new() -> Self {
        UnwindState {
            recovery: Vec::new(),
            backtrace: Vec::new(),
            last_exception: None,
            in_flight: None,
            handler: None,
            throw_site: None,
        }
    }
}

thread_local! {
    static STATE: RefCell<UnwindState> = RefCell::new(UnwindState::new());
}

pub(crate) fn with_state<R>(f: impl FnOnce(&mut UnwindState) -> R) -> R {
    STATE.with(|s| f(&mut s.borrow_mut()))
}

/// Whether the thread has no recovery point at all; a throw in this state
/// is fatal.
pub(crate) fn no_recovery_point() -> bool {
    with_state(|s| s.recovery.is_empty())
}

pub(crate) fn push_recovery(alloca_mark: usize) {
    with_state(|s| {
        let depth = s.backtrace.len();
        s.recovery.push(RecoveryPoint {
            backtrace_depth: depth,
            alloca_mark,
        });
    });
}

pub(crate) fn pop_recovery() {
    with_state(|s| {
        s.recovery.pop();
    });
}

/// Update the innermost recovery point's frame watermark after a dynamic
/// allocation, so a later unwind does not restore a stale mark.
pub(crate) fn recapture_alloca(mark: usize) {
    with_state(|s| {
        if let Some(point) = s.recovery.last_mut() {
            point.alloca_mark = mark;
        }
    });
}

/// Commit to the innermost recovery point on handler entry: the backtrace
/// is truncated to the depth captured at the point, and its frame
/// watermark is returned for the frame to restore.
pub(crate) fn handler_entry() -> usize {
    with_state(|s| {
        let point = *s.recovery.last().expect("handler entry with no recovery point");
        s.backtrace.truncate(point.backtrace_depth);
        point.alloca_mark
    })
}

pub(crate) fn push_frame(owner: FunctionId, return_pc: usize) {
    with_state(|s| {
        s.backtrace.push(BacktraceNode {
            owner,
            return_pc,
            context: None,
        });
    });
}

pub(crate) fn pop_frame() {
    with_state(|s| {
        // Dropping the node releases any attached context object.
        s.backtrace.pop();
    });
}

/// Attach a context object to the innermost backtrace node. The object is
/// released when that node is popped.
pub fn attach_context(context: Box<dyn Any>) {
    with_state(|s| {
        if let Some(node) = s.backtrace.last_mut() {
            node.context = Some(context);
        }
    });
}

/// Capture the current call stack, innermost call first.
///
/// Each entry is the owning logical function and the return program
/// counter recorded for that call. Consumed by debugging and
/// exception-reporting collaborators.
pub fn snapshot() -> Vec<(FunctionId, usize)> {
    with_state(|s| {
        s.backtrace
            .iter()
            .rev()
            .map(|node| (node.owner, node.return_pc))
            .collect()
    })
}

/// Diagnostic text for the fatal unhandled-throw path.
pub(crate) fn fatal_diagnostic(s: &UnwindState) -> String {
    let what = match (&s.in_flight, &s.last_exception) {
        (Some(InFlight::Fault(kind)), _) => format!("fault: {kind}"),
        (_, Some(value)) => format!("exception {value:?}"),
        _ => "exception".to_string(),
    };
    match s.throw_site {
        Some((owner, pc)) => format!("unhandled {what} thrown from {owner} at pc {pc}"),
        None => format!("unhandled {what} with no recovery point"),
    }
}
