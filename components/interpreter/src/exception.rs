//! The normalized throw path and the per-thread exception slots.
//!
//! User-level throws and builtin runtime faults converge here. A fault is
//! translated to an exception object by the installed per-thread handler,
//! after which it is indistinguishable from a user-thrown exception; with
//! no handler installed the fault bypasses try regions and surfaces as a
//! result code from the invocation boundary instead.
//!
//! A throw with no recovery point anywhere on the thread is fatal: a
//! diagnostic is emitted and the process terminates. The hosting front end
//! either always enters through [`Runtime::invoke`](crate::Runtime::invoke)
//! (which establishes a recovery point) or accepts termination as the
//! failure mode.

use core_types::{FaultKind, Value};

use crate::unwind;

/// Translates a builtin fault code to an exception object.
pub type FaultHandler = fn(FaultKind) -> Value;

/// Exit status of the fatal unhandled-throw path.
const FATAL_EXIT_CODE: i32 = 70;

/// Token proving an exception or fault is in flight on this thread.
///
/// Dispatch propagates it outward until a try region handles the
/// exception or the invocation boundary converts it to an error.
#[derive(Debug)]
#[must_use = "a throw must be propagated to a recovery point"]
pub struct Thrown(pub(crate) ());

/// What is currently unwinding: a real exception object, or a fault that
/// no handler translated.
#[derive(Debug, Clone)]
pub(crate) enum InFlight {
    /// A thrown (or fault-translated) exception object.
    Exception(Value),
    /// An untranslated fault; bypasses try regions.
    Fault(FaultKind),
}

/// The thread's last exception, if any.
pub fn last() -> Option<Value> {
    unwind::with_state(|s| s.last_exception.clone())
}

/// Overwrite the thread's last exception.
pub fn set_last(value: Value) {
    unwind::with_state(|s| s.last_exception = Some(value));
}

/// Clear the thread's last exception.
pub fn clear_last() {
    unwind::with_state(|s| s.last_exception = None);
}

/// Install the per-thread fault handler, returning the previous one.
///
/// The handler turns a builtin fault code into the exception object
/// delivered to try regions. Passing a replacement restores composability
/// for hosts that stack their own handlers.
pub fn install_handler(handler: FaultHandler) -> Option<FaultHandler> {
    unwind::with_state(|s| s.handler.replace(handler))
}

/// Remove the installed fault handler, returning it.
pub fn remove_handler() -> Option<FaultHandler> {
    unwind::with_state(|s| s.handler.take())
}

fn fatal() -> ! {
    let diagnostic = unwind::with_state(|s| unwind::fatal_diagnostic(s));
    log::error!("{diagnostic}");
    eprintln!("{diagnostic}");
    std::process::exit(FATAL_EXIT_CODE);
}

/// Throw `value` as an exception.
///
/// The value becomes the thread's last exception and begins unwinding.
/// Fatal if the thread has no recovery point.
pub fn throw_value(value: Value) -> Thrown {
    unwind::with_state(|s| {
        s.last_exception = Some(value.clone());
        s.in_flight = Some(InFlight::Exception(value));
    });
    if unwind::no_recovery_point() {
        fatal();
    }
    Thrown(())
}

/// Raise a builtin runtime fault.
///
/// With a handler installed the fault is translated and thrown like any
/// exception; otherwise it unwinds untranslated, skipping try regions.
/// Fatal if the thread has no recovery point.
pub fn throw_fault(kind: FaultKind) -> Thrown {
    let handler = unwind::with_state(|s| s.handler);
    if let Some(handler) = handler {
        return throw_value(handler(kind));
    }
    unwind::with_state(|s| s.in_flight = Some(InFlight::Fault(kind)));
    if unwind::no_recovery_point() {
        fatal();
    }
    Thrown(())
}

/// Record where the current unwind started.
pub(crate) fn record_throw_site(owner: core_types::FunctionId, pc: usize) {
    unwind::with_state(|s| s.throw_site = Some((owner, pc)));
}

/// Whether the in-flight unwind carries an exception object that try
/// regions may handle.
pub(crate) fn in_flight_is_exception() -> bool {
    unwind::with_state(|s| matches!(s.in_flight, Some(InFlight::Exception(_))))
}

/// Take the in-flight exception object for delivery into a handler.
pub(crate) fn take_exception() -> Option<Value> {
    unwind::with_state(|s| match s.in_flight.take() {
        Some(InFlight::Exception(value)) => Some(value),
        other => {
            s.in_flight = other;
            None
        }
    })
}

/// Take whatever is unwinding, at the invocation boundary.
pub(crate) fn take_in_flight() -> Option<InFlight> {
    unwind::with_state(|s| s.in_flight.take())
}
