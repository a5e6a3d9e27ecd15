//! The dispatch loop.
//!
//! One `run` executes one frame: fetch the instruction at the cursor,
//! perform it, repeat until a return or an unwind. Direct calls recurse
//! with a fresh frame (bounded by the configured depth); tail calls
//! re-point the current frame at the callee and continue in place, so
//! tail recursion never grows the native stack.
//!
//! Exception flow: when something throws at program counter `pc`, the
//! current function's try table is searched for a region covering `pc`.
//! On a hit, dispatch resumes at the handler with the exception object in
//! r0 and the frame's dynamic area restored to the recovery watermark.
//! On a miss, the frame's recovery point (if it pushed one) is popped and
//! the unwind propagates to the caller.

use bytecode_system::{Instr, Reg};
use core_types::{FaultKind, Value};

use crate::context::{Installed, Runtime};
use crate::exception::{self, Thrown};
use crate::frame::Frame;
use crate::unwind;
use crate::apply;

/// React to an in-flight unwind raised at word offset `at`: either the
/// handler entry to resume at, or `None` to keep propagating.
fn catch_in_frame(fun: &Installed, frame: &mut Frame, at: usize) -> Option<usize> {
    exception::record_throw_site(fun.header.owner, at);
    if !fun.header.has_try || !exception::in_flight_is_exception() {
        return None;
    }
    let handler = fun.header.handler_for(at)?;
    let mark = unwind::handler_entry();
    frame.truncate_alloca(mark);
    let delivered = exception::take_exception()?;
    frame.set_reg(Reg(0), delivered);
    Some(handler)
}

/// Execute `fun` to completion in a fresh frame.
pub(crate) fn run(
    rt: &Runtime,
    mut fun: Installed,
    args: Vec<Value>,
    depth: usize,
) -> Result<Value, Thrown> {
    if args.len() != fun.header.arg_slots as usize {
        return Err(exception::throw_fault(FaultKind::InvalidInstruction));
    }
    let mut frame = Frame::new(&fun.header, args);
    let mut guarded = fun.header.has_try;
    if guarded {
        unwind::push_recovery(frame.alloca_mark());
    }

    macro_rules! throw {
        ($at:expr, $thrown:expr) => {{
            let _thrown: Thrown = $thrown;
            match catch_in_frame(&fun, &mut frame, $at) {
                Some(handler) => {
                    frame.pc = handler;
                    continue;
                }
                None => {
                    if guarded {
                        unwind::pop_recovery();
                    }
                    return Err(Thrown(()));
                }
            }
        }};
    }

    // Faults detected locally (not through exception::throw_*) share the
    // same normalized entry point.
    macro_rules! fault {
        ($at:expr, $kind:expr) => {
            throw!($at, exception::throw_fault($kind))
        };
    }

    macro_rules! try_value {
        ($at:expr, $result:expr) => {
            match $result {
                Ok(value) => value,
                Err(kind) => fault!($at, kind),
            }
        };
    }

    loop {
        let at = frame.pc;
        let (instr, next) = {
            let code = rt.code_span(&fun);
            match Instr::decode(code, at) {
                Ok(decoded) => decoded,
                Err(_) => fault!(at, FaultKind::InvalidInstruction),
            }
        };
        frame.pc = next;

        match instr {
            Instr::Nop => {}

            Instr::ConstInt { dst, value } => frame.set_reg(dst, Value::Int(value)),
            Instr::ConstLong { dst, value } => frame.set_reg(dst, Value::Long(value)),
            Instr::ConstFloat32 { dst, value } => frame.set_reg(dst, Value::Float32(value)),
            Instr::ConstFloat64 { dst, value } => frame.set_reg(dst, Value::Float64(value)),
            Instr::ConstNull { dst } => frame.set_reg(dst, Value::Ptr(0)),
            Instr::ConstFunc { dst, func } => frame.set_reg(dst, Value::FuncRef(func)),

            Instr::LoadSlot { dst, slot } => {
                let value = try_value!(at, frame.load_slot(slot));
                frame.set_reg(dst, value);
            }
            Instr::StoreSlot { src, slot } => {
                let value = frame.reg(src);
                try_value!(at, frame.store_slot(slot, value));
            }
            Instr::Move { dst, src } => {
                let value = frame.reg(src);
                frame.set_reg(dst, value);
            }

            Instr::Add { dst, a, b } => {
                let value = try_value!(at, frame.reg(a).wrapping_add(&frame.reg(b)));
                frame.set_reg(dst, value);
            }
            Instr::Sub { dst, a, b } => {
                let value = try_value!(at, frame.reg(a).wrapping_sub(&frame.reg(b)));
                frame.set_reg(dst, value);
            }
            Instr::Mul { dst, a, b } => {
                let value = try_value!(at, frame.reg(a).wrapping_mul(&frame.reg(b)));
                frame.set_reg(dst, value);
            }
            Instr::Div { dst, a, b } => {
                let value = try_value!(at, frame.reg(a).div(&frame.reg(b)));
                frame.set_reg(dst, value);
            }
            Instr::Rem { dst, a, b } => {
                let value = try_value!(at, frame.reg(a).rem(&frame.reg(b)));
                frame.set_reg(dst, value);
            }
            Instr::Neg { dst, src } => {
                let value = try_value!(at, frame.reg(src).wrapping_neg());
                frame.set_reg(dst, value);
            }
            Instr::AddOvf { dst, a, b } => {
                let value = try_value!(at, frame.reg(a).checked_add(&frame.reg(b)));
                frame.set_reg(dst, value);
            }
            Instr::SubOvf { dst, a, b } => {
                let value = try_value!(at, frame.reg(a).checked_sub(&frame.reg(b)));
                frame.set_reg(dst, value);
            }
            Instr::MulOvf { dst, a, b } => {
                let value = try_value!(at, frame.reg(a).checked_mul(&frame.reg(b)));
                frame.set_reg(dst, value);
            }

            Instr::CmpEq { dst, a, b } => {
                let flag = try_value!(at, frame.reg(a).eq_value(&frame.reg(b)));
                frame.set_reg(dst, Value::Int(flag as i32));
            }
            Instr::CmpNe { dst, a, b } => {
                let flag = try_value!(at, frame.reg(a).eq_value(&frame.reg(b)));
                frame.set_reg(dst, Value::Int(!flag as i32));
            }
            Instr::CmpLt { dst, a, b } => {
                let flag = try_value!(at, frame.reg(a).lt_value(&frame.reg(b)));
                frame.set_reg(dst, Value::Int(flag as i32));
            }
            Instr::CmpLe { dst, a, b } => {
                let flag = try_value!(at, frame.reg(a).le_value(&frame.reg(b)));
                frame.set_reg(dst, Value::Int(flag as i32));
            }
            Instr::CmpGt { dst, a, b } => {
                let flag = try_value!(at, frame.reg(b).lt_value(&frame.reg(a)));
                frame.set_reg(dst, Value::Int(flag as i32));
            }
            Instr::CmpGe { dst, a, b } => {
                let flag = try_value!(at, frame.reg(b).le_value(&frame.reg(a)));
                frame.set_reg(dst, Value::Int(flag as i32));
            }

            Instr::CheckNull { ptr } => {
                if frame.reg(ptr).is_null() {
                    fault!(at, FaultKind::NullReference);
                }
            }
            Instr::CheckBounds { index, length } => {
                let idx = try_value!(at, as_index(&frame.reg(index)));
                let len = try_value!(at, as_index(&frame.reg(length)));
                if idx < 0 || idx >= len {
                    fault!(at, FaultKind::OutOfBounds);
                }
            }

            Instr::Branch { target } => {
                if target >= fun.code_words {
                    fault!(at, FaultKind::UndefinedLabel);
                }
                frame.pc = target;
            }
            Instr::BranchIfTrue { cond, target } => {
                if try_value!(at, frame.reg(cond).as_condition()) {
                    if target >= fun.code_words {
                        fault!(at, FaultKind::UndefinedLabel);
                    }
                    frame.pc = target;
                }
            }
            Instr::BranchIfFalse { cond, target } => {
                if !try_value!(at, frame.reg(cond).as_condition()) {
                    if target >= fun.code_words {
                        fault!(at, FaultKind::UndefinedLabel);
                    }
                    frame.pc = target;
                }
            }

            Instr::PushArg { src } => {
                let value = frame.reg(src);
                try_value!(at, frame.push_arg(value, rt.config().max_args));
            }

            Instr::Call { func } => {
                let call_args = frame.take_out_args();
                if depth + 1 >= rt.config().max_call_depth {
                    fault!(at, FaultKind::StackOverflow);
                }
                let callee = try_value!(at, rt.resolve(func));
                unwind::push_frame(func, at);
                let outcome = run(rt, callee, call_args, depth + 1);
                unwind::pop_frame();
                match outcome {
                    Ok(value) => frame.set_reg(Reg(0), value),
                    Err(thrown) => throw!(at, thrown),
                }
            }
            Instr::CallTail { func } => {
                let call_args = frame.take_out_args();
                let callee = try_value!(at, rt.resolve(func));
                if call_args.len() != callee.header.arg_slots as usize {
                    fault!(at, FaultKind::InvalidInstruction);
                }
                if guarded {
                    unwind::pop_recovery();
                }
                fun = callee;
                frame.reuse(&fun.header, call_args);
                guarded = fun.header.has_try;
                if guarded {
                    unwind::push_recovery(frame.alloca_mark());
                }
            }
            Instr::CallIndirect { target } => {
                let callee_id = match frame.reg(target) {
                    Value::FuncRef(id) => id,
                    Value::Ptr(0) => fault!(at, FaultKind::NullReference),
                    _ => fault!(at, FaultKind::InvalidInstruction),
                };
                let call_args = frame.take_out_args();
                if depth + 1 >= rt.config().max_call_depth {
                    fault!(at, FaultKind::StackOverflow);
                }
                let callee = try_value!(at, rt.resolve(callee_id));
                unwind::push_frame(callee_id, at);
                let outcome = run(rt, callee, call_args, depth + 1);
                unwind::pop_frame();
                match outcome {
                    Ok(value) => frame.set_reg(Reg(0), value),
                    Err(thrown) => throw!(at, thrown),
                }
            }
            Instr::CallExternal { native } => {
                let call_args = frame.take_out_args();
                let entry = match rt.native(native) {
                    Some(entry) => entry,
                    None => fault!(at, FaultKind::InvalidInstruction),
                };
                match apply::apply(&entry, fun.header.owner, at, &call_args) {
                    Ok(value) => frame.set_reg(Reg(0), value),
                    Err(thrown) => throw!(at, thrown),
                }
            }

            Instr::Return { src } => {
                let value = frame.reg(src);
                if guarded {
                    unwind::pop_recovery();
                }
                return Ok(value);
            }
            Instr::ReturnVoid => {
                if guarded {
                    unwind::pop_recovery();
                }
                return Ok(Value::Void);
            }

            Instr::Throw { src } => {
                let value = frame.reg(src);
                throw!(at, exception::throw_value(value));
            }
            Instr::Rethrow => match exception::last() {
                Some(value) => throw!(at, exception::throw_value(value)),
                None => fault!(at, FaultKind::InvalidInstruction),
            },

            Instr::Alloca { dst, size } => {
                let n = match frame.reg(size) {
                    Value::Int(v) if v >= 0 => v as usize,
                    Value::Long(v) if v >= 0 => v as usize,
                    Value::Int(_) | Value::Long(_) => fault!(at, FaultKind::OutOfBounds),
                    _ => fault!(at, FaultKind::InvalidInstruction),
                };
                let addr = try_value!(at, frame.alloca(n));
                frame.set_reg(dst, Value::Ptr(addr));
                // A stale watermark would unwind to a dead allocation
                // mark; re-capture immediately.
                if guarded {
                    unwind::recapture_alloca(frame.alloca_mark());
                }
            }
        }
    }
}

fn as_index(value: &Value) -> Result<i64, FaultKind> {
    match value {
        Value::Int(v) => Ok(*v as i64),
        Value::Long(v) => Ok(*v),
        _ => Err(FaultKind::InvalidInstruction),
    }
}
