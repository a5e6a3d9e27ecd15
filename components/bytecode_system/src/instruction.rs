//! Decoded instruction form and its word-level encoding.
//!
//! [`Instr`] is the tagged, typed view of one instruction. Front ends and
//! tests build `Instr` values; the writer flattens them to words and the
//! interpreter decodes words back one instruction at a time. Decoding is
//! total: truncated operand lists, unknown tags, and out-of-range register
//! indices are reported as errors, never reinterpreted.

use core_types::{FunctionId, NativeId};

use crate::opcode::{Opcode, Reg, NUM_REGS};
use crate::stream::StreamError;

fn fetch(words: &[u64], cursor: &mut usize) -> Result<u64, StreamError> {
    let w = *words
        .get(*cursor)
        .ok_or(StreamError::Truncated { at: *cursor })?;
    *cursor += 1;
    Ok(w)
}

fn fetch_reg(words: &[u64], cursor: &mut usize) -> Result<Reg, StreamError> {
    let at = *cursor;
    let w = fetch(words, cursor)?;
    if (w as usize) < NUM_REGS {
        Ok(Reg(w as u8))
    } else {
        Err(StreamError::BadRegister { at, index: w })
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    /// No operation.
    Nop,
    /// `dst = value`
    ConstInt {
        /// Destination register.
        dst: Reg,
        /// Immediate value.
        value: i32,
    },
    /// `dst = value`
    ConstLong {
        /// Destination register.
        dst: Reg,
        /// Immediate value.
        value: i64,
    },
    /// `dst = value`
    ConstFloat32 {
        /// Destination register.
        dst: Reg,
        /// Immediate value.
        value: f32,
    },
    /// `dst = value`
    ConstFloat64 {
        /// Destination register.
        dst: Reg,
        /// Immediate value.
        value: f64,
    },
    /// `dst = null`
    ConstNull {
        /// Destination register.
        dst: Reg,
    },
    /// `dst = &func`
    ConstFunc {
        /// Destination register.
        dst: Reg,
        /// Referenced function.
        func: FunctionId,
    },
    /// Load a slot: non-negative offsets address the local frame,
    /// negative offsets address the incoming-argument block.
    LoadSlot {
        /// Destination register.
        dst: Reg,
        /// Signed slot offset.
        slot: i32,
    },
    /// Store a register to a slot, with the same offset convention.
    StoreSlot {
        /// Source register.
        src: Reg,
        /// Signed slot offset.
        slot: i32,
    },
    /// `dst = src`
    Move {
        /// Destination register.
        dst: Reg,
        /// Source register.
        src: Reg,
    },
    /// `dst = a + b` (wrapping for integers)
    Add {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = a - b` (wrapping for integers)
    Sub {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = a * b` (wrapping for integers)
    Mul {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = a / b`; faults on a zero divisor
    Div {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = a % b`; faults on a zero divisor
    Rem {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = -src`
    Neg {
        /// Destination register.
        dst: Reg,
        /// Source register.
        src: Reg,
    },
    /// `dst = a + b`; faults on integer overflow
    AddOvf {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = a - b`; faults on integer overflow
    SubOvf {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = a * b`; faults on integer overflow
    MulOvf {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = (a == b)` as Int 0/1
    CmpEq {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = (a != b)` as Int 0/1
    CmpNe {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = (a < b)` as Int 0/1
    CmpLt {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = (a <= b)` as Int 0/1
    CmpLe {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = (a > b)` as Int 0/1
    CmpGt {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// `dst = (a >= b)` as Int 0/1
    CmpGe {
        /// Destination register.
        dst: Reg,
        /// Left operand register.
        a: Reg,
        /// Right operand register.
        b: Reg,
    },
    /// Fault with NullReference if `ptr` holds the null pointer.
    CheckNull {
        /// Guarded pointer register.
        ptr: Reg,
    },
    /// Fault with OutOfBounds unless `0 <= index < length`.
    CheckBounds {
        /// Index register.
        index: Reg,
        /// Length register.
        length: Reg,
    },
    /// Unconditional branch to an absolute word offset.
    Branch {
        /// Absolute word offset of the target instruction.
        target: usize,
    },
    /// Branch when `cond` is a true condition.
    BranchIfTrue {
        /// Condition register.
        cond: Reg,
        /// Absolute word offset of the target instruction.
        target: usize,
    },
    /// Branch when `cond` is a false condition.
    BranchIfFalse {
        /// Condition register.
        cond: Reg,
        /// Absolute word offset of the target instruction.
        target: usize,
    },
    /// Append a register to the outgoing-argument block.
    PushArg {
        /// Source register.
        src: Reg,
    },
    /// Direct call; the callee's return value (if any) arrives in r0.
    Call {
        /// Callee.
        func: FunctionId,
    },
    /// Tail call: the current frame is reused and the native stack does
    /// not grow.
    CallTail {
        /// Callee.
        func: FunctionId,
    },
    /// Call through a function reference held in `target`.
    CallIndirect {
        /// Register holding the callee reference.
        target: Reg,
    },
    /// Call a registered native function through the apply adapter.
    CallExternal {
        /// Registered native callable.
        native: NativeId,
    },
    /// Return `src` to the caller.
    Return {
        /// Source register.
        src: Reg,
    },
    /// Return no value.
    ReturnVoid,
    /// Throw the exception object in `src`.
    Throw {
        /// Register holding the exception object.
        src: Reg,
    },
    /// Rethrow the thread's last exception.
    Rethrow,
    /// Reserve `size` bytes of dynamic frame memory; the resulting
    /// address is written to `dst`.
    Alloca {
        /// Destination register for the area address.
        dst: Reg,
        /// Register holding the requested byte size.
        size: Reg,
    },
}

impl Instr {
    /// The opcode tag of this instruction.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instr::Nop => Opcode::Nop,
            Instr::ConstInt { .. } => Opcode::ConstInt,
            Instr::ConstLong { .. } => Opcode::ConstLong,
            Instr::ConstFloat32 { .. } => Opcode::ConstFloat32,
            Instr::ConstFloat64 { .. } => Opcode::ConstFloat64,
            Instr::ConstNull { .. } => Opcode::ConstNull,
            Instr::ConstFunc { .. } => Opcode::ConstFunc,
            Instr::LoadSlot { .. } => Opcode::LoadSlot,
            Instr::StoreSlot { .. } => Opcode::StoreSlot,
            Instr::Move { .. } => Opcode::Move,
            Instr::Add { .. } => Opcode::Add,
            Instr::Sub { .. } => Opcode::Sub,
            Instr::Mul { .. } => Opcode::Mul,
            Instr::Div { .. } => Opcode::Div,
            Instr::Rem { .. } => Opcode::Rem,
            Instr::Neg { .. } => Opcode::Neg,
            Instr::AddOvf { .. } => Opcode::AddOvf,
            Instr::SubOvf { .. } => Opcode::SubOvf,
            Instr::MulOvf { .. } => Opcode::MulOvf,
            Instr::CmpEq { .. } => Opcode::CmpEq,
            Instr::CmpNe { .. } => Opcode::CmpNe,
            Instr::CmpLt { .. } => Opcode::CmpLt,
            Instr::CmpLe { .. } => Opcode::CmpLe,
            Instr::CmpGt { .. } => Opcode::CmpGt,
            Instr::CmpGe { .. } => Opcode::CmpGe,
            Instr::CheckNull { .. } => Opcode::CheckNull,
            Instr::CheckBounds { .. } => Opcode::CheckBounds,
            Instr::Branch { .. } => Opcode::Branch,
            Instr::BranchIfTrue { .. } => Opcode::BranchIfTrue,
            Instr::BranchIfFalse { .. } => Opcode::BranchIfFalse,
            Instr::PushArg { .. } => Opcode::PushArg,
            Instr::Call { .. } => Opcode::Call,
            Instr::CallTail { .. } => Opcode::CallTail,
            Instr::CallIndirect { .. } => Opcode::CallIndirect,
            Instr::CallExternal { .. } => Opcode::CallExternal,
            Instr::Return { .. } => Opcode::Return,
            Instr::ReturnVoid => Opcode::ReturnVoid,
            Instr::Throw { .. } => Opcode::Throw,
            Instr::Rethrow => Opcode::Rethrow,
            Instr::Alloca { .. } => Opcode::Alloca,
        }
    }

    /// Append the word encoding of this instruction to `out`.
    pub fn encode(&self, out: &mut Vec<u64>) {
        out.push(self.opcode().to_word());
        match *self {
            Instr::Nop | Instr::ReturnVoid | Instr::Rethrow => {}
            Instr::ConstInt { dst, value } => {
                out.push(dst.0 as u64);
                out.push(value as i64 as u64);
            }
            Instr::ConstLong { dst, value } => {
                out.push(dst.0 as u64);
                out.push(value as u64);
            }
            Instr::ConstFloat32 { dst, value } => {
                out.push(dst.0 as u64);
                out.push(value.to_bits() as u64);
            }
            Instr::ConstFloat64 { dst, value } => {
                out.push(dst.0 as u64);
                out.push(value.to_bits());
            }
            Instr::ConstNull { dst } => out.push(dst.0 as u64),
            Instr::ConstFunc { dst, func } => {
                out.push(dst.0 as u64);
                out.push(func.0 as u64);
            }
            Instr::LoadSlot { dst, slot } => {
                out.push(dst.0 as u64);
                out.push(slot as i64 as u64);
            }
            Instr::StoreSlot { src, slot } => {
                out.push(src.0 as u64);
                out.push(slot as i64 as u64);
            }
            Instr::Move { dst, src } => {
                out.push(dst.0 as u64);
                out.push(src.0 as u64);
            }
            Instr::Add { dst, a, b }
            | Instr::Sub { dst, a, b }
            | Instr::Mul { dst, a, b }
            | Instr::Div { dst, a, b }
            | Instr::Rem { dst, a, b }
            | Instr::AddOvf { dst, a, b }
            | Instr::SubOvf { dst, a, b }
            | Instr::MulOvf { dst, a, b }
            | Instr::CmpEq { dst, a, b }
            | Instr::CmpNe { dst, a, b }
            | Instr::CmpLt { dst, a, b }
            | Instr::CmpLe { dst, a, b }
            | Instr::CmpGt { dst, a, b }
            | Instr::CmpGe { dst, a, b } => {
                out.push(dst.0 as u64);
                out.push(a.0 as u64);
                out.push(b.0 as u64);
            }
            Instr::Neg { dst, src } => {
                out.push(dst.0 as u64);
                out.push(src.0 as u64);
            }
            Instr::CheckNull { ptr } => out.push(ptr.0 as u64),
            Instr::CheckBounds { index, length } => {
                out.push(index.0 as u64);
                out.push(length.0 as u64);
            }
            Instr::Branch { target } => out.push(target as u64),
            Instr::BranchIfTrue { cond, target } => {
                out.push(cond.0 as u64);
                out.push(target as u64);
            }
            Instr::BranchIfFalse { cond, target } => {
                out.push(cond.0 as u64);
                out.push(target as u64);
            }
            Instr::PushArg { src } => out.push(src.0 as u64),
            Instr::Call { func } | Instr::CallTail { func } => out.push(func.0 as u64),
            Instr::CallIndirect { target } => out.push(target.0 as u64),
            Instr::CallExternal { native } => out.push(native.0 as u64),
            Instr::Return { src } => out.push(src.0 as u64),
            Instr::Throw { src } => out.push(src.0 as u64),
            Instr::Alloca { dst, size } => {
                out.push(dst.0 as u64);
                out.push(size.0 as u64);
            }
        }
    }

    /// Decode the instruction starting at word offset `pc`.
    ///
    /// Returns the instruction and the offset of the next one. Unknown
    /// tags, truncated operand lists, and register indices outside the
    /// scratch file are [`StreamError`]s.
    pub fn decode(words: &[u64], pc: usize) -> Result<(Instr, usize), StreamError> {
        let tag = *words.get(pc).ok_or(StreamError::Truncated { at: pc })?;
        let op = Opcode::from_word(tag).ok_or(StreamError::UnknownOpcode { at: pc, tag })?;

        let mut cursor = pc + 1;
        macro_rules! word {
            () => {
                fetch(words, &mut cursor)?
            };
        }
        macro_rules! reg {
            () => {
                fetch_reg(words, &mut cursor)?
            };
        }

        let instr = match op {
            Opcode::Nop => Instr::Nop,
            Opcode::ConstInt => Instr::ConstInt {
                dst: reg!(),
                value: word!() as i64 as i32,
            },
            Opcode::ConstLong => Instr::ConstLong {
                dst: reg!(),
                value: word!() as i64,
            },
            Opcode::ConstFloat32 => Instr::ConstFloat32 {
                dst: reg!(),
                value: f32::from_bits(word!() as u32),
            },
            Opcode::ConstFloat64 => Instr::ConstFloat64 {
                dst: reg!(),
                value: f64::from_bits(word!()),
            },
            Opcode::ConstNull => Instr::ConstNull { dst: reg!() },
            Opcode::ConstFunc => Instr::ConstFunc {
                dst: reg!(),
                func: FunctionId(word!() as u32),
            },
            Opcode::LoadSlot => Instr::LoadSlot {
                dst: reg!(),
                slot: word!() as i64 as i32,
            },
            Opcode::StoreSlot => Instr::StoreSlot {
                src: reg!(),
                slot: word!() as i64 as i32,
            },
            Opcode::Move => Instr::Move {
                dst: reg!(),
                src: reg!(),
            },
            Opcode::Add => Instr::Add {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::Sub => Instr::Sub {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::Mul => Instr::Mul {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::Div => Instr::Div {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::Rem => Instr::Rem {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::Neg => Instr::Neg {
                dst: reg!(),
                src: reg!(),
            },
            Opcode::AddOvf => Instr::AddOvf {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::SubOvf => Instr::SubOvf {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::MulOvf => Instr::MulOvf {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::CmpEq => Instr::CmpEq {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::CmpNe => Instr::CmpNe {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::CmpLt => Instr::CmpLt {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::CmpLe => Instr::CmpLe {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::CmpGt => Instr::CmpGt {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::CmpGe => Instr::CmpGe {
                dst: reg!(),
                a: reg!(),
                b: reg!(),
            },
            Opcode::CheckNull => Instr::CheckNull { ptr: reg!() },
            Opcode::CheckBounds => Instr::CheckBounds {
                index: reg!(),
                length: reg!(),
            },
            Opcode::Branch => Instr::Branch {
                target: word!() as usize,
            },
            Opcode::BranchIfTrue => Instr::BranchIfTrue {
                cond: reg!(),
                target: word!() as usize,
            },
            Opcode::BranchIfFalse => Instr::BranchIfFalse {
                cond: reg!(),
                target: word!() as usize,
            },
            Opcode::PushArg => Instr::PushArg { src: reg!() },
            Opcode::Call => Instr::Call {
                func: FunctionId(word!() as u32),
            },
            Opcode::CallTail => Instr::CallTail {
                func: FunctionId(word!() as u32),
            },
            Opcode::CallIndirect => Instr::CallIndirect { target: reg!() },
            Opcode::CallExternal => Instr::CallExternal {
                native: NativeId(word!() as u32),
            },
            Opcode::Return => Instr::Return { src: reg!() },
            Opcode::ReturnVoid => Instr::ReturnVoid,
            Opcode::Throw => Instr::Throw { src: reg!() },
            Opcode::Rethrow => Instr::Rethrow,
            Opcode::Alloca => Instr::Alloca {
                dst: reg!(),
                size: reg!(),
            },
        };
        Ok((instr, cursor))
    }
}
