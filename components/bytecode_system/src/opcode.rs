//! Opcode tags for the word-encoded instruction format.
//!
//! An instruction is one opcode tag word followed by that opcode's
//! immediate operand words. Register operands name one of the three
//! scratch registers; slot operands are signed frame offsets (parameters
//! are encoded as negative offsets and sign-flipped at interpretation
//! time); branch operands are absolute word offsets into the stream.

/// One of the three scratch registers holding the operands of the
/// instruction currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(pub u8);

/// Number of scratch registers.
pub const NUM_REGS: usize = 3;

/// Opcode tags.
///
/// Operand words are listed per tag; see [`Instr`](crate::Instr) for the
/// decoded form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// No operation.
    Nop = 0,

    /// Load a 32-bit integer constant. Operands: `dst`, `value:i32`.
    ConstInt,
    /// Load a 64-bit integer constant. Operands: `dst`, `value:i64`.
    ConstLong,
    /// Load a 32-bit float constant. Operands: `dst`, `bits:f32`.
    ConstFloat32,
    /// Load a 64-bit float constant. Operands: `dst`, `bits:f64`.
    ConstFloat64,
    /// Load the null pointer. Operands: `dst`.
    ConstNull,
    /// Load a function reference. Operands: `dst`, `func`.
    ConstFunc,

    /// Load a frame or argument slot. Operands: `dst`, `slot:i32`.
    LoadSlot,
    /// Store to a frame or argument slot. Operands: `src`, `slot:i32`.
    StoreSlot,
    /// Copy between scratch registers. Operands: `dst`, `src`.
    Move,

    /// Wrapping addition. Operands: `dst`, `a`, `b`.
    Add,
    /// Wrapping subtraction. Operands: `dst`, `a`, `b`.
    Sub,
    /// Wrapping multiplication. Operands: `dst`, `a`, `b`.
    Mul,
    /// Division; faults on zero divisor. Operands: `dst`, `a`, `b`.
    Div,
    /// Remainder; faults on zero divisor. Operands: `dst`, `a`, `b`.
    Rem,
    /// Negation. Operands: `dst`, `src`.
    Neg,
    /// Overflow-checked addition. Operands: `dst`, `a`, `b`.
    AddOvf,
    /// Overflow-checked subtraction. Operands: `dst`, `a`, `b`.
    SubOvf,
    /// Overflow-checked multiplication. Operands: `dst`, `a`, `b`.
    MulOvf,

    /// Equality comparison producing Int 0/1. Operands: `dst`, `a`, `b`.
    CmpEq,
    /// Inequality comparison. Operands: `dst`, `a`, `b`.
    CmpNe,
    /// Less-than comparison. Operands: `dst`, `a`, `b`.
    CmpLt,
    /// Less-or-equal comparison. Operands: `dst`, `a`, `b`.
    CmpLe,
    /// Greater-than comparison. Operands: `dst`, `a`, `b`.
    CmpGt,
    /// Greater-or-equal comparison. Operands: `dst`, `a`, `b`.
    CmpGe,

    /// Fault with NullReference if the register holds a null pointer.
    /// Operands: `ptr`.
    CheckNull,
    /// Fault with OutOfBounds unless `0 <= index < length`.
    /// Operands: `index`, `length`.
    CheckBounds,

    /// Unconditional branch. Operands: `target`.
    Branch,
    /// Branch if the register is a true condition. Operands: `cond`,
    /// `target`.
    BranchIfTrue,
    /// Branch if the register is a false condition. Operands: `cond`,
    /// `target`.
    BranchIfFalse,

    /// Append a register to the outgoing-argument block. Operands: `src`.
    PushArg,
    /// Direct call; result (if any) is delivered in r0. Operands: `func`.
    Call,
    /// Tail call: reuse this frame, do not grow the native stack.
    /// Operands: `func`.
    CallTail,
    /// Call through a function reference held in a register.
    /// Operands: `target`.
    CallIndirect,
    /// Call a registered native function through the apply adapter.
    /// Operands: `native`.
    CallExternal,

    /// Return a register to the caller. Operands: `src`.
    Return,
    /// Return no value.
    ReturnVoid,

    /// Throw the exception object in a register. Operands: `src`.
    Throw,
    /// Rethrow the thread's last exception.
    Rethrow,

    /// Reserve dynamic frame memory; byte size from `size`, resulting
    /// address in `dst`. Operands: `dst`, `size`.
    Alloca,
}

impl Opcode {
    /// Decode an opcode tag from its word representation.
    pub fn from_word(word: u64) -> Option<Opcode> {
        use Opcode::*;
        Some(match word {
            0 => Nop,
            1 => ConstInt,
            2 => ConstLong,
            3 => ConstFloat32,
            4 => ConstFloat64,
            5 => ConstNull,
            6 => ConstFunc,
            7 => LoadSlot,
            8 => StoreSlot,
            9 => Move,
            10 => Add,
            11 => Sub,
            12 => Mul,
            13 => Div,
            14 => Rem,
            15 => Neg,
            16 => AddOvf,
            17 => SubOvf,
            18 => MulOvf,
            19 => CmpEq,
            20 => CmpNe,
            21 => CmpLt,
            22 => CmpLe,
            23 => CmpGt,
            24 => CmpGe,
            25 => CheckNull,
            26 => CheckBounds,
            27 => Branch,
            28 => BranchIfTrue,
            29 => BranchIfFalse,
            30 => PushArg,
            31 => Call,
            32 => CallTail,
            33 => CallIndirect,
            34 => CallExternal,
            35 => Return,
            36 => ReturnVoid,
            37 => Throw,
            38 => Rethrow,
            39 => Alloca,
            _ => return None,
        })
    }

    /// The word representation of this tag.
    pub fn to_word(self) -> u64 {
        self as u16 as u64
    }
}
