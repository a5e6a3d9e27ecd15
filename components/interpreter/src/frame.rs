//! Per-invocation execution frame.
//!
//! A frame holds the incoming-argument block (owned by the caller,
//! read-only here), the local/working-area slot block sized from the
//! function's header, the three scratch registers for the instruction
//! currently executing, the outgoing-argument accumulation buffer, and a
//! dynamic allocation area. Frames are ephemeral: created on call entry,
//! destroyed on return. Tail calls reuse the slot block in place when the
//! callee's requirement fits the already-reserved capacity.

use bytecode_system::{InterpHeader, Reg};
use core_types::{FaultKind, Value};

/// Bytes reserved for a frame's dynamic allocation area on first use.
/// The area never reallocates, so addresses handed out stay stable for
/// the life of the frame; requests past the reservation fault.
const ALLOCA_RESERVE: usize = 4096;

/// One interpreter invocation's mutable state.
#[derive(Debug)]
pub struct Frame {
    /// Incoming-argument block; read-only to this invocation.
    args: Vec<Value>,
    /// Locals plus transient working area.
    slots: Vec<Value>,
    /// Scratch registers r0..r2.
    regs: [Value; 3],
    /// Outgoing arguments accumulated by PushArg for the next call.
    out_args: Vec<Value>,
    /// Dynamic allocation area; grows only, truncated on handler entry.
    alloca: Vec<u8>,
    /// Word cursor into the instruction stream.
    pub(crate) pc: usize,
}

impl Frame {
    /// Create a frame sized from `header`, taking ownership of the
    /// caller's argument block.
    pub(crate) fn new(header: &InterpHeader, args: Vec<Value>) -> Frame {
        Frame {
            args,
            slots: vec![Value::Void; header.frame_slots as usize],
            regs: [Value::Void, Value::Void, Value::Void],
            out_args: Vec::new(),
            alloca: Vec::new(),
            pc: 0,
        }
    }

    /// Re-point this frame at a tail callee. The slot block is reused in
    /// place when the callee fits the reserved capacity and reallocated
    /// otherwise; registers, the dynamic area, and the cursor reset.
    pub(crate) fn reuse(&mut self, header: &InterpHeader, args: Vec<Value>) {
        let want = header.frame_slots as usize;
        if want <= self.slots.capacity() {
            self.slots.clear();
            self.slots.resize(want, Value::Void);
        } else {
            self.slots = vec![Value::Void; want];
        }
        self.args = args;
        self.regs = [Value::Void, Value::Void, Value::Void];
        self.out_args.clear();
        self.alloca = Vec::new();
        self.pc = 0;
    }

    /// Read a scratch register.
    pub(crate) fn reg(&self, r: Reg) -> Value {
        self.regs[r.0 as usize].clone()
    }

    /// Write a scratch register.
    pub(crate) fn set_reg(&mut self, r: Reg, value: Value) {
        self.regs[r.0 as usize] = value;
    }

    /// Load a slot. Non-negative offsets address the local frame;
    /// negative offsets address the incoming-argument block, resolved by
    /// sign-flipping (`-1` is the first parameter).
    pub(crate) fn load_slot(&self, slot: i32) -> Result<Value, FaultKind> {
        if slot >= 0 {
            self.slots
                .get(slot as usize)
                .cloned()
                .ok_or(FaultKind::OutOfBounds)
        } else {
            let index = (-(slot as i64) - 1) as usize;
            self.args.get(index).cloned().ok_or(FaultKind::OutOfBounds)
        }
    }

    /// Store a register to a local slot. The argument block is read-only,
    /// so negative offsets fault.
    pub(crate) fn store_slot(&mut self, slot: i32, value: Value) -> Result<(), FaultKind> {
        if slot < 0 {
            return Err(FaultKind::InvalidInstruction);
        }
        match self.slots.get_mut(slot as usize) {
            Some(target) => {
                *target = value;
                Ok(())
            }
            None => Err(FaultKind::OutOfBounds),
        }
    }

    /// Append to the outgoing-argument block; `limit` is the configured
    /// marshalling bound.
    pub(crate) fn push_arg(&mut self, value: Value, limit: usize) -> Result<(), FaultKind> {
        if self.out_args.len() >= limit {
            return Err(FaultKind::InvalidInstruction);
        }
        self.out_args.push(value);
        Ok(())
    }

    /// Take the accumulated outgoing arguments for a call.
    pub(crate) fn take_out_args(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.out_args)
    }

    /// Reserve `n` bytes of dynamic frame memory and return its address.
    ///
    /// The area is zero-filled. Addresses remain valid for the life of
    /// the frame; exhausting the fixed reservation is an out-of-memory
    /// fault rather than a reallocation that would move live addresses.
    pub(crate) fn alloca(&mut self, n: usize) -> Result<u64, FaultKind> {
        if self.alloca.capacity() == 0 {
            self.alloca.reserve_exact(ALLOCA_RESERVE);
        }
        let old_len = self.alloca.len();
        if old_len + n > ALLOCA_RESERVE {
            return Err(FaultKind::OutOfMemory);
        }
        self.alloca.resize(old_len + n, 0);
        Ok(self.alloca.as_ptr() as u64 + old_len as u64)
    }

    /// Current dynamic-area watermark, captured by recovery points.
    pub(crate) fn alloca_mark(&self) -> usize {
        self.alloca.len()
    }

    /// Restore the dynamic area to a recovery point's watermark.
    pub(crate) fn truncate_alloca(&mut self, mark: usize) {
        self.alloca.truncate(mark);
    }
}
