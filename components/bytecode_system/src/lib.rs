//! Instruction format for the execution core's virtual machine.
//!
//! This crate defines the flat word-encoded instruction streams that the
//! interpreter executes and that the code cache stores:
//!
//! - A register-based, three-address instruction set over three scratch
//!   registers
//! - Word-level encoding (one opcode tag word, then immediate operand
//!   words) with a bounds-checked decoder that rejects malformed input
//! - A stream writer with deferred labels and fixups for front ends
//! - The interpreted-function header serialized ahead of each instruction
//!   stream inside its code region
//!
//! # Example
//!
//! ```
//! use bytecode_system::{Instr, Reg, StreamWriter};
//!
//! let mut w = StreamWriter::new();
//! w.push(Instr::ConstInt { dst: Reg(0), value: 42 });
//! w.push(Instr::Return { src: Reg(0) });
//! let words = w.finish().unwrap();
//! assert_eq!(words.len(), 5);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod function;
pub mod instruction;
pub mod opcode;
pub mod stream;

// Re-export main types at crate root
pub use function::{FunctionSource, InterpHeader, TryRegion};
pub use instruction::Instr;
pub use opcode::{Opcode, Reg};
pub use stream::{disassemble, Label, StreamError, StreamReader, StreamWriter};
