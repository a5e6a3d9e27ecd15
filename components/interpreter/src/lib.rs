//! Bytecode interpreter for the execution core.
//!
//! This crate executes the word-encoded instruction streams that
//! `bytecode_system` defines and `code_cache` stores:
//!
//! - [`Runtime`] - function/native registries over the code cache, with
//!   on-demand installation and the `invoke` entry point
//! - [`Frame`] - per-invocation argument block, slot block, and the three
//!   scratch registers
//! - A dispatch loop with direct, indirect, external, and frame-reusing
//!   tail calls
//! - [`exception`] / [`unwind`] - per-thread recovery points, backtrace
//!   list, last-exception slot, and the normalized fault path
//!
//! # Example
//!
//! ```
//! use bytecode_system::{FunctionSource, Instr, Reg, StreamWriter};
//! use core_types::{Signature, Value, ValueType};
//! use interpreter::Runtime;
//!
//! let mut w = StreamWriter::new();
//! w.push(Instr::LoadSlot { dst: Reg(0), slot: -1 });
//! w.push(Instr::LoadSlot { dst: Reg(1), slot: -2 });
//! w.push(Instr::Add { dst: Reg(0), a: Reg(0), b: Reg(1) });
//! w.push(Instr::Return { src: Reg(0) });
//!
//! let rt = Runtime::default();
//! let id = rt.register_function(FunctionSource::new(
//!     Signature::new(vec![ValueType::Int, ValueType::Int], ValueType::Int),
//!     0,
//!     0,
//!     w.finish().unwrap(),
//! ));
//! let sum = rt.invoke(id, &[Value::Int(40), Value::Int(2)]).unwrap();
//! assert_eq!(sum, Value::Int(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod apply;
pub mod context;
mod dispatch;
pub mod exception;
pub mod frame;
pub mod unwind;

// Re-export main types at crate root
pub use apply::{NativeEntry, NativeFn, MAX_CALL_ARGS};
pub use context::{InterpreterConfig, Runtime};
pub use exception::{FaultHandler, Thrown};
pub use frame::Frame;
