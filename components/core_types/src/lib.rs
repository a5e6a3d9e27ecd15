//! Core value and descriptor types for the execution core.
//!
//! This crate provides the foundational types shared by the code cache and
//! the bytecode interpreter:
//!
//! - [`Value`] - Tagged representation of interpreter operand values
//! - [`ValueType`] / [`Signature`] / [`Abi`] - Function type descriptors
//! - [`FunctionId`] / [`NativeId`] - Logical function identities
//! - [`FaultKind`] - Normalized builtin runtime fault codes
//! - [`VmError`] - Errors surfaced by the public invocation API
//!
//! # Examples
//!
//! ```
//! use core_types::{Value, ValueType};
//!
//! let a = Value::Int(40);
//! let b = Value::Int(2);
//! assert_eq!(a.wrapping_add(&b).unwrap(), Value::Int(42));
//! assert_eq!(a.value_type(), ValueType::Int);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod fault;
mod ident;
mod signature;
mod value;

pub use error::VmError;
pub use fault::FaultKind;
pub use ident::{FunctionId, NativeId};
pub use signature::{Abi, Signature, ValueType};
pub use value::Value;
