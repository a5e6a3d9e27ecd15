//! Integration test suite for the execution core.
//!
//! This crate provides cross-component tests that verify the code cache,
//! instruction format, and interpreter work together correctly across
//! component boundaries.

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use code_cache;
    pub use core_types;
    pub use interpreter;
}
