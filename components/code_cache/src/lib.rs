//! Code Cache - executable memory manager and PC interval index
//!
//! This component provides:
//! - Page-granular allocation of read/write/execute memory
//! - Dual-ended bump allocation within a page (code grows up, auxiliary
//!   data grows down)
//! - Begin/end function transactions with a rollback-and-restart protocol
//! - An interval-indexed red-black tree mapping any program counter to the
//!   function record owning it
//!
//! The cache is strictly append-only: finalized function records and their
//! backing bytes are never mutated, relocated, or individually reclaimed.
//! Callers serialize all write operations; reads of finalized regions need
//! no synchronization.

pub mod cache;
pub mod page;
pub mod tree;

// Re-export main types
pub use cache::{CacheConfig, CacheError, CacheStats, CodeCache};
pub use page::Page;
pub use tree::{FunctionRecord, IntervalTree};
