//! Domain model for symscope
//!
//! This module contains the result types and errors that provide:
//! - Explicit `found` flags instead of errors for expected misses
//! - Documented "not set" values for unresolved fields
//! - Structured error handling for object loading and the binary

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{
    AddrLookup, AddrRangeLookup, LineLookup, ObjectSummary, RangeLookup, SourceLocation,
};

pub use errors::{SymbolTableError, ToolError};
