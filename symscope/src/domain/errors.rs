//! Structured error types for symscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

/// Reasons an object never gets a usable symbol table.
///
/// None of these are fatal: the registries log them at debug level and keep
/// going without the object.
#[derive(Error, Debug)]
pub enum SymbolTableError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a recognized object file: {source}")]
    Format {
        path: String,
        #[source]
        source: object::Error,
    },

    #[error("{0} carries no symbol table")]
    NoSymbolTable(String),

    #[error("{0} reports an empty symbol table")]
    EmptySymbolTable(String),

    #[error("No usable symbols in {0}")]
    NoSymbols(String),
}

/// Failures of the `symscope` diagnostic binary.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid target '{0}': expected a hex address (0x...) or a symbol name")]
    InvalidTarget(String),

    #[error("Failed to dlopen {path}: {reason}")]
    DlopenFailed { path: String, reason: String },

    #[error("Symbol '{0}' not found in the process")]
    SymbolNotFound(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
