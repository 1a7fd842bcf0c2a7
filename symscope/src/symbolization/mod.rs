//! # Symbol Tables and Nearest-Line Lookup
//!
//! This module turns an offset inside one object file into a human-readable
//! `(file, function, line)` triple. It knows nothing about where the object
//! is mapped: callers subtract the object's load bias first.
//!
//! ## Key Concepts
//!
//! ### Load Bias
//!
//! Position-independent objects are mapped at a random base address. The
//! dynamic linker reports that base (the load bias) per object, and
//!
//! ```text
//! Link-time Address = Runtime Address - Load Bias
//! ```
//!
//! Section addresses, symbol values and DWARF line rows are all expressed in
//! link-time addresses, so every lookup in this module takes that form.
//!
//! ### Allocatable Sections
//!
//! Only sections that occupy memory at run time (`SHF_ALLOC`) can contain an
//! instruction pointer. An offset outside all of them is a miss, even if it
//! lies inside the object's mapped address range.
//!
//! ### Inline Chains
//!
//! Optimized code inlines callees into callers. DWARF records every level,
//! innermost first. We report the outermost level: the non-inlined function
//! and the line in it whose call led to the address. Callers usually want to
//! blame user code, not a library helper that was inlined from a header.
//!
//! ## Lookup Flow
//!
//! ```text
//! 1. Find the allocatable section containing the offset
//! 2. Ask DWARF (addr2line) for the frames at that offset
//! 3. Walk the inline chain out to the outermost frame
//! 4. No DWARF function? Fall back to the covering function symbol
//! 5. For ranges: repeat 2-3 for the end offset if it is in the same section
//! ```
//!
//! **Libraries used**:
//! - `object`: ELF parsing, sections, symbol tables, section decompression
//! - `gimli`: Low-level DWARF parser
//! - `addr2line`: Frame and line lookup built on gimli
//! - `rustc-demangle`: Names taken from the symbol table
//! - `crc32fast`: Checksum of `.gnu_debuglink` targets
//!
//! ### Separate Debug Files
//!
//! A stripped object without `.debug_info` gets its DWARF from the file its
//! build-id or `.gnu_debuglink` points at (see [`debug_file`]).
//!
//! ## Limitations
//!
//! - Objects stripped of DWARF, with no debug file installed, only resolve
//!   to function granularity

pub mod debug_file;
pub mod symbol_table;

pub use symbol_table::{OffsetLookup, SymbolTable};
