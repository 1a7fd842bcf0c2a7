//! Result types returned by the lookup operations
//!
//! Every lookup is a total function: misses are reported through the `found`
//! flags, never through `Result`. Fields that were not resolved hold their
//! "not set" value: `None` for names, `0` for line numbers.

use serde::Serialize;
use symscope_common::{Token, INVALID_TOKEN};

use crate::registry::SoHandle;

/// Source code location produced by a nearest-line lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub function: Option<String>,
    /// `0` when unknown
    pub line: u32,
}

impl SourceLocation {
    /// `function@file:line`, with `??` for missing parts
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{}@{}:{}",
            self.function.as_deref().unwrap_or("??"),
            self.file.as_deref().unwrap_or("??"),
            self.line
        )
    }
}

/// Line lookup against an object the caller already holds
#[derive(Debug, Clone, Default)]
pub struct LineLookup {
    pub object_name: String,
    pub found: bool,
    pub location: SourceLocation,
}

/// Range lookup against an object the caller already holds
#[derive(Debug, Clone, Default)]
pub struct RangeLookup {
    pub object_name: String,
    pub found_begin: bool,
    pub found_end: bool,
    /// Location of the begin offset
    pub location: SourceLocation,
    /// Line of the end offset, `0` unless `found_end`
    pub end_line: u32,
}

/// Combined object discovery and line lookup
#[derive(Debug, Clone, Default)]
pub struct AddrLookup {
    /// Owning object, `None` unless some tracked object resolved the address
    pub object: Option<SoHandle>,
    pub found: bool,
    pub location: SourceLocation,
}

impl AddrLookup {
    /// Token of the owning object, [`INVALID_TOKEN`] on a miss
    #[must_use]
    pub fn token(&self) -> Token {
        self.object.as_ref().map_or(INVALID_TOKEN, SoHandle::token)
    }

    #[must_use]
    pub fn object_name(&self) -> Option<&str> {
        self.object.as_ref().map(SoHandle::name)
    }

    #[must_use]
    pub fn base_addr(&self) -> Option<usize> {
        self.object.as_ref().map(SoHandle::base_addr)
    }

    /// Format the lookup for display, one line per address
    #[must_use]
    pub fn format(&self, addr: usize) -> String {
        match &self.object {
            Some(object) if self.found => format!(
                "0x{addr:016x} {}\n                      at {}:{} [{}]",
                self.location.function.as_deref().unwrap_or("<unknown>"),
                self.location.file.as_deref().unwrap_or("??"),
                self.location.line,
                object.name()
            ),
            _ => format!("0x{addr:016x} <not in any tracked object>"),
        }
    }
}

/// Combined object discovery and range lookup
#[derive(Debug, Clone, Default)]
pub struct AddrRangeLookup {
    pub object: Option<SoHandle>,
    pub found_begin: bool,
    pub found_end: bool,
    pub location: SourceLocation,
    pub end_line: u32,
}

impl AddrRangeLookup {
    /// Token of the owning object, [`INVALID_TOKEN`] on a miss
    #[must_use]
    pub fn token(&self) -> Token {
        self.object.as_ref().map_or(INVALID_TOKEN, SoHandle::token)
    }
}

/// Serializable view of one tracked object, for listings
#[derive(Debug, Clone, Serialize)]
pub struct ObjectSummary {
    pub name: String,
    pub base_addr: usize,
    pub begin_addr: usize,
    pub end_addr: usize,
    pub token: u16,
}

impl From<&SoHandle> for ObjectSummary {
    fn from(handle: &SoHandle) -> Self {
        Self {
            name: handle.name().to_string(),
            base_addr: handle.base_addr(),
            begin_addr: handle.begin_addr(),
            end_addr: handle.end_addr(),
            token: handle.token().0,
        }
    }
}
