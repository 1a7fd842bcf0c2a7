//! # Shared Vocabulary (Audit Shim ↔ Symbolication Core)
//!
//! Defines the handful of values that the dynamic-linker audit shim and the
//! symbolication core must agree on bit-for-bit: the object token, its
//! reserved values and the size of the token space. All types use
//! `#[repr(transparent)]` or plain integers so they can cross an `extern "C"`
//! boundary unchanged.
//!
//! ## Key Types
//!
//! - [`Token`] - Small integer naming a tracked shared object's liveness slot
//! - [`AuditCookie`] - Opaque per-object value handed out by the dynamic linker

#![cfg_attr(not(test), no_std)]

// ============================================================================
// Token Constants
// ============================================================================

/// Upper bound (exclusive) of run-time tokens ever handed out.
///
/// Tokens are never reused, so this is the maximum number of `dlopen`
/// notifications a process may produce over its whole lifetime. Reaching it
/// is a fatal configuration error.
pub const MAX_RT_OBJOPEN_CALLS_TRACKED: u16 = 1 << 13;

/// Number of bytes in the liveness bitset covering the whole token space
pub const TOKEN_BITSET_BYTES: usize = (MAX_RT_OBJOPEN_CALLS_TRACKED as usize).div_ceil(8);

/// **Load-time sentinel**: shared by every object mapped before initialization
///
/// Handles carrying this token never need a liveness check because load-time
/// objects are immutable for the lifetime of the process.
pub const LT_OBJECT_TOKEN: Token = Token(0);

/// **Miss marker**: reported when an address does not belong to any object
pub const INVALID_TOKEN: Token = Token(u16::MAX);

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Opaque value the dynamic linker associates with one loaded object
///
/// Stable across the matching `la_objopen` / `la_objclose` pair.
pub type AuditCookie = usize;

/// Liveness token of a tracked shared object
///
/// **Value**:
/// - `0`: Load-time object ([`LT_OBJECT_TOKEN`])
/// - `1..MAX_RT_OBJOPEN_CALLS_TRACKED`: Run-time object, in `dlopen` order
/// - `u16::MAX`: No object ([`INVALID_TOKEN`])
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u16);

impl Token {
    /// Returns true for the load-time sentinel.
    #[must_use]
    pub const fn is_load_time(self) -> bool {
        self.0 == LT_OBJECT_TOKEN.0
    }

    /// Returns true if this token lies inside the trackable token space.
    #[must_use]
    pub const fn is_trackable(self) -> bool {
        self.0 < MAX_RT_OBJOPEN_CALLS_TRACKED
    }
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "token:{}", self.0)
    }
}
