//! Liveness bitset for run-time object tokens.
//!
//! The n-th `dlopen` notification that yields a tracked object gets token n
//! and sets bit n; the matching close clears it. Tokens are never reused, so
//! a stale handle can be checked without touching the (possibly retired)
//! object record.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU16, AtomicU8, Ordering};
use symscope_common::{Token, MAX_RT_OBJOPEN_CALLS_TRACKED, TOKEN_BITSET_BYTES};

pub struct TokenTracker {
    loaded: CachePadded<[AtomicU8; TOKEN_BITSET_BYTES]>,
    /// Last token handed out; 0 is the load-time sentinel
    issued: AtomicU16,
}

fn slot(token: Token) -> (usize, u8) {
    assert!(
        token.is_trackable(),
        "{token} not in range [0, {}]",
        MAX_RT_OBJOPEN_CALLS_TRACKED - 1
    );
    (usize::from(token.0) / 8, 1 << (token.0 % 8))
}

impl TokenTracker {
    pub fn new() -> Self {
        Self {
            loaded: CachePadded::new(std::array::from_fn(|_| AtomicU8::new(0))),
            issued: AtomicU16::new(0),
        }
    }

    /// Hand out the next token.
    ///
    /// # Panics
    /// When the token space is exhausted; continuing would alias tokens.
    pub fn next_token(&self) -> Token {
        let token = Token(self.issued.fetch_add(1, Ordering::SeqCst) + 1);
        assert!(
            token.is_trackable(),
            "More than {} run-time objects opened; token space exhausted",
            MAX_RT_OBJOPEN_CALLS_TRACKED - 1
        );
        token
    }

    pub fn mark_loaded(&self, token: Token) {
        let (idx, mask) = slot(token);
        self.loaded[idx].fetch_or(mask, Ordering::SeqCst);
    }

    pub fn mark_unloaded(&self, token: Token) {
        let (idx, mask) = slot(token);
        self.loaded[idx].fetch_and(!mask, Ordering::SeqCst);
    }

    /// # Panics
    /// When `token` lies outside the token space (e.g. [`symscope_common::INVALID_TOKEN`]).
    pub fn is_loaded(&self, token: Token) -> bool {
        let (idx, mask) = slot(token);
        self.loaded[idx].load(Ordering::SeqCst) & mask != 0
    }

    /// Number of tokens handed out so far
    #[cfg(test)]
    pub fn issued(&self) -> u16 {
        self.issued.load(Ordering::SeqCst)
    }
}

impl Default for TokenTracker {
    fn default() -> Self {
        Self::new()
    }
}
