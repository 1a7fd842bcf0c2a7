//! Reader/writer lock for the run-time object list.
//!
//! Readers take one atomic increment on the uncontended path. A writer
//! announces itself by setting a flag in the same word, then waits only for
//! the readers that were already inside; readers arriving later queue behind
//! the writer and are admitted together when it leaves.
//!
//! State word layout:
//!
//! ```text
//!  63                    33  32  31                     0
//! +------------------------+---+-------------------------+
//! |     release epoch      | W |     pending readers     |
//! +------------------------+---+-------------------------+
//! ```
//!
//! A reader that sees `W` remembers the epoch and waits until the writer
//! bumps it on unlock. Clearing `W` and bumping the epoch is a single atomic
//! add, so a reader never confuses a later writer with the one it queued
//! behind.

#![allow(unsafe_code)] // UnsafeCell access guarded by the lock protocol

use crossbeam_utils::{Backoff, CachePadded};
use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const READER_MASK: u64 = (1 << 32) - 1;
const WRITER_ACTIVE: u64 = 1 << 32;
const EPOCH_SHIFT: u32 = 33;
const EPOCH_ONE: u64 = 1 << EPOCH_SHIFT;

pub struct ReaderWriterLock<T> {
    /// Pending readers, writer flag and release epoch
    state: CachePadded<AtomicU64>,
    /// Readers the current writer still waits for (may dip below zero)
    departing: AtomicI64,
    /// Set by the last departing reader
    release_writer: AtomicBool,
    /// Serializes writers among themselves
    writer_mutex: Mutex<()>,
    data: UnsafeCell<T>,
}

// SAFETY: readers only get `&T`, the single writer gets `&mut T` while no
// reader is inside; this is the contract of `std::sync::RwLock`.
unsafe impl<T: Send> Send for ReaderWriterLock<T> {}
unsafe impl<T: Send + Sync> Sync for ReaderWriterLock<T> {}

impl<T> ReaderWriterLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            state: CachePadded::new(AtomicU64::new(0)),
            departing: AtomicI64::new(0),
            release_writer: AtomicBool::new(false),
            writer_mutex: Mutex::new(()),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire shared access. Blocks only while a writer is active.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let prev = self.state.fetch_add(1, Ordering::SeqCst);
        if prev & WRITER_ACTIVE != 0 {
            let epoch = prev >> EPOCH_SHIFT;
            let backoff = Backoff::new();
            while self.state.load(Ordering::SeqCst) >> EPOCH_SHIFT == epoch {
                backoff.snooze();
            }
        }
        ReadGuard { lock: self }
    }

    /// Acquire exclusive access after all readers already inside have left.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let writer = self.writer_mutex.lock().unwrap_or_else(PoisonError::into_inner);

        let prev = self.state.fetch_add(WRITER_ACTIVE, Ordering::SeqCst);
        #[allow(clippy::cast_possible_wrap)] // at most u32::MAX readers
        let readers = (prev & READER_MASK) as i64;
        if self.departing.fetch_add(readers, Ordering::SeqCst) + readers != 0 {
            let backoff = Backoff::new();
            while !self.release_writer.swap(false, Ordering::SeqCst) {
                backoff.snooze();
            }
        }

        WriteGuard { lock: self, _writer: writer }
    }

    fn read_unlock(&self) {
        let prev = self.state.fetch_sub(1, Ordering::SeqCst);
        // A writer that arrived while we were inside counted us
        if prev & WRITER_ACTIVE != 0 && self.departing.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.release_writer.store(true, Ordering::SeqCst);
        }
    }

    fn write_unlock(&self) {
        // Clears WRITER_ACTIVE and bumps the epoch in one step
        self.state.fetch_add(EPOCH_ONE - WRITER_ACTIVE, Ordering::SeqCst);
    }
}

impl<T: Default> Default for ReaderWriterLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct ReadGuard<'a, T> {
    lock: &'a ReaderWriterLock<T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: no writer holds the lock while this guard exists
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.read_unlock();
    }
}

pub struct WriteGuard<'a, T> {
    lock: &'a ReaderWriterLock<T>,
    _writer: MutexGuard<'a, ()>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: exclusive access while this guard exists
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: exclusive access while this guard exists
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        // Runs before `_writer` is dropped, so the next writer sees a clean word
        self.lock.write_unlock();
    }
}
