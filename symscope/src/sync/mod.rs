//! Synchronization primitives of the lookup path
//!
//! - `rwlock`: reader/writer lock over the run-time object list
//! - `token_tracker`: atomic liveness bitset for run-time object tokens
//! - `container_pool`: recycled candidate containers for overlapping ranges

pub mod container_pool;
pub mod rwlock;
pub mod token_tracker;

pub use container_pool::{ContainerPool, PooledContainer};
pub use rwlock::{ReadGuard, ReaderWriterLock, WriteGuard};
pub use token_tracker::TokenTracker;
