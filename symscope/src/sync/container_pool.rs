//! Free-list pool of small candidate containers.
//!
//! Address ranges of tracked objects may overlap, so a lookup collects every
//! object whose range contains the address and tries them in turn. The
//! number of candidates is bounded by the global overlap count plus one;
//! containers are sized from that bound on acquisition and recycled so a
//! lookup normally performs no heap allocation.

use crossbeam_utils::CachePadded;
use log::debug;
use std::ops::Deref;
use std::sync::{Mutex, PoisonError};

/// Fixed-capacity list of candidates
pub struct ObjectsContainer<T> {
    capacity: usize,
    objects: Vec<T>,
}

impl<T> ObjectsContainer<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self { capacity, objects: Vec::with_capacity(capacity) }
    }

    /// # Panics
    /// When more candidates are pushed than the container was sized for;
    /// the overlap accounting it was sized from would be broken.
    pub fn push(&mut self, object: T) {
        assert!(
            self.objects.len() < self.capacity,
            "More address-ranges found than expected ({}).",
            self.capacity
        );
        self.objects.push(object);
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Deref for ObjectsContainer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.objects
    }
}

type Slot<T> = Box<CachePadded<ObjectsContainer<T>>>;

pub struct ContainerPool<T> {
    free: Mutex<Vec<Slot<T>>>,
}

impl<T> ContainerPool<T> {
    pub fn new() -> Self {
        Self { free: Mutex::new(Vec::new()) }
    }

    /// Take a container that holds at least `needed` candidates.
    ///
    /// `reader` is whatever lock guard the caller took to make the
    /// candidates coherent; it is released together with the container.
    pub fn acquire<G>(&self, needed: usize, reader: Option<G>) -> PooledContainer<'_, T, G> {
        let recycled = self.free.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let container = match recycled {
            Some(container) if container.capacity >= needed => container,
            _ => {
                debug!("Allocating candidate container for {needed} objects");
                Box::new(CachePadded::new(ObjectsContainer::with_capacity(needed)))
            }
        };
        PooledContainer { pool: self, container: Some(container), reader }
    }

    /// Containers currently on the free list
    #[cfg(test)]
    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, mut container: Slot<T>) {
        container.objects.clear();
        self.free.lock().unwrap_or_else(PoisonError::into_inner).push(container);
    }
}

impl<T> Default for ContainerPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A container on loan from a [`ContainerPool`], returned on drop
pub struct PooledContainer<'a, T, G> {
    pool: &'a ContainerPool<T>,
    container: Option<Slot<T>>,
    reader: Option<G>,
}

impl<T, G> PooledContainer<'_, T, G> {
    pub fn push(&mut self, object: T) {
        if let Some(container) = self.container.as_mut() {
            container.push(object);
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.container.as_ref().map_or(0, |container| container.capacity)
    }

    /// Whether the acquisition took a reader lock
    #[cfg(test)]
    #[must_use]
    pub fn holds_reader(&self) -> bool {
        self.reader.is_some()
    }

    /// Push candidates found in the data behind the reader guard.
    ///
    /// Does nothing when no reader lock was taken.
    pub fn fill_under_reader<F>(&mut self, fill: F)
    where
        F: FnOnce(&G, &mut ObjectsContainer<T>),
    {
        if let (Some(reader), Some(container)) = (self.reader.as_ref(), self.container.as_mut()) {
            fill(reader, &mut ***container);
        }
    }
}

impl<T, G> Deref for PooledContainer<'_, T, G> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.container.as_ref().map_or(&[][..], |container| container.objects.as_slice())
    }
}

impl<T, G> Drop for PooledContainer<'_, T, G> {
    fn drop(&mut self) {
        if let Some(container) = self.container.take() {
            self.pool.release(container);
        }
        // `reader` drops after this, releasing the lock
    }
}
