//! Objects mapped before initialization.
//!
//! Enumerated once and immutable afterwards, so lookups read them without
//! taking any lock.

use log::{debug, info};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU32, Ordering};
use symscope_common::LT_OBJECT_TOKEN;

use crate::config::Addr2lineConfig;
use crate::process::executable_name;
use crate::registry::phdr::{self, LoadedObject};
use crate::registry::shared_object::{ObjectImage, SoHandle};

pub struct LoadTimeObjects {
    objects: Vec<SoHandle>,
    /// Relevant objects with a readable load segment at enumeration
    capacity: usize,
    min_addr: usize,
    max_addr: usize,
}

/// Name under which the `idx`-th loader entry is tracked.
///
/// Only the first entry may be unnamed: that is the main program.
fn tracked_name(idx: usize, object: &LoadedObject) -> Option<Cow<'static, str>> {
    match (idx, object.name.is_empty()) {
        (0, true) => Some(Cow::Borrowed(executable_name())),
        (_, true) => {
            debug!("Skipping unnamed object at position {idx}");
            None
        }
        (_, false) => Some(Cow::Owned(object.name.clone())),
    }
}

impl LoadTimeObjects {
    fn with_capacity(capacity: usize) -> Self {
        Self { objects: Vec::with_capacity(capacity), capacity, min_addr: usize::MAX, max_addr: 0 }
    }

    /// Track every relevant object currently mapped into the process.
    pub fn enumerate(config: &Addr2lineConfig, overlaps: &AtomicU32) -> Self {
        Self::from_mapped(&phdr::loaded_objects(), config, overlaps)
    }

    fn from_mapped(mapped: &[LoadedObject], config: &Addr2lineConfig, overlaps: &AtomicU32) -> Self {
        let relevant: Vec<(Cow<'static, str>, &LoadedObject)> = mapped
            .iter()
            .enumerate()
            .filter_map(|(idx, object)| Some((tracked_name(idx, object)?, object)))
            .filter(|(name, _)| config.is_relevant(name))
            .collect();

        let capacity =
            relevant.iter().filter(|(_, object)| object.has_readable_load_segment()).count();
        let mut registry = Self::with_capacity(capacity);
        for (name, object) in relevant {
            if let Some(image) = ObjectImage::from_loaded(object, name) {
                registry.push(image, overlaps);
            }
        }

        info!(
            "Tracking {} of {} mapped objects (capacity {}, {:#x}..={:#x})",
            registry.objects.len(),
            mapped.len(),
            registry.capacity,
            registry.min_addr,
            registry.max_addr
        );
        registry
    }

    /// Track exactly the given images, in order.
    pub fn from_images(images: Vec<ObjectImage>, overlaps: &AtomicU32) -> Self {
        let mut registry = Self::with_capacity(images.len());
        for image in images {
            registry.push(image, overlaps);
        }
        registry
    }

    fn push(&mut self, image: ObjectImage, overlaps: &AtomicU32) {
        let handle = SoHandle::new(image, LT_OBJECT_TOKEN);
        let overlapping = self.objects.iter().filter(|object| object.overlaps(&handle)).count();
        if overlapping > 0 {
            debug!("'{}' overlaps {overlapping} load-time objects", handle.name());
            overlaps.fetch_add(u32::try_from(overlapping).unwrap_or(u32::MAX), Ordering::SeqCst);
        }

        self.min_addr = self.min_addr.min(handle.begin_addr());
        self.max_addr = self.max_addr.max(handle.end_addr());
        debug!("Tracking load-time object {handle:?}");
        self.objects.push(handle);
    }

    /// Number of loader entries assumed to be load-time objects
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SoHandle> {
        self.objects.iter()
    }

    /// Lowest begin and highest end address, `None` if nothing is tracked
    #[must_use]
    pub fn envelope(&self) -> Option<(usize, usize)> {
        (!self.objects.is_empty()).then_some((self.min_addr, self.max_addr))
    }

    /// Objects whose range contains `addr`, in insertion order
    pub fn containing(&self, addr: usize) -> impl Iterator<Item = &SoHandle> {
        let in_envelope = self.min_addr <= addr && addr <= self.max_addr;
        self.objects.iter().filter(move |object| in_envelope && object.contains(addr))
    }
}
