//! Address to source-location resolution over all tracked objects.
//!
//! Object discovery collects every tracked object whose range contains the
//! address, then asks each candidate's symbol table in turn; the first one
//! that resolves the object-relative offset owns the address. Run-time
//! objects are only consulted under the reader lock, and only if any exist.

use log::{debug, info};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU32, Ordering};
use symscope_common::{AuditCookie, Token};

use crate::config::Addr2lineConfig;
use crate::domain::{AddrLookup, AddrRangeLookup, LineLookup, RangeLookup};
use crate::registry::phdr;
use crate::registry::{
    ActiveObjects, LoadTimeObjects, ObjectClosed, ObjectImage, RunTimeObjects, SoHandle,
};
use crate::sync::{ContainerPool, PooledContainer, ReadGuard};

type Candidates<'a> = PooledContainer<'a, SoHandle, ReadGuard<'a, ActiveObjects>>;

/// Access to a caller-supplied handle after its token was checked
enum Gate<'a> {
    /// Load-time object, or a live run-time object kept open by the guard
    Open(Option<ReadGuard<'a, ActiveObjects>>),
    /// The run-time object was closed
    Stale,
}

/// The symbolication service
///
/// Load-time objects are enumerated on construction; run-time objects come
/// and go through [`Addr2line::object_opened`] and [`Addr2line::object_closed`].
pub struct Addr2line {
    config: Addr2lineConfig,
    load_time: LoadTimeObjects,
    run_time: RunTimeObjects,
    /// Pairs of tracked objects with intersecting ranges; never decreases
    overlaps: AtomicU32,
    pool: ContainerPool<SoHandle>,
}

impl Addr2line {
    /// Enumerate the objects currently mapped into the process.
    #[must_use]
    pub fn new(config: Addr2lineConfig) -> Self {
        let overlaps = AtomicU32::new(0);
        let load_time = LoadTimeObjects::enumerate(&config, &overlaps);
        Self::with_load_time(config, load_time, overlaps)
    }

    /// Use `images` as the load-time objects instead of enumerating the process.
    #[must_use]
    pub fn from_images(config: Addr2lineConfig, images: Vec<ObjectImage>) -> Self {
        let overlaps = AtomicU32::new(0);
        let load_time = LoadTimeObjects::from_images(images, &overlaps);
        Self::with_load_time(config, load_time, overlaps)
    }

    fn with_load_time(
        config: Addr2lineConfig,
        load_time: LoadTimeObjects,
        overlaps: AtomicU32,
    ) -> Self {
        Self {
            config,
            load_time,
            run_time: RunTimeObjects::default(),
            overlaps,
            pool: ContainerPool::new(),
        }
    }

    /// The dynamic linker is done with load-time objects; open and close
    /// notifications follow from here on.
    pub fn preinit(&self) {
        debug!("preinit: {} load-time objects tracked", self.load_time.len());
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    fn candidates(&self, addr: usize) -> Candidates<'_> {
        let reader = self.run_time.read_if_any();
        // Read under the lock: no insert can raise it while we collect
        let needed = self.overlaps.load(Ordering::SeqCst) as usize + 1;
        let mut candidates = self.pool.acquire(needed, reader);

        for object in self.load_time.containing(addr) {
            candidates.push(object.clone());
        }
        candidates.fill_under_reader(|active, container| {
            for object in active.containing(addr) {
                container.push(object.clone());
            }
        });
        candidates
    }

    /// Owning object of `addr`, confirmed by a symbol table lookup
    #[must_use]
    pub fn lookup_so(&self, addr: usize) -> Option<SoHandle> {
        let candidates = self.candidates(addr);
        let owner = candidates
            .iter()
            .find(|object| object.lookup(addr.wrapping_sub(object.base_addr()), 0).begin.is_some())
            .cloned();
        if owner.is_none() {
            debug!("addr {addr:#x}: no owning object");
        }
        owner
    }

    /// Resolve `addr` to its owning object and source location.
    #[must_use]
    pub fn lookup_addr(&self, addr: usize) -> AddrLookup {
        let candidates = self.candidates(addr);
        let hit = candidates.iter().find_map(|object| {
            let location = object.lookup(addr.wrapping_sub(object.base_addr()), 0).begin?;
            Some((object.clone(), location))
        });
        drop(candidates);

        match hit {
            Some((object, location)) => {
                debug!("addr {addr:#x}: {} [{}]", location.describe(), object.name());
                AddrLookup { object: Some(object), found: true, location }
            }
            None => {
                debug!("addr {addr:#x}: not resolved");
                AddrLookup::default()
            }
        }
    }

    /// Resolve `[begin, end]` within the object owning `begin`.
    ///
    /// Prefers the first candidate that resolves both ends; otherwise
    /// reports the first one that resolved `begin` with `found_end` unset.
    /// `end == 0` asks for the begin location only.
    #[must_use]
    pub fn lookup_addr_range(&self, begin: usize, end: usize) -> AddrRangeLookup {
        let candidates = self.candidates(begin);
        let mut partial: Option<AddrRangeLookup> = None;

        for object in candidates.iter() {
            let base = object.base_addr();
            let end_offset = if end == 0 { 0 } else { end.wrapping_sub(base) };
            let result = object.lookup(begin.wrapping_sub(base), end_offset);
            let Some(location) = result.begin else {
                continue;
            };
            let found_end = result.end_line.is_some();
            let lookup = AddrRangeLookup {
                object: Some(object.clone()),
                found_begin: true,
                found_end,
                location,
                end_line: result.end_line.unwrap_or(0),
            };
            if found_end {
                return lookup;
            }
            if partial.is_none() {
                partial = Some(lookup);
            }
        }

        partial.unwrap_or_default()
    }

    /// Check `token` against `handle` before touching its symbol table.
    ///
    /// # Panics
    /// When `token` does not belong to `handle`.
    fn gate(&self, handle: &SoHandle, token: Token) -> Gate<'_> {
        let reader = if token.is_load_time() {
            None
        } else {
            let reader = self.run_time.read();
            if !self.run_time.is_loaded(token) {
                debug!("Lookup in '{}' with stale {token}", handle.name());
                return Gate::Stale;
            }
            Some(reader)
        };
        assert_eq!(handle.token(), token, "Provided token does not match the handle's token");
        Gate::Open(reader)
    }

    /// Resolve an offset inside an object obtained from an earlier lookup.
    ///
    /// # Panics
    /// When `token` does not belong to `handle`.
    #[must_use]
    pub fn so_lookup_addr(&self, offset: usize, handle: &SoHandle, token: Token) -> LineLookup {
        let object_name = handle.name().to_string();
        let Gate::Open(_reader) = self.gate(handle, token) else {
            return LineLookup { object_name, ..LineLookup::default() };
        };

        match handle.lookup(offset, 0).begin {
            Some(location) => LineLookup { object_name, found: true, location },
            None => LineLookup { object_name, ..LineLookup::default() },
        }
    }

    /// Range variant of [`Addr2line::so_lookup_addr`].
    ///
    /// # Panics
    /// When `token` does not belong to `handle`.
    #[must_use]
    pub fn so_lookup_addr_range(
        &self,
        begin_offset: usize,
        end_offset: usize,
        handle: &SoHandle,
        token: Token,
    ) -> RangeLookup {
        let object_name = handle.name().to_string();
        let Gate::Open(_reader) = self.gate(handle, token) else {
            return RangeLookup { object_name, ..RangeLookup::default() };
        };

        let result = handle.lookup(begin_offset, end_offset);
        match result.begin {
            Some(location) => RangeLookup {
                object_name,
                found_begin: true,
                found_end: result.end_line.is_some(),
                location,
                end_line: result.end_line.unwrap_or(0),
            },
            None => RangeLookup { object_name, ..RangeLookup::default() },
        }
    }

    /// Whether the object named by `token` is still mapped.
    ///
    /// Load-time objects never go away.
    ///
    /// # Panics
    /// When `token` lies outside the token space.
    #[must_use]
    pub fn so_still_loaded(&self, token: Token) -> bool {
        token.is_load_time() || self.run_time.is_loaded(token)
    }

    // ------------------------------------------------------------------
    // Audit notifications
    // ------------------------------------------------------------------

    /// `la_objopen`: track the freshly mapped object `name`, if it has symbols.
    ///
    /// # Panics
    /// When the token space is exhausted.
    pub fn object_opened(&self, name: &str, cookie: AuditCookie) -> Option<SoHandle> {
        if name.is_empty() || !self.config.is_relevant(name) {
            return None;
        }

        let mapped = phdr::loaded_objects();
        let Some(object) =
            mapped.iter().skip(self.load_time.capacity()).find(|object| object.name == name)
        else {
            debug!("'{name}' opened but not among mapped objects");
            return None;
        };

        let image = ObjectImage::from_loaded(object, Cow::Owned(name.to_string()))?;
        Some(self.track_runtime_object(image, cookie))
    }

    /// Track an object whose mapping the caller already knows.
    ///
    /// # Panics
    /// When the token space is exhausted.
    pub fn track_runtime_object(&self, image: ObjectImage, cookie: AuditCookie) -> SoHandle {
        self.run_time.insert(image, cookie, &self.load_time, &self.overlaps)
    }

    /// `la_objclose`: stop tracking the object known as `cookie`.
    ///
    /// Returns `false` for objects that were never tracked.
    pub fn object_closed(&self, cookie: AuditCookie) -> bool {
        self.run_time.remove(cookie)
    }

    /// Run `callback` whenever a run-time object is closed, before its token
    /// is marked unloaded. It runs under the writer lock and must not look
    /// up addresses.
    pub fn register_objclose_callback<F>(&self, callback: F)
    where
        F: Fn(&ObjectClosed<'_>) + Send + Sync + 'static,
    {
        self.run_time.register_close_callback(callback);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn loadtime_objects(&self) -> Vec<SoHandle> {
        self.load_time.iter().cloned().collect()
    }

    /// Currently open run-time objects, newest first
    #[must_use]
    pub fn runtime_objects(&self) -> Vec<SoHandle> {
        self.run_time.read().iter().cloned().collect()
    }

    /// Closed run-time objects, most recently closed first
    #[must_use]
    pub fn retired_objects(&self) -> Vec<SoHandle> {
        self.run_time.retired()
    }

    #[must_use]
    pub fn overlap_count(&self) -> u32 {
        self.overlaps.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn loadtime_envelope(&self) -> Option<(usize, usize)> {
        self.load_time.envelope()
    }

    #[must_use]
    pub fn runtime_envelope(&self) -> Option<(usize, usize)> {
        self.run_time.read().envelope()
    }

    /// Release every symbol table, including those of closed objects.
    ///
    /// Handles still held elsewhere keep their object alive until dropped.
    pub fn finalize(self) {
        info!(
            "Finalizing: {} load-time, {} run-time, {} retired objects",
            self.load_time.len(),
            self.run_time.count(),
            self.run_time.retired().len()
        );
    }
}
