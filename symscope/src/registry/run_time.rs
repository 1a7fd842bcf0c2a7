//! Objects opened after initialization.
//!
//! Open and close notifications arrive from the dynamic linker and mutate
//! the active list under the writer side of [`ReaderWriterLock`]. Closed
//! objects move to a retired list instead of being dropped, so handles held
//! elsewhere keep answering diagnostic queries.

use log::debug;
use std::iter;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use symscope_common::{AuditCookie, Token};

use crate::registry::load_time::LoadTimeObjects;
use crate::registry::shared_object::{ObjectImage, SoHandle};
use crate::sync::{ReadGuard, ReaderWriterLock, TokenTracker};

/// What a close callback gets to see of the object being unloaded
#[derive(Debug)]
pub struct ObjectClosed<'a> {
    pub handle: &'a SoHandle,
    pub name: &'a str,
    pub base_addr: usize,
    pub token: Token,
}

/// Invoked under the writer lock; must not call back into lookups.
type CloseCallback = Box<dyn Fn(&ObjectClosed<'_>) + Send + Sync>;

struct RtNode {
    object: SoHandle,
    cookie: AuditCookie,
    next: Option<Box<RtNode>>,
}

/// Singly linked list, newest first
#[derive(Default)]
struct ObjectList {
    head: Option<Box<RtNode>>,
}

impl ObjectList {
    fn push_front(&mut self, mut node: Box<RtNode>) {
        node.next = self.head.take();
        self.head = Some(node);
    }

    fn unlink(&mut self, cookie: AuditCookie) -> Option<Box<RtNode>> {
        let mut cur = &mut self.head;
        while cur.as_ref().is_some_and(|node| node.cookie != cookie) {
            cur = &mut cur.as_mut()?.next;
        }
        let mut node = cur.take()?;
        *cur = node.next.take();
        Some(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SoHandle> {
        iter::successors(self.head.as_deref(), |node| node.next.as_deref()).map(|node| &node.object)
    }
}

impl Drop for ObjectList {
    fn drop(&mut self) {
        // iterative, a long list would overflow the stack otherwise
        let mut cur = self.head.take();
        while let Some(mut node) = cur {
            cur = node.next.take();
        }
    }
}

/// The active list and its address envelope
pub struct ActiveObjects {
    list: ObjectList,
    min_addr: usize,
    max_addr: usize,
}

impl Default for ActiveObjects {
    fn default() -> Self {
        Self { list: ObjectList::default(), min_addr: usize::MAX, max_addr: 0 }
    }
}

impl ActiveObjects {
    pub fn iter(&self) -> impl Iterator<Item = &SoHandle> {
        self.list.iter()
    }

    /// Objects whose range contains `addr`, newest first
    pub fn containing(&self, addr: usize) -> impl Iterator<Item = &SoHandle> {
        let in_envelope = self.min_addr <= addr && addr <= self.max_addr;
        self.list.iter().filter(move |object| in_envelope && object.contains(addr))
    }

    #[must_use]
    pub fn envelope(&self) -> Option<(usize, usize)> {
        self.list.head.is_some().then_some((self.min_addr, self.max_addr))
    }

    fn rescan_envelope(&mut self) {
        let (min_addr, max_addr) = self
            .list
            .iter()
            .fold((usize::MAX, 0), |(lo, hi), object| {
                (lo.min(object.begin_addr()), hi.max(object.end_addr()))
            });
        self.min_addr = min_addr;
        self.max_addr = max_addr;
    }
}

#[derive(Default)]
pub struct RunTimeObjects {
    active: ReaderWriterLock<ActiveObjects>,
    /// Live entries of `active`; lookups skip the lock while this is zero
    count: AtomicU32,
    tokens: TokenTracker,
    retired: Mutex<ObjectList>,
    close_callbacks: Mutex<Vec<CloseCallback>>,
}

impl RunTimeObjects {
    /// Start tracking `image`, known to the dynamic linker as `cookie`.
    ///
    /// # Panics
    /// When the token space is exhausted.
    pub fn insert(
        &self,
        image: ObjectImage,
        cookie: AuditCookie,
        load_time: &LoadTimeObjects,
        overlaps: &AtomicU32,
    ) -> SoHandle {
        let token = self.tokens.next_token();
        let handle = SoHandle::new(image, token);
        self.tokens.mark_loaded(token);

        let mut active = self.active.write();
        // Also count load-time objects: both kinds end up in one candidate set
        let overlapping = active
            .list
            .iter()
            .chain(load_time.iter())
            .filter(|object| object.overlaps(&handle))
            .count();
        if overlapping > 0 {
            debug!("'{}' overlaps {overlapping} tracked objects", handle.name());
            overlaps.fetch_add(u32::try_from(overlapping).unwrap_or(u32::MAX), Ordering::SeqCst);
        }

        active.min_addr = active.min_addr.min(handle.begin_addr());
        active.max_addr = active.max_addr.max(handle.end_addr());
        active.list.push_front(Box::new(RtNode { object: handle.clone(), cookie, next: None }));
        self.count.fetch_add(1, Ordering::SeqCst);
        drop(active);

        debug!("Tracking run-time object {handle:?}");
        handle
    }

    /// Stop tracking the object known as `cookie`; `false` if it was never tracked.
    pub fn remove(&self, cookie: AuditCookie) -> bool {
        let mut active = self.active.write();
        let Some(node) = active.list.unlink(cookie) else {
            debug!("Close of untracked object (cookie {cookie:#x})");
            return false;
        };

        let object = &node.object;
        {
            let callbacks = self.close_callbacks.lock().unwrap_or_else(PoisonError::into_inner);
            let closed = ObjectClosed {
                handle: object,
                name: object.name(),
                base_addr: object.base_addr(),
                token: object.token(),
            };
            for callback in callbacks.iter() {
                callback(&closed);
            }
        }

        self.tokens.mark_unloaded(object.token());
        self.count.fetch_sub(1, Ordering::SeqCst);
        if object.begin_addr() == active.min_addr || object.end_addr() == active.max_addr {
            active.rescan_envelope();
        }
        drop(active);

        debug!("Retiring run-time object {object:?}");
        self.retired.lock().unwrap_or_else(PoisonError::into_inner).push_front(node);
        true
    }

    pub fn register_close_callback<F>(&self, callback: F)
    where
        F: Fn(&ObjectClosed<'_>) + Send + Sync + 'static,
    {
        self.close_callbacks.lock().unwrap_or_else(PoisonError::into_inner).push(Box::new(callback));
    }

    /// Reader access to the active list, `None` while it is empty
    pub fn read_if_any(&self) -> Option<ReadGuard<'_, ActiveObjects>> {
        (self.count.load(Ordering::SeqCst) > 0).then(|| self.active.read())
    }

    /// Unconditional reader access to the active list
    pub fn read(&self) -> ReadGuard<'_, ActiveObjects> {
        self.active.read()
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    /// # Panics
    /// When `token` lies outside the token space.
    #[must_use]
    pub fn is_loaded(&self, token: Token) -> bool {
        self.tokens.is_loaded(token)
    }

    /// Handles of closed objects, most recently closed first
    #[must_use]
    pub fn retired(&self) -> Vec<SoHandle> {
        self.retired.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }
}
