//! Process-wide service instance and the audit entry points.
//!
//! An `LD_AUDIT` shim has no context to thread through, so it reaches the
//! service through these functions. Lookups go through [`service`].

use log::{debug, info};
use std::sync::{Arc, PoisonError, RwLock};
use symscope_common::AuditCookie;

use crate::config::Addr2lineConfig;
use crate::lookup::Addr2line;
use crate::registry::SoHandle;

static SERVICE: RwLock<Option<Arc<Addr2line>>> = RwLock::new(None);

/// Enumerate load-time objects with the configuration from the environment.
///
/// A second call returns the existing service.
pub fn initialize() -> Arc<Addr2line> {
    initialize_with(Addr2lineConfig::from_env())
}

/// Like [`initialize`], with an explicit configuration.
///
/// `config` is ignored when the service already exists.
pub fn initialize_with(config: Addr2lineConfig) -> Arc<Addr2line> {
    let mut slot = SERVICE.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(service) = slot.as_ref() {
        debug!("Already initialized");
        return Arc::clone(service);
    }
    let service = Arc::new(Addr2line::new(config));
    *slot = Some(Arc::clone(&service));
    service
}

/// Tear the service down; `false` if it was not running.
///
/// Symbol tables are released once the last outstanding [`service`]
/// reference is dropped.
pub fn finalize() -> bool {
    let Some(service) = SERVICE.write().unwrap_or_else(PoisonError::into_inner).take() else {
        debug!("Not initialized, nothing to finalize");
        return false;
    };
    match Arc::try_unwrap(service) {
        Ok(service) => service.finalize(),
        Err(shared) => info!(
            "Finalizing while {} references are outstanding",
            Arc::strong_count(&shared) - 1
        ),
    }
    true
}

/// The running service, `None` before [`initialize`] or after [`finalize`]
#[must_use]
pub fn service() -> Option<Arc<Addr2line>> {
    SERVICE.read().unwrap_or_else(PoisonError::into_inner).clone()
}

#[must_use]
pub fn is_initialized() -> bool {
    SERVICE.read().unwrap_or_else(PoisonError::into_inner).is_some()
}

/// `la_preinit`
pub fn la_preinit() {
    if let Some(service) = service() {
        service.preinit();
    }
}

/// `la_objopen`
pub fn la_objopen(name: &str, cookie: AuditCookie) -> Option<SoHandle> {
    let Some(service) = service() else {
        debug!("'{name}' opened before initialization");
        return None;
    };
    service.object_opened(name, cookie)
}

/// `la_objclose`
pub fn la_objclose(cookie: AuditCookie) -> bool {
    service().is_some_and(|service| service.object_closed(cookie))
}
