//! # Object Registries
//!
//! Tracks which shared objects occupy which address ranges:
//!
//! ```text
//!  dl_iterate_phdr ──► phdr::LoadedObject ──► relevance filter ──► ObjectImage
//!                                                                      │
//!            ┌─────────────────────────────────────────────────────────┤
//!            ▼ (initialization)                                        ▼ (la_objopen)
//!     LoadTimeObjects                                           RunTimeObjects
//!     immutable, lock-free reads                     rw-locked list, token per object
//!                                                                      │ (la_objclose)
//!                                                                      ▼
//!                                                               retired list
//! ```
//!
//! Both registries hand out [`SoHandle`]s. Address ranges are coarse unions
//! of loadable segments and may overlap; the global overlap counter passed
//! to both registries bounds how many objects can contain one address.

pub mod load_time;
pub mod phdr;
pub mod run_time;
pub mod shared_object;

pub use load_time::LoadTimeObjects;
pub use run_time::{ActiveObjects, ObjectClosed, RunTimeObjects};
pub use shared_object::{ObjectImage, SoHandle};
