//! # symscope - Runtime Symbolication for Measurement Tools
//!
//! symscope maps instruction addresses of the running process to the shared
//! object that contains them and to a `(file, function, line)` source
//! location. It is meant to sit inside a measurement library: addresses come
//! from call-path unwinding or instrumented callbacks, and resolution must be
//! safe while the program keeps calling `dlopen`/`dlclose`.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Measurement System                          │
//! │      (unwinder, callback recorder, LD_AUDIT shim)               │
//! └──────────┬───────────────────────────────────┬──────────────────┘
//!            │ lookups (any thread)              │ la_objopen / la_objclose
//!            ▼                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  symscope (This Crate)                          │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │    lookup    │──▶│  Load-time   │   │   Run-time   │         │
//! │  │  (Addr2line) │──▶│   objects    │   │   objects    │◀─ rw    │
//! │  └──────┬───────┘   │  (no lock)   │   │ (rw-locked)  │   lock  │
//! │         │           └──────────────┘   └──────┬───────┘         │
//! │         │ per-object mutex                    │ close           │
//! │         ▼                                     ▼                 │
//! │  ┌──────────────┐                      ┌──────────────┐         │
//! │  │ Symbol table │                      │   Retired    │         │
//! │  │   (DWARF)    │                      │   objects    │         │
//! │  └──────────────┘                      └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`lookup`]: The [`Addr2line`] service: object discovery, line and range
//!   lookups, audit notifications
//! - [`registry`]: Load-time and run-time object registries
//!   - `phdr`: Snapshot of mapped objects via `dl_iterate_phdr`
//!   - `shared_object`: [`ObjectImage`] and the [`SoHandle`] handed to callers
//! - [`symbolization`]: Symbol tables and nearest-line lookup (DWARF)
//! - [`sync`]: Reader/writer lock, token liveness bitset, candidate container pool
//! - [`global`]: Process-wide instance with idempotent `initialize`/`finalize`
//! - [`config`]: Relevance filter
//! - [`domain`]: Result types and errors
//! - [`cli`]: Arguments of the `symscope` diagnostic binary
//!
//! ## Typical Usage
//!
//! ```no_run
//! fn main() {
//!     let service = symscope::global::initialize();
//!     let hit = service.lookup_addr(main as usize);
//!     if hit.found {
//!         println!("{}", hit.location.describe());
//!     }
//!     drop(service);
//!     symscope::global::finalize();
//! }
//! ```
//!
//! ## Key Concepts
//!
//! - **Load-time object**: Mapped before initialization, immutable afterwards
//! - **Run-time object**: Opened later, announced by the dynamic linker's audit interface
//! - **Token**: Small integer naming a run-time object's liveness slot; stays
//!   meaningful after the object is closed
//! - **Overlap**: Coarse object ranges may intersect; every containing object
//!   is a candidate and the one whose symbol table resolves the offset wins

pub mod cli;
pub mod config;
pub mod domain;
pub mod global;
pub mod lookup;
pub mod process;
pub mod registry;
pub mod symbolization;
pub mod sync;

pub use config::Addr2lineConfig;
pub use lookup::Addr2line;
pub use registry::{ObjectClosed, ObjectImage, SoHandle};
pub use symscope_common::{Token, INVALID_TOKEN, LT_OBJECT_TOKEN};
