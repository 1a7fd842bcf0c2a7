use log::{debug, warn};
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use symscope_common::Token;

use crate::domain::SymbolTableError;
use crate::registry::phdr::LoadedObject;
use crate::symbolization::{OffsetLookup, SymbolTable};

/// A mapped object with its decoded symbol table, not yet tracked
pub struct ObjectImage {
    name: Cow<'static, str>,
    base_addr: usize,
    begin_addr: usize,
    end_addr: usize,
    symbols: SymbolTable,
}

impl ObjectImage {
    /// Decode the symbol table of `path`, mapped at `base_addr` and covering
    /// `[begin_addr, end_addr]`.
    ///
    /// # Errors
    /// When the file has no usable symbol table.
    pub fn load(
        path: &str,
        base_addr: usize,
        begin_addr: usize,
        end_addr: usize,
    ) -> Result<Self, SymbolTableError> {
        Self::with_name(Cow::Owned(path.to_string()), base_addr, begin_addr, end_addr)
    }

    fn with_name(
        name: Cow<'static, str>,
        base_addr: usize,
        begin_addr: usize,
        end_addr: usize,
    ) -> Result<Self, SymbolTableError> {
        let symbols = SymbolTable::load(&name)?;
        Ok(Self { name, base_addr, begin_addr, end_addr, symbols })
    }

    /// Build the image for an object reported by the loader.
    ///
    /// `None` when it has no loadable and readable segment or no usable
    /// symbols; both are common and only logged.
    pub(crate) fn from_loaded(object: &LoadedObject, name: Cow<'static, str>) -> Option<Self> {
        let Some((begin, end)) = object.address_span() else {
            warn!("'{name}' has no loadable and readable segment");
            return None;
        };
        match Self::with_name(name, object.bias, begin, end) {
            Ok(image) => Some(image),
            Err(e) => {
                debug!("Skipping object: {e}");
                None
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.base_addr
    }

    #[must_use]
    pub fn begin_addr(&self) -> usize {
        self.begin_addr
    }

    #[must_use]
    pub fn end_addr(&self) -> usize {
        self.end_addr
    }
}

struct SharedObject {
    name: Cow<'static, str>,
    base_addr: usize,
    begin_addr: usize,
    end_addr: usize,
    token: Token,
    /// The decoder keeps per-table caches and is not reentrant
    symbols: Mutex<SymbolTable>,
}

/// Handle to a tracked object
///
/// Cheap to clone. A handle to a run-time object stays valid after the
/// object was closed; whether it is still loaded is answered by its token.
#[derive(Clone)]
pub struct SoHandle(Arc<SharedObject>);

impl SoHandle {
    pub(crate) fn new(image: ObjectImage, token: Token) -> Self {
        let ObjectImage { name, base_addr, begin_addr, end_addr, symbols } = image;
        Self(Arc::new(SharedObject {
            name,
            base_addr,
            begin_addr,
            end_addr,
            token,
            symbols: Mutex::new(symbols),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn base_addr(&self) -> usize {
        self.0.base_addr
    }

    #[must_use]
    pub fn begin_addr(&self) -> usize {
        self.0.begin_addr
    }

    #[must_use]
    pub fn end_addr(&self) -> usize {
        self.0.end_addr
    }

    #[must_use]
    pub fn token(&self) -> Token {
        self.0.token
    }

    /// Whether `addr` lies in the object's (inclusive) address range
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        self.0.begin_addr <= addr && addr <= self.0.end_addr
    }

    pub(crate) fn overlaps(&self, other: &SoHandle) -> bool {
        self.0.begin_addr <= other.0.end_addr && other.0.begin_addr <= self.0.end_addr
    }

    /// Whether both handles refer to the same tracked object
    #[must_use]
    pub fn same_object(&self, other: &SoHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Nearest-line lookup of object-relative offsets, serialized per object
    pub(crate) fn lookup(&self, begin_offset: usize, end_offset: usize) -> OffsetLookup {
        let symbols = self.0.symbols.lock().unwrap_or_else(PoisonError::into_inner);
        symbols.lookup(begin_offset as u64, end_offset as u64)
    }
}

impl fmt::Debug for SoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoHandle")
            .field("name", &self.0.name)
            .field("base_addr", &format_args!("{:#x}", self.0.base_addr))
            .field("begin_addr", &format_args!("{:#x}", self.0.begin_addr))
            .field("end_addr", &format_args!("{:#x}", self.0.end_addr))
            .field("token", &format_args!("{}", self.0.token))
            .finish_non_exhaustive()
    }
}
