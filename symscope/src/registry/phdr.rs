//! Snapshot of the objects currently mapped into the process, via
//! `dl_iterate_phdr`.

#![allow(unsafe_code)] // FFI callback reading the loader's program headers

use std::ffi::CStr;

/// Program header layout of the native ELF class
#[cfg(target_pointer_width = "64")]
pub type ElfPhdr = libc::Elf64_Phdr;
#[cfg(target_pointer_width = "32")]
pub type ElfPhdr = libc::Elf32_Phdr;

/// One program header of a mapped object, in link-time addresses
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub vaddr: usize,
    pub memsz: usize,
    /// `PT_LOAD` with `PF_R` set
    pub loadable_readable: bool,
}

#[derive(Debug, Clone)]
pub struct LoadedObject {
    /// Path as reported by the loader; empty for the main executable
    pub name: String,
    /// Load bias (`dlpi_addr`)
    pub bias: usize,
    pub segments: Vec<Segment>,
}

impl LoadedObject {
    #[must_use]
    pub fn has_readable_load_segment(&self) -> bool {
        self.segments.iter().any(|segment| segment.loadable_readable)
    }

    /// Union of all loadable and readable segments in absolute addresses,
    /// as `(begin, end)` with `end` one past the last mapped byte.
    #[must_use]
    pub fn address_span(&self) -> Option<(usize, usize)> {
        self.segments
            .iter()
            .filter(|segment| segment.loadable_readable)
            .map(|segment| {
                let begin = self.bias.wrapping_add(segment.vaddr);
                (begin, begin.wrapping_add(segment.memsz))
            })
            .reduce(|(lo, hi), (begin, end)| (lo.min(begin), hi.max(end)))
    }
}

/// Objects in the loader's iteration order; the main executable comes first.
#[must_use]
pub fn loaded_objects() -> Vec<LoadedObject> {
    let mut objects: Vec<LoadedObject> = Vec::new();
    // SAFETY: the callback only runs during this call and `objects` outlives it
    unsafe {
        libc::dl_iterate_phdr(Some(collect), std::ptr::from_mut(&mut objects).cast());
    }
    objects
}

#[allow(clippy::cast_possible_truncation)] // ELF addresses fit the native word
unsafe extern "C" fn collect(
    info: *mut libc::dl_phdr_info,
    _size: libc::size_t,
    data: *mut libc::c_void,
) -> libc::c_int {
    let objects = &mut *data.cast::<Vec<LoadedObject>>();
    let info = &*info;

    let name = if info.dlpi_name.is_null() {
        String::new()
    } else {
        CStr::from_ptr(info.dlpi_name).to_string_lossy().into_owned()
    };

    let headers: &[ElfPhdr] = if info.dlpi_phdr.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum))
    };

    objects.push(LoadedObject {
        name,
        bias: info.dlpi_addr as usize,
        segments: headers
            .iter()
            .map(|header| Segment {
                vaddr: header.p_vaddr as usize,
                memsz: header.p_memsz as usize,
                loadable_readable: header.p_type == libc::PT_LOAD
                    && header.p_flags & libc::PF_R != 0,
            })
            .collect(),
    });
    0
}
