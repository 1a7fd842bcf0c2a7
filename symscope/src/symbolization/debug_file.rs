//! Separate debug files of stripped objects.
//!
//! Distributions strip shared libraries and ship their DWARF in a second
//! file, linked either by a `.gnu_debuglink` section (file name plus CRC32
//! of the debug file) or by the build-id note. Searched locations follow
//! what gdb and binutils do:
//!
//! ```text
//! /usr/lib/debug/.build-id/ab/cdef....debug     (build-id)
//! <dir>/<debuglink>
//! <dir>/.debug/<debuglink>
//! /usr/lib/debug/<dir>/<debuglink>
//! ```

use log::debug;
use object::Object;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

pub const GLOBAL_DEBUG_DIR: &str = "/usr/lib/debug";

/// Path of the build-id keyed debug file below `debug_dir`
pub fn build_id_path(debug_dir: &Path, build_id: &[u8]) -> Option<PathBuf> {
    let (first, rest) = build_id.split_first()?;
    let mut name = String::with_capacity(rest.len() * 2 + 6);
    for byte in rest {
        let _ = write!(name, "{byte:02x}");
    }
    name.push_str(".debug");
    Some(debug_dir.join(".build-id").join(format!("{first:02x}")).join(name))
}

/// Candidate locations of the `.gnu_debuglink` target of `object_path`
pub fn debuglink_candidates(object_path: &Path, link: &str, debug_dir: &Path) -> Vec<PathBuf> {
    let dir = object_path.parent().unwrap_or_else(|| Path::new("/"));
    let mut candidates = vec![dir.join(link), dir.join(".debug").join(link)];
    if let Ok(relative) = dir.strip_prefix("/") {
        candidates.push(debug_dir.join(relative).join(link));
    }
    // The link may name the object itself when debug info was never split off
    candidates.retain(|candidate| candidate != object_path);
    candidates
}

/// Contents of the separate debug file of `obj`, read from `object_path`.
///
/// A build-id match wins; a debuglink candidate is only accepted when its
/// CRC32 matches the one recorded in the link.
pub fn find(object_path: &Path, obj: &object::File<'_>) -> Option<Vec<u8>> {
    find_in(object_path, obj, Path::new(GLOBAL_DEBUG_DIR))
}

pub fn find_in(object_path: &Path, obj: &object::File<'_>, debug_dir: &Path) -> Option<Vec<u8>> {
    if let Some(path) = obj.build_id().ok().flatten().and_then(|id| build_id_path(debug_dir, id)) {
        if let Ok(data) = fs::read(&path) {
            debug!("Using debug file {} of {}", path.display(), object_path.display());
            return Some(data);
        }
    }

    let (link, crc) = obj.gnu_debuglink().ok().flatten()?;
    let link = std::str::from_utf8(link).ok()?;
    for candidate in debuglink_candidates(object_path, link, debug_dir) {
        let Ok(data) = fs::read(&candidate) else {
            continue;
        };
        let actual = crc32fast::hash(&data);
        if actual != crc {
            debug!(
                "Debuglink checksum mismatch in {}: expected {crc:#010x}, found {actual:#010x}",
                candidate.display()
            );
            continue;
        }
        debug!("Using debug file {} of {}", candidate.display(), object_path.display());
        return Some(data);
    }

    debug!("No separate debug file for {} (link '{link}')", object_path.display());
    None
}
