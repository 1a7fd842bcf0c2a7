//! Process-wide facts about the running executable.

use log::debug;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

static EXECUTABLE_NAME: OnceLock<String> = OnceLock::new();

/// Resolved path of the running executable.
///
/// `dl_iterate_phdr` reports the main program with an empty name, so the
/// record representing it borrows this string instead of owning one. Resolved
/// once via `/proc/self/exe`, falling back to [`std::env::current_exe`].
/// Empty if neither is available.
pub fn executable_name() -> &'static str {
    EXECUTABLE_NAME.get_or_init(|| {
        let path = resolve_exe_path().or_else(|| std::env::current_exe().ok());
        match path {
            Some(path) => path.to_string_lossy().into_owned(),
            None => {
                debug!("Cannot resolve the executable path");
                String::new()
            }
        }
    })
}

/// Resolve the executable path via `/proc/self/exe`.
fn resolve_exe_path() -> Option<PathBuf> {
    fs::read_link("/proc/self/exe").ok()
}
