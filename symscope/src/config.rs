//! Relevance-filter configuration
//!
//! Some mapped objects are never meaningful resolution targets (the vDSO,
//! this library itself, trace-format libraries) and some actively hurt: the
//! dynamic linker's own mapping has been seen overlapping run-time loaded
//! libraries. The denylist below was tuned on glibc/Linux and is not
//! exhaustive on other platforms, hence configurable.

use log::debug;

/// Environment variable with extra comma-separated patterns to ignore
pub const IGNORE_OBJECTS_ENV: &str = "SYMSCOPE_IGNORE_OBJECTS";

/// Substring patterns of object paths skipped by default
pub const DEFAULT_IGNORED_OBJECTS: &[&str] =
    &["linux-vdso", "ld-linux", "libsymscope", "libotf2", "libcube4w"];

#[derive(Debug, Clone)]
pub struct Addr2lineConfig {
    /// Objects whose path contains any of these substrings are never tracked
    pub ignored_objects: Vec<String>,
}

impl Default for Addr2lineConfig {
    fn default() -> Self {
        Self { ignored_objects: DEFAULT_IGNORED_OBJECTS.iter().map(|s| (*s).to_string()).collect() }
    }
}

impl Addr2lineConfig {
    /// Defaults plus the patterns listed in `SYMSCOPE_IGNORE_OBJECTS`
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var(IGNORE_OBJECTS_ENV) {
            Ok(value) => config.with_patterns(&value),
            Err(_) => config,
        }
    }

    /// Add one pattern to the denylist
    #[must_use]
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        if !pattern.is_empty() {
            self.ignored_objects.push(pattern);
        }
        self
    }

    fn with_patterns(self, list: &str) -> Self {
        list.split(',').map(str::trim).fold(self, Self::ignore)
    }

    /// Returns false if `name` matches any ignored pattern.
    #[must_use]
    pub fn is_relevant(&self, name: &str) -> bool {
        match self.ignored_objects.iter().find(|pattern| name.contains(pattern.as_str())) {
            Some(pattern) => {
                debug!("'{name}' not relevant (matches '{pattern}')");
                false
            }
            None => true,
        }
    }
}
