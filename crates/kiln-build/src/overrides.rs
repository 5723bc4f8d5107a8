//! Path-keyed compiler profile overrides

use crate::error::{BuildError, BuildResult};
use crate::profile::CompilerProfile;
use std::collections::BTreeMap;

/// Table of per-file compiler profiles
///
/// Keys are source paths relative to the project root with `/` separators.
/// An entry replaces the default profile for its path entirely; nothing is
/// merged field by field.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: BTreeMap<String, CompilerProfile>,
}

impl OverrideTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an override for `path`
    pub fn add_override(
        &mut self,
        path: impl Into<String>,
        profile: CompilerProfile,
    ) -> BuildResult<()> {
        let path = path.into();
        if self.entries.contains_key(&path) {
            return Err(BuildError::DuplicateOverride { path });
        }
        self.entries.insert(path, profile);
        Ok(())
    }

    /// Look up the override for `path` (exact match only)
    pub fn lookup(&self, path: &str) -> Option<&CompilerProfile> {
        self.entries.get(path)
    }

    /// Overridden paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
