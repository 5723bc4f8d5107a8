//! Source path to compiler profile resolution
//!
//! An exact override always wins. Files without one take the registry's
//! default, scoped by the file's own `pragma solidity` constraint when it
//! declares one.

use crate::error::BuildResult;
use crate::overrides::OverrideTable;
use crate::pragma::VersionConstraint;
use crate::profile::{CompilerProfile, ProfileRegistry};
use serde::Serialize;
use tracing::{debug, warn};

/// Where a resolved profile came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileSource {
    /// Path-specific override
    Override,
    /// Global default from the registry
    Default,
}

/// The effective profile for one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub profile: CompilerProfile,
    pub source: ProfileSource,
}

impl ResolvedProfile {
    pub fn is_override(&self) -> bool {
        self.source == ProfileSource::Override
    }
}

/// Maps source paths to profiles
///
/// Holds shared references only; resolution is a pure function of the path,
/// the constraint and the two tables.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    registry: &'a ProfileRegistry,
    overrides: &'a OverrideTable,
}

impl<'a> PathResolver<'a> {
    /// Create a resolver over the given tables
    pub fn new(registry: &'a ProfileRegistry, overrides: &'a OverrideTable) -> Self {
        Self {
            registry,
            overrides,
        }
    }

    /// Resolve the profile for `path`
    pub fn resolve(
        &self,
        path: &str,
        constraint: Option<&VersionConstraint>,
    ) -> BuildResult<ResolvedProfile> {
        if let Some(profile) = self.overrides.lookup(path) {
            if let Some(constraint) = constraint {
                if !constraint.matches(profile.version()) {
                    warn!(
                        path,
                        version = %profile.version(),
                        pragma = %constraint,
                        "override compiler version does not satisfy the source pragma"
                    );
                }
            }
            debug!(path, profile = %profile, "resolved from override");
            return Ok(ResolvedProfile {
                profile: profile.clone(),
                source: ProfileSource::Override,
            });
        }

        let profile = self
            .registry
            .get_default(constraint)
            .map_err(|e| e.for_path(path))?;
        debug!(path, profile = %profile, "resolved from defaults");

        Ok(ResolvedProfile {
            profile: profile.clone(),
            source: ProfileSource::Default,
        })
    }

    /// Resolve using the constraint declared in the file's source text
    pub fn resolve_source(&self, path: &str, content: &str) -> BuildResult<ResolvedProfile> {
        let constraint = VersionConstraint::from_source(content);
        self.resolve(path, constraint.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use crate::profile::OptimizerSettings;

    fn tables() -> (ProfileRegistry, OverrideTable) {
        let mut registry = ProfileRegistry::new();
        registry.insert(
            CompilerProfile::parse("0.8.18")
                .unwrap()
                .with_optimizer(OptimizerSettings::enabled(1_000_000)),
        );

        let mut overrides = OverrideTable::new();
        overrides
            .add_override(
                "src/A.sol",
                CompilerProfile::parse("0.8.18")
                    .unwrap()
                    .with_optimizer(OptimizerSettings::enabled(200)),
            )
            .unwrap();

        (registry, overrides)
    }

    #[test]
    fn test_override_wins() {
        let (registry, overrides) = tables();
        let resolver = PathResolver::new(&registry, &overrides);

        let a = resolver.resolve("src/A.sol", None).unwrap();
        assert_eq!(a.profile.optimizer().runs, 200);
        assert!(a.is_override());

        let b = resolver.resolve("src/B.sol", None).unwrap();
        assert_eq!(b.profile.optimizer().runs, 1_000_000);
        assert_eq!(b.source, ProfileSource::Default);
    }

    #[test]
    fn test_field_identical_override_still_reported_as_override() {
        let (registry, mut overrides) = tables();
        let default = registry.get_default(None).unwrap().clone();
        overrides.add_override("src/Same.sol", default.clone()).unwrap();

        let resolver = PathResolver::new(&registry, &overrides);
        let resolved = resolver.resolve("src/Same.sol", None).unwrap();
        assert_eq!(resolved.profile, default);
        assert_eq!(resolved.source, ProfileSource::Override);
    }

    #[test]
    fn test_override_ignores_pragma_mismatch() {
        let (registry, overrides) = tables();
        let resolver = PathResolver::new(&registry, &overrides);
        let constraint = VersionConstraint::parse("^0.7.0").unwrap();

        let resolved = resolver.resolve("src/A.sol", Some(&constraint)).unwrap();
        assert!(resolved.is_override());
    }

    #[test]
    fn test_missing_default_names_path() {
        let (registry, overrides) = tables();
        let resolver = PathResolver::new(&registry, &overrides);

        let err = resolver
            .resolve_source("src/Old.sol", "pragma solidity ^0.6.0;\n")
            .unwrap_err();
        match err {
            BuildError::NoCompatibleProfile { path, .. } => {
                assert_eq!(path.as_deref(), Some("src/Old.sol"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
