//! Resolved build plan and compile batches

use crate::error::BuildResult;
use crate::profile::CompilerProfile;
use crate::resolver::{PathResolver, ProfileSource, ResolvedProfile};
use crate::sources::SourceFile;
use serde::Serialize;
use std::collections::BTreeMap;

/// Every discovered source file mapped to exactly one profile
///
/// Computed once at the start of a run and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ResolvedBuildPlan {
    entries: BTreeMap<String, ResolvedProfile>,
}

impl ResolvedBuildPlan {
    /// Resolve every file, failing on the first file with no usable profile
    pub fn resolve(resolver: &PathResolver<'_>, sources: &[SourceFile]) -> BuildResult<Self> {
        let mut entries = BTreeMap::new();
        for source in sources {
            let resolved = resolver.resolve_source(&source.key, &source.content)?;
            entries.insert(source.key.clone(), resolved);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, path: &str) -> Option<&ResolvedProfile> {
        self.entries.get(path)
    }

    /// Entries sorted by path
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedProfile)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Group files into one batch per distinct profile hash
    ///
    /// Batches are ordered by hash and files within a batch by path, so the
    /// result is identical for identical inputs.
    pub fn batches(&self) -> Vec<CompileBatch> {
        let mut grouped: BTreeMap<String, CompileBatch> = BTreeMap::new();
        for (path, resolved) in &self.entries {
            let hash = resolved.profile.hash();
            grouped
                .entry(hash.clone())
                .or_insert_with(|| CompileBatch {
                    id: hash,
                    profile: resolved.profile.clone(),
                    files: Vec::new(),
                })
                .files
                .push(path.clone());
        }
        grouped.into_values().collect()
    }

    /// Serializable view for `kiln plan`
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            files: self
                .entries
                .iter()
                .map(|(path, resolved)| PlanEntry {
                    path: path.clone(),
                    profile: resolved.profile.to_string(),
                    profile_hash: resolved.profile.hash(),
                    source: resolved.source,
                })
                .collect(),
            batches: self
                .batches()
                .into_iter()
                .map(|b| BatchSummary {
                    id: b.id,
                    profile: b.profile.to_string(),
                    files: b.files,
                })
                .collect(),
        }
    }
}

/// Files that compile together under one profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileBatch {
    /// Hash of `profile`
    pub id: String,
    pub profile: CompilerProfile,
    /// Source keys, sorted
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub files: Vec<PlanEntry>,
    pub batches: Vec<BatchSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub path: String,
    pub profile: String,
    pub profile_hash: String,
    pub source: ProfileSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub id: String,
    pub profile: String,
    pub files: Vec<String>,
}
