//! Cache namespace allocation

use crate::cache::lock::CacheLock;
use crate::error::{BuildError, BuildResult};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::debug;

/// Identity of whoever claimed a cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
struct Claimant {
    tool: String,
    sources_root: PathBuf,
}

impl fmt::Display for Claimant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tool '{}' (sources {})", self.tool, self.sources_root.display())
    }
}

/// Hands out cache directories and remembers who owns each one
///
/// Claims live as long as the manager. Share one manager per process so that
/// two differently configured builds cannot write into the same directory.
#[derive(Debug)]
pub struct CacheNamespaceManager {
    base_dir: PathBuf,
    claims: Mutex<HashMap<PathBuf, Claimant>>,
}

impl CacheNamespaceManager {
    /// Create a manager that derives directories under `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            claims: Mutex::new(HashMap::new()),
        }
    }

    /// The manager every builder for `base_dir` shares in this process
    pub fn shared(base_dir: impl AsRef<Path>) -> Arc<Self> {
        static MANAGERS: OnceLock<Mutex<HashMap<PathBuf, Arc<CacheNamespaceManager>>>> =
            OnceLock::new();

        let base_dir = base_dir.as_ref();
        let mut managers = MANAGERS
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        managers
            .entry(normalize(base_dir))
            .or_insert_with(|| Arc::new(Self::new(base_dir)))
            .clone()
    }

    /// Directory a tool gets when no explicit cache directory is configured
    pub fn default_path(&self, tool: &str) -> PathBuf {
        self.base_dir.join(format!("cache_{}", tool))
    }

    /// Allocate the derived namespace for `tool`
    ///
    /// Distinct tool names always get distinct directories, even when they
    /// share `sources_root`.
    pub fn allocate(&self, tool: &str, sources_root: &Path) -> BuildResult<CacheNamespace> {
        let path = self.default_path(tool);
        self.claim(tool, sources_root, path)
    }

    /// Claim an explicit cache directory for `tool`
    ///
    /// Re-claiming by the same tool and sources root returns the same
    /// namespace; anyone else gets `CacheConflict`.
    pub fn claim(
        &self,
        tool: &str,
        sources_root: &Path,
        path: impl Into<PathBuf>,
    ) -> BuildResult<CacheNamespace> {
        let path = path.into();
        let key = normalize(&path);
        let claimant = Claimant {
            tool: tool.to_string(),
            sources_root: normalize(sources_root),
        };

        let mut claims = self
            .claims
            .lock()
            .map_err(|_| BuildError::BuildFailed("cache claim table poisoned".to_string()))?;

        match claims.get(&key) {
            Some(holder) if *holder != claimant => {
                return Err(BuildError::CacheConflict {
                    path,
                    holder: holder.to_string(),
                    claimant: claimant.to_string(),
                });
            }
            Some(_) => {}
            None => {
                debug!(path = %path.display(), tool, "claimed cache namespace");
                claims.insert(key, claimant);
            }
        }

        Ok(CacheNamespace {
            root: path,
            tool: tool.to_string(),
        })
    }

    /// Number of claimed directories
    pub fn claimed(&self) -> usize {
        self.claims.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// An allocated cache directory and its layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNamespace {
    root: PathBuf,
    tool: String,
}

impl CacheNamespace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Directory holding all compiled artifacts
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    /// Directory for one source file compiled under one profile
    pub fn artifact_dir(&self, source_path: &str, profile_hash: &str) -> PathBuf {
        let mut dir = self.artifacts_dir();
        for segment in source_path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            dir.push(segment);
        }
        dir.join(profile_hash)
    }

    /// Validation report location
    pub fn report_path(&self) -> PathBuf {
        self.root.join("validation-report.json")
    }

    /// Build summary location
    pub fn build_info_path(&self) -> PathBuf {
        self.root.join("build-info.json")
    }

    /// Remove the reports a previous run left behind
    ///
    /// A run that ends fatally must not leave an older `build-info.json`
    /// describing a build that no longer matches the cache.
    pub fn clear_run_reports(&self) -> BuildResult<()> {
        for path in [self.report_path(), self.build_info_path()] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed stale report"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(BuildError::io(path, e)),
            }
        }
        Ok(())
    }

    /// Acquire the run-scoped exclusive lock
    pub fn lock(&self) -> BuildResult<CacheLock> {
        CacheLock::acquire(&self.root)
    }
}

/// Lexical normalization so `a/./b` and `a/b` claim the same directory
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
