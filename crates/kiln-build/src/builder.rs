//! Build orchestration and pipeline management
//!
//! A run moves through `Preprocess -> Compile -> Validate -> GenerateArtifacts`
//! exactly once. Preprocess and Validate are barriers: every file is
//! preprocessed before any batch compiles, and every batch has finished
//! before validation looks at the artifact set.

use crate::artifacts::{ArtifactFiles, ArtifactMetadata, CompiledContract};
use crate::cache::{CacheNamespace, CacheNamespaceManager};
use crate::error::{BuildError, BuildResult};
use crate::interface::render_interface;
use crate::plan::{CompileBatch, ResolvedBuildPlan};
use crate::settings::BuildSettings;
use crate::sources::{discover_sources, SourceFile};
use crate::stages::{
    ArtifactWriter, CompileFailure, CompileJob, CompilerBackend, FsArtifactWriter, Preprocessor,
};
use crate::validation::{self, ValidationReport};

use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Preprocess,
    Compile,
    Validate,
    GenerateArtifacts,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preprocess => write!(f, "preprocess"),
            Self::Compile => write!(f, "compile"),
            Self::Validate => write!(f, "validate"),
            Self::GenerateArtifacts => write!(f, "generate-artifacts"),
        }
    }
}

/// Run-level cancellation signal
///
/// Clones share the same flag. Batches check it before starting and after
/// finishing.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Terminal state of a run that was not fatal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Success,
    /// At least one compile batch failed
    PartialFailure,
}

/// Outcome of one compile batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum BatchOutcome {
    Compiled { contracts: usize },
    Failed { diagnostics: Vec<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub id: String,
    pub profile: String,
    pub files: Vec<String>,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Failed { .. })
    }
}

/// Build statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    /// Number of discovered source files
    pub sources: usize,
    /// Number of compile batches
    pub batches: usize,
    /// Number of batches that failed
    pub failed_batches: usize,
    /// Number of contracts compiled
    pub contracts: usize,
    /// Number of files written by the artifact stage
    pub files_written: usize,
    /// Total build time
    pub total_time: Duration,
    /// Wall time of the compile stage
    pub compilation_time: Duration,
}

/// Result of a run that reached `Success` or `PartialFailure`
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub status: RunStatus,
    pub network: String,
    pub cache_dir: PathBuf,
    pub batches: Vec<BatchReport>,
    pub validation: ValidationReport,
    pub artifacts: Vec<ArtifactMetadata>,
    pub stats: BuildStats,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchReport> {
        self.batches.iter().filter(|b| b.is_failed())
    }
}

/// Contents of `build-info.json`
#[derive(Debug, Serialize)]
struct BuildInfo<'a> {
    tool: &'a str,
    status: RunStatus,
    network: &'a str,
    batches: &'a [BatchReport],
    artifacts: &'a [ArtifactMetadata],
}

enum BatchResult {
    Compiled(Vec<CompiledContract>),
    Failed(CompileFailure),
    /// Skipped or discarded because the run was cancelled
    Cancelled,
}

/// Main builder for orchestrating builds
pub struct Builder {
    settings: BuildSettings,
    backend: Box<dyn CompilerBackend>,
    preprocessors: Vec<Box<dyn Preprocessor>>,
    writer: Box<dyn ArtifactWriter>,
    namespaces: Arc<CacheNamespaceManager>,
    cancellation: CancellationToken,
    jobs: usize,
}

impl Builder {
    /// Create a builder for validated settings and a compiler backend
    pub fn new(settings: BuildSettings, backend: impl CompilerBackend + 'static) -> Self {
        let namespaces = CacheNamespaceManager::shared(&settings.paths.project_root);
        let jobs = settings.jobs;
        Self {
            settings,
            backend: Box::new(backend),
            preprocessors: Vec::new(),
            writer: Box::new(FsArtifactWriter),
            namespaces,
            cancellation: CancellationToken::new(),
            jobs,
        }
    }

    /// Add a preprocessor, run after the configured remappings
    pub fn with_preprocessor(mut self, preprocessor: impl Preprocessor + 'static) -> Self {
        self.preprocessors.push(Box::new(preprocessor));
        self
    }

    /// Replace the artifact writer
    pub fn with_artifact_writer(mut self, writer: impl ArtifactWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    /// Share a cancellation token with the caller
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Share cache namespace claims with other builders in this process
    pub fn with_namespace_manager(mut self, namespaces: Arc<CacheNamespaceManager>) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Set the number of parallel compile workers
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Cache namespace this builder writes to
    pub fn namespace(&self) -> BuildResult<CacheNamespace> {
        let paths = &self.settings.paths;
        match &paths.cache_root {
            Some(cache) => self
                .namespaces
                .claim(&self.settings.tool, &paths.sources_root, cache.clone()),
            None => self
                .namespaces
                .allocate(&self.settings.tool, &paths.sources_root),
        }
    }

    /// Discover sources and resolve the build plan without compiling
    pub fn plan(&self) -> BuildResult<(Vec<SourceFile>, ResolvedBuildPlan)> {
        let paths = &self.settings.paths;
        let sources = discover_sources(&paths.project_root, &paths.sources_root)?;
        if sources.is_empty() {
            return Err(BuildError::SourceDiscovery {
                path: paths.sources_root.clone(),
                reason: "no .sol files found".to_string(),
            });
        }
        let plan = ResolvedBuildPlan::resolve(&self.settings.resolver(), &sources)?;
        Ok((sources, plan))
    }

    /// Execute the build
    ///
    /// Fatal outcomes come back as `Err`; `Ok` carries `Success` or
    /// `PartialFailure`. The cache lock is held for the whole call.
    pub fn build(&self) -> BuildResult<BuildReport> {
        let build_start = Instant::now();
        let namespace = self.namespace()?;
        let _lock = namespace.lock()?;
        namespace.clear_run_reports()?;

        info!(
            tool = %self.settings.tool,
            network = %self.settings.network.name,
            cache = %namespace.root().display(),
            "starting build"
        );

        let (mut sources, plan) = self.plan()?;
        let batches = plan.batches();
        debug!(sources = sources.len(), batches = batches.len(), "resolved build plan");

        self.enter(Stage::Preprocess)?;
        self.preprocess(&mut sources)?;

        self.enter(Stage::Compile)?;
        let compile_start = Instant::now();
        let results = self.compile(&batches, &sources)?;
        let compilation_time = compile_start.elapsed();

        let mut batch_reports = Vec::with_capacity(batches.len());
        let mut compiled: Vec<(&CompileBatch, Vec<CompiledContract>)> = Vec::new();
        for (batch, result) in batches.iter().zip(results) {
            let outcome = match result {
                BatchResult::Compiled(contracts) => {
                    let outcome = BatchOutcome::Compiled {
                        contracts: contracts.len(),
                    };
                    compiled.push((batch, contracts));
                    outcome
                }
                BatchResult::Failed(failure) => {
                    warn!(
                        batch = %batch.id,
                        profile = %batch.profile,
                        files = ?batch.files,
                        "compile batch failed"
                    );
                    BatchOutcome::Failed {
                        diagnostics: failure.diagnostics,
                    }
                }
                BatchResult::Cancelled => return Err(BuildError::Cancelled),
            };
            batch_reports.push(BatchReport {
                id: batch.id.clone(),
                profile: batch.profile.to_string(),
                files: batch.files.clone(),
                outcome,
            });
        }

        self.enter(Stage::Validate)?;
        let report = validation::validate(
            compiled.iter().flat_map(|(_, contracts)| contracts.iter()),
            &self.settings.network,
        );
        let mut files_written = self.write_json(&namespace.report_path(), &report)?;
        if report.has_failures() {
            return Err(BuildError::SizeLimitExceeded {
                network: report.network.clone(),
                limit: self.settings.network.max_artifact_size,
                offenders: report.offenders(),
                report: Box::new(report),
            });
        }

        self.enter(Stage::GenerateArtifacts)?;
        let mut artifacts = Vec::new();
        for (batch, contracts) in &compiled {
            for contract in contracts {
                files_written += self.write_contract(&namespace, batch, contract)?;
                artifacts.push(ArtifactMetadata::new(
                    contract,
                    &batch.id,
                    &batch.profile.version().to_string(),
                ));
            }
        }

        let failed_batches = batch_reports.iter().filter(|b| b.is_failed()).count();
        let status = if failed_batches > 0 {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        };

        let info = BuildInfo {
            tool: &self.settings.tool,
            status,
            network: &self.settings.network.name,
            batches: &batch_reports,
            artifacts: &artifacts,
        };
        files_written += self.write_json(&namespace.build_info_path(), &info)?;

        let stats = BuildStats {
            sources: sources.len(),
            batches: batch_reports.len(),
            failed_batches,
            contracts: artifacts.len(),
            files_written,
            total_time: build_start.elapsed(),
            compilation_time,
        };

        info!(
            status = ?status,
            batches = stats.batches,
            failed = stats.failed_batches,
            contracts = stats.contracts,
            elapsed_ms = stats.total_time.as_millis() as u64,
            "build finished"
        );

        Ok(BuildReport {
            status,
            network: self.settings.network.name.clone(),
            cache_dir: namespace.root().to_path_buf(),
            batches: batch_reports,
            validation: report,
            artifacts,
            stats,
        })
    }

    fn enter(&self, stage: Stage) -> BuildResult<()> {
        if self.cancellation.is_cancelled() {
            debug!(%stage, "cancelled before stage");
            return Err(BuildError::Cancelled);
        }
        debug!(%stage, "entering stage");
        Ok(())
    }

    fn preprocess(&self, sources: &mut [SourceFile]) -> BuildResult<()> {
        let remapper = self.settings.remapping_preprocessor()?;
        let hooks: Vec<&dyn Preprocessor> = remapper
            .as_ref()
            .map(|r| r as &dyn Preprocessor)
            .into_iter()
            .chain(self.preprocessors.iter().map(|p| p.as_ref()))
            .collect();

        if hooks.is_empty() {
            debug!("no preprocessors configured");
            return Ok(());
        }

        for source in sources.iter_mut() {
            for hook in &hooks {
                match hook.preprocess(source) {
                    Ok(Some(content)) => {
                        debug!(hook = hook.name(), path = %source.key, "preprocessed");
                        source.content = content;
                    }
                    Ok(None) => {}
                    Err(e) => return Err(BuildError::preprocess(hook.name(), &source.key, e)),
                }
            }
        }
        Ok(())
    }

    fn compile(
        &self,
        batches: &[CompileBatch],
        sources: &[SourceFile],
    ) -> BuildResult<Vec<BatchResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| BuildError::BuildFailed(format!("failed to start compile workers: {}", e)))?;

        let results = pool.install(|| {
            batches
                .par_iter()
                .map(|batch| self.compile_batch(batch, sources))
                .collect::<Vec<_>>()
        });

        if self.cancellation.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        Ok(results)
    }

    fn compile_batch(&self, batch: &CompileBatch, sources: &[SourceFile]) -> BatchResult {
        if self.cancellation.is_cancelled() {
            debug!(batch = %batch.id, "skipping batch, run cancelled");
            return BatchResult::Cancelled;
        }

        let job = CompileJob {
            batch_id: &batch.id,
            profile: &batch.profile,
            sources: sources
                .iter()
                .filter(|s| batch.files.binary_search(&s.key).is_ok())
                .collect(),
            all_sources: sources,
            base_path: &self.settings.paths.project_root,
        };

        debug!(batch = %batch.id, profile = %batch.profile, files = batch.files.len(), "compiling batch");
        let result = self.backend.compile(&job);

        if self.cancellation.is_cancelled() {
            debug!(batch = %batch.id, "discarding batch output, run cancelled");
            return BatchResult::Cancelled;
        }

        match result {
            Ok(contracts) => BatchResult::Compiled(contracts),
            Err(failure) => BatchResult::Failed(failure),
        }
    }

    /// Write every file for one contract, returning how many were written
    fn write_contract(
        &self,
        namespace: &CacheNamespace,
        batch: &CompileBatch,
        contract: &CompiledContract,
    ) -> BuildResult<usize> {
        let dir = namespace.artifact_dir(&contract.source_path, &batch.id);
        let files = ArtifactFiles::for_contract(&contract.name);
        let retry = self.settings.retry;
        let writer = self.writer.as_ref();

        let abi = serde_json::to_vec_pretty(&contract.abi)
            .map_err(|e| BuildError::BuildFailed(format!("failed to encode ABI: {}", e)))?;
        retry.write(writer, &dir.join(&files.abi), &abi)?;
        retry.write(
            writer,
            &dir.join(&files.bytecode),
            hex::encode(&contract.bytecode).as_bytes(),
        )?;
        retry.write(
            writer,
            &dir.join(&files.deployed_bytecode),
            hex::encode(&contract.deployed_bytecode).as_bytes(),
        )?;
        let mut written = 3;

        if self.settings.interfaces {
            match render_interface(&contract.name, &contract.abi, batch.profile.version()) {
                Ok(source) => {
                    retry.write(writer, &dir.join(&files.interface), source.as_bytes())?;
                    written += 1;
                }
                Err(e) => warn!(artifact = %contract.id(), error = %e, "skipping interface"),
            }
        }

        debug!(artifact = %contract.id(), dir = %dir.display(), "wrote artifacts");
        Ok(written)
    }

    fn write_json<T: Serialize>(&self, path: &std::path::Path, value: &T) -> BuildResult<usize> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| BuildError::BuildFailed(format!("failed to encode {}: {}", path.display(), e)))?;
        self.settings.retry.write(self.writer.as_ref(), path, &bytes)?;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::Preprocess < Stage::Compile);
        assert!(Stage::Compile < Stage::Validate);
        assert!(Stage::Validate < Stage::GenerateArtifacts);
        assert_eq!(Stage::GenerateArtifacts.to_string(), "generate-artifacts");
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_build_stats_default() {
        let stats = BuildStats::default();
        assert_eq!(stats.batches, 0);
        assert_eq!(stats.total_time, Duration::ZERO);
    }

    #[test]
    fn test_batch_outcome_json() {
        let report = BatchReport {
            id: "abc".to_string(),
            profile: "0.8.18 no-opt".to_string(),
            files: vec!["src/A.sol".to_string()],
            outcome: BatchOutcome::Failed {
                diagnostics: vec!["boom".to_string()],
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["diagnostics"][0], "boom");
        assert!(report.is_failed());
    }
}
