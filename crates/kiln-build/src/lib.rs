//! Kiln build system
//!
//! Resolves a compiler profile for every source file of a Solidity project
//! and drives the build pipeline over the result:
//! - Compiler profiles and the registry of global defaults
//! - Exact-path profile overrides
//! - Inline `pragma solidity` constraints
//! - Network profiles and artifact size validation
//! - Per-tool cache namespaces with a run-scoped lock
//! - Parallel compile batches, one per distinct profile
//! - Artifact and interface generation
//!
//! # Example
//!
//! ```no_run
//! use kiln_build::{BuildSettings, Builder, SolcCommand};
//! use kiln_config::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::new().load_from_directory(Path::new(".")).unwrap();
//! let settings = BuildSettings::from_config(&config, None).unwrap();
//! let solc = SolcCommand::from_config(&settings.compiler, &settings.remappings);
//! let report = Builder::new(settings, solc).build().unwrap();
//! println!("{:?}", report.status);
//! ```

pub mod artifacts;
pub mod builder;
pub mod cache;
pub mod environment;
pub mod error;
pub mod interface;
pub mod overrides;
pub mod plan;
pub mod pragma;
pub mod profile;
pub mod resolver;
pub mod settings;
pub mod solc;
pub mod sources;
pub mod stages;
pub mod validation;

// Re-export main types
pub use artifacts::{ArtifactFiles, ArtifactMetadata, CompiledContract};
pub use builder::{
    BatchOutcome, BatchReport, BuildReport, BuildStats, Builder, CancellationToken, RunStatus,
    Stage,
};
pub use cache::{CacheLock, CacheNamespace, CacheNamespaceManager, LOCK_FILE_NAME};
pub use environment::{EnvironmentSelector, NetworkProfile, DEFAULT_SIZE_LIMIT, LOCAL_NETWORK};
pub use error::{BuildError, BuildResult};
pub use interface::render_interface;
pub use overrides::OverrideTable;
pub use plan::{CompileBatch, PlanSummary, ResolvedBuildPlan};
pub use pragma::VersionConstraint;
pub use profile::{CompilerProfile, MetadataPolicy, OptimizerSettings, ProfileRegistry};
pub use resolver::{PathResolver, ProfileSource, ResolvedProfile};
pub use settings::{BuildSettings, PathConfig};
pub use solc::SolcCommand;
pub use sources::{discover_sources, normalize_source_key, SourceFile};
pub use stages::{
    ArtifactWriter, CompileFailure, CompileJob, CompilerBackend, FsArtifactWriter, Preprocessor,
    RemappingPreprocessor, RetryPolicy,
};
pub use validation::{ValidationRecord, ValidationReport, Verdict};
