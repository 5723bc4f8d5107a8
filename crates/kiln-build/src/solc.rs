//! `solc --standard-json` compiler backend

use crate::artifacts::CompiledContract;
use crate::stages::{CompileFailure, CompileJob, CompilerBackend};
use kiln_config::CompilerCommandConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// Placeholder in the configured command replaced by the profile version
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Runs an external solc binary once per batch
#[derive(Debug, Clone)]
pub struct SolcCommand {
    command: String,
    args: Vec<String>,
    remappings: Vec<String>,
}

impl SolcCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            remappings: Vec::new(),
        }
    }

    pub fn from_config(config: &CompilerCommandConfig, remappings: &[String]) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            remappings: remappings.to_vec(),
        }
    }

    /// Remappings the compiler applies to files it reads from disk
    pub fn with_remappings(mut self, remappings: Vec<String>) -> Self {
        self.remappings = remappings;
        self
    }

    /// Program to run for `job`
    pub fn program(&self, job: &CompileJob<'_>) -> String {
        self.command
            .replace(VERSION_PLACEHOLDER, &job.profile.version().to_string())
    }

    /// Standard-json input for a batch
    ///
    /// Batch files and the discovered files they import are passed inline
    /// with their preprocessed text. Anything else is read from disk by the
    /// compiler relative to the project root. Output is only requested for
    /// the batch's own files.
    pub fn standard_json(&self, job: &CompileJob<'_>) -> Value {
        let mut sources = serde_json::Map::new();
        for source in job.inline_sources() {
            sources.insert(source.key.clone(), json!({ "content": source.content }));
        }
        let mut selection = serde_json::Map::new();
        for source in &job.sources {
            selection.insert(
                source.key.clone(),
                json!({ "*": ["abi", "evm.bytecode.object", "evm.deployedBytecode.object"] }),
            );
        }

        let profile = job.profile;
        let optimizer = profile.optimizer();
        json!({
            "language": "Solidity",
            "sources": sources,
            "settings": {
                "viaIR": profile.via_ir(),
                "optimizer": {
                    "enabled": optimizer.enabled,
                    "runs": optimizer.runs,
                },
                "metadata": {
                    "bytecodeHash": profile.metadata().bytecode_hash(),
                },
                "remappings": self.remappings,
                "outputSelection": selection,
            }
        })
    }

    fn run(&self, job: &CompileJob<'_>, input: &[u8]) -> Result<Vec<u8>, CompileFailure> {
        let program = self.program(job);
        let root = job.base_path.to_string_lossy().into_owned();
        debug!(program = %program, batch = job.batch_id, "invoking compiler");

        let mut child = Command::new(&program)
            .args(&self.args)
            .arg("--standard-json")
            .arg("--base-path")
            .arg(&root)
            .arg("--allow-paths")
            .arg(&root)
            .current_dir(job.base_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CompileFailure::new(format!("failed to start {}: {}", program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .map_err(|e| CompileFailure::new(format!("failed to write compiler input: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| CompileFailure::new(format!("compiler did not finish: {}", e)))?;

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CompileFailure::new(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

impl CompilerBackend for SolcCommand {
    fn compile(&self, job: &CompileJob<'_>) -> Result<Vec<CompiledContract>, CompileFailure> {
        let input = serde_json::to_vec(&self.standard_json(job))
            .map_err(|e| CompileFailure::new(format!("failed to encode compiler input: {}", e)))?;
        let stdout = self.run(job, &input)?;
        parse_output(&stdout, job)
    }
}

#[derive(Debug, Deserialize)]
struct SolcOutput {
    #[serde(default)]
    errors: Vec<SolcDiagnostic>,
    #[serde(default)]
    contracts: BTreeMap<String, BTreeMap<String, SolcContract>>,
}

#[derive(Debug, Deserialize)]
struct SolcDiagnostic {
    severity: String,
    #[serde(default)]
    message: String,
    #[serde(default, rename = "formattedMessage")]
    formatted_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SolcContract {
    #[serde(default)]
    abi: Value,
    #[serde(default)]
    evm: SolcEvm,
}

#[derive(Debug, Default, Deserialize)]
struct SolcEvm {
    #[serde(default)]
    bytecode: SolcBytecode,
    #[serde(default, rename = "deployedBytecode")]
    deployed_bytecode: SolcBytecode,
}

#[derive(Debug, Default, Deserialize)]
struct SolcBytecode {
    #[serde(default)]
    object: String,
}

fn decode_bytecode(id: &str, object: &str) -> Result<Vec<u8>, String> {
    if object.contains("__$") {
        return Err(format!("{} has unlinked library references", id));
    }
    hex::decode(object.trim_start_matches("0x"))
        .map_err(|e| format!("{} has malformed bytecode: {}", id, e))
}

/// Turn compiler output into contracts for the batch's own files
///
/// Any diagnostic with severity `error` fails the whole batch.
fn parse_output(stdout: &[u8], job: &CompileJob<'_>) -> Result<Vec<CompiledContract>, CompileFailure> {
    let output: SolcOutput = serde_json::from_slice(stdout)
        .map_err(|e| CompileFailure::new(format!("unreadable compiler output: {}", e)))?;

    let errors: Vec<String> = output
        .errors
        .iter()
        .filter(|d| d.severity == "error")
        .map(|d| d.formatted_message.clone().unwrap_or_else(|| d.message.clone()))
        .collect();
    if !errors.is_empty() {
        return Err(CompileFailure {
            diagnostics: errors,
        });
    }

    let mut contracts = Vec::new();
    let mut problems = Vec::new();
    for (path, declared) in output.contracts {
        if !job.contains(&path) {
            continue;
        }
        for (name, contract) in declared {
            let id = format!("{}:{}", path, name);
            let bytecode = decode_bytecode(&id, &contract.evm.bytecode.object);
            let deployed = decode_bytecode(&id, &contract.evm.deployed_bytecode.object);
            match (bytecode, deployed) {
                (Ok(bytecode), Ok(deployed_bytecode)) => contracts.push(CompiledContract {
                    source_path: path.clone(),
                    name,
                    abi: contract.abi,
                    bytecode,
                    deployed_bytecode,
                }),
                (Err(e), _) | (_, Err(e)) => problems.push(e),
            }
        }
    }

    if !problems.is_empty() {
        return Err(CompileFailure {
            diagnostics: problems,
        });
    }
    Ok(contracts)
}
