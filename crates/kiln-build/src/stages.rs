//! Pipeline stage hooks
//!
//! The orchestrator only knows these traits. The compiler, the source
//! transformations and the storage behind artifact writes are all plugged in
//! from outside.

use crate::artifacts::CompiledContract;
use crate::error::{BuildError, BuildResult};
use crate::profile::CompilerProfile;
use crate::sources::{normalize_source_key, SourceFile};
use kiln_config::ConfigError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Source transformation run before compilation
pub trait Preprocessor: Send + Sync {
    /// Name used in errors and logs
    fn name(&self) -> &str;

    /// Transform one file
    ///
    /// `Ok(None)` leaves the file untouched. An error aborts the run.
    fn preprocess(&self, source: &SourceFile) -> Result<Option<String>, String>;
}

/// Input for one compile batch
#[derive(Debug, Clone)]
pub struct CompileJob<'a> {
    /// Batch identifier (the profile hash)
    pub batch_id: &'a str,
    pub profile: &'a CompilerProfile,
    /// Files in the batch, preprocessed
    pub sources: Vec<&'a SourceFile>,
    /// Every discovered file, for import resolution
    pub all_sources: &'a [SourceFile],
    /// Project root
    pub base_path: &'a Path,
}

impl<'a> CompileJob<'a> {
    /// Whether `key` is one of the batch's own files
    pub fn contains(&self, key: &str) -> bool {
        self.sources.iter().any(|s| s.key == key)
    }

    /// Batch files followed by every discovered file they import, transitively
    ///
    /// Imports outside the discovered set are left for the compiler to read.
    pub fn inline_sources(&self) -> Vec<&'a SourceFile> {
        let by_key: HashMap<&'a str, &'a SourceFile> = self
            .all_sources
            .iter()
            .map(|s| (s.key.as_str(), s))
            .collect();
        let mut seen: BTreeSet<&'a str> = self.sources.iter().map(|s| s.key.as_str()).collect();
        let mut queue = self.sources.clone();
        let mut inline = self.sources.clone();

        while let Some(source) = queue.pop() {
            for import in import_paths(&source.content) {
                let key = resolve_import(&source.key, &import);
                if let Some(&dep) = by_key.get(key.as_str()) {
                    if seen.insert(dep.key.as_str()) {
                        queue.push(dep);
                        inline.push(dep);
                    }
                }
            }
        }
        inline
    }
}

/// Source key an import refers to, relative imports resolved against `importer`
fn resolve_import(importer: &str, import: &str) -> String {
    if !(import.starts_with("./") || import.starts_with("../")) {
        return normalize_source_key(import);
    }
    let mut parts: Vec<&str> = importer.split('/').collect();
    parts.pop();
    for segment in import.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// A compile batch that did not produce artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    pub diagnostics: Vec<String>,
}

impl CompileFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            diagnostics: vec![message.into()],
        }
    }
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diagnostics.join("\n"))
    }
}

/// The compiler behind the Compile stage
pub trait CompilerBackend: Send + Sync {
    /// Compile one batch, returning the contracts declared in its files
    fn compile(&self, job: &CompileJob<'_>) -> Result<Vec<CompiledContract>, CompileFailure>;
}

/// Storage behind the GenerateArtifacts stage
pub trait ArtifactWriter: Send + Sync {
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Writes artifacts to the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactWriter;

impl ArtifactWriter for FsArtifactWriter {
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }
}

/// Fixed-delay retry for artifact writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub count: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_COUNT: u32 = 3;
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

    pub fn new(count: u32, delay: Duration) -> Self {
        Self { count, delay }
    }

    /// Fail on the first error
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Write `contents`, retrying transient failures
    pub fn write(
        &self,
        writer: &dyn ArtifactWriter,
        path: &Path,
        contents: &[u8],
    ) -> BuildResult<()> {
        let attempts = self.count.saturating_add(1);
        let mut attempt = 1;
        loop {
            match writer.write(path, contents) {
                Ok(()) => return Ok(()),
                Err(error) if attempt >= attempts => {
                    return Err(BuildError::ArtifactWriteFailed {
                        path: path.to_path_buf(),
                        attempts,
                        error,
                    });
                }
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        attempt,
                        error = %error,
                        "artifact write failed, retrying"
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COUNT, Self::DEFAULT_DELAY)
    }
}

/// Rewrites import paths using `prefix=target` remappings
///
/// The longest matching prefix wins.
#[derive(Debug, Clone, Default)]
pub struct RemappingPreprocessor {
    remappings: Vec<(String, String)>,
}

impl RemappingPreprocessor {
    /// Parse `prefix=target` entries
    pub fn parse(entries: &[String]) -> BuildResult<Self> {
        let mut remappings = Vec::with_capacity(entries.len());
        for entry in entries {
            let (prefix, target) = entry
                .split_once('=')
                .filter(|(prefix, _)| !prefix.is_empty())
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "preprocess.remappings".to_string(),
                    reason: format!("'{}' is not of the form prefix=target", entry),
                })?;
            remappings.push((prefix.to_string(), target.to_string()));
        }
        remappings.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(Self { remappings })
    }

    pub fn is_empty(&self) -> bool {
        self.remappings.is_empty()
    }

    fn remap(&self, import: &str) -> Option<String> {
        self.remappings
            .iter()
            .find(|(prefix, _)| import.starts_with(prefix.as_str()))
            .map(|(prefix, target)| format!("{}{}", target, &import[prefix.len()..]))
    }

    /// Rewrite string literals inside every `import ...;` statement
    fn rewrite(&self, content: &str) -> Option<String> {
        let mut out = String::with_capacity(content.len());
        let mut changed = false;
        let mut rest = content;

        while let Some(pos) = find_import(rest) {
            let (before, stmt_start) = rest.split_at(pos);
            out.push_str(before);
            let end = stmt_start.find(';').map(|i| i + 1).unwrap_or(stmt_start.len());
            let (stmt, after) = stmt_start.split_at(end);
            let (rewritten, stmt_changed) = self.rewrite_statement(stmt);
            out.push_str(&rewritten);
            changed |= stmt_changed;
            rest = after;
        }
        out.push_str(rest);

        changed.then_some(out)
    }

    fn rewrite_statement(&self, stmt: &str) -> (String, bool) {
        let mut out = String::with_capacity(stmt.len());
        let mut changed = false;
        let mut rest = stmt;

        while let Some(open) = rest.find(|c: char| c == '"' || c == '\'') {
            let quote = rest[open..].chars().next().unwrap_or('"');
            let Some(len) = rest[open + 1..].find(quote) else {
                break;
            };
            let literal = &rest[open + 1..open + 1 + len];
            out.push_str(&rest[..=open]);
            match self.remap(literal) {
                Some(remapped) => {
                    debug!(from = literal, to = %remapped, "remapped import");
                    out.push_str(&remapped);
                    changed = true;
                }
                None => out.push_str(literal),
            }
            out.push(quote);
            rest = &rest[open + 2 + len..];
        }
        out.push_str(rest);

        (out, changed)
    }
}

/// Path literal of every `import` statement in `content`
pub(crate) fn import_paths(content: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut rest = content;
    while let Some(pos) = find_import(rest) {
        let stmt = &rest[pos..];
        let end = stmt.find(';').map_or(stmt.len(), |i| i + 1);
        if let Some(path) = first_literal(&stmt[..end]) {
            paths.push(path.to_string());
        }
        rest = &stmt[end..];
    }
    paths
}

fn first_literal(stmt: &str) -> Option<&str> {
    let open = stmt.find(|c: char| c == '"' || c == '\'')?;
    let quote = stmt[open..].chars().next()?;
    let len = stmt[open + 1..].find(quote)?;
    Some(&stmt[open + 1..open + 1 + len])
}

/// Byte offset of the next `import` keyword outside comments and strings
fn find_import(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = s[i..].find('\n').map_or(bytes.len(), |n| i + n + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = s[i + 2..].find("*/").map_or(bytes.len(), |n| i + n + 4);
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'i' if s[i..].starts_with("import") => {
                let before_ok = s[..i]
                    .chars()
                    .next_back()
                    .map_or(true, |c| !is_ident_char(c));
                let after_ok = s[i + 6..]
                    .chars()
                    .next()
                    .map_or(false, |c| !is_ident_char(c));
                if before_ok && after_ok {
                    return Some(i);
                }
                i += 6;
            }
            _ => i += 1,
        }
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

impl Preprocessor for RemappingPreprocessor {
    fn name(&self) -> &str {
        "remappings"
    }

    fn preprocess(&self, source: &SourceFile) -> Result<Option<String>, String> {
        Ok(self.rewrite(&source.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn source(content: &str) -> SourceFile {
        SourceFile {
            key: "src/A.sol".to_string(),
            path: PathBuf::from("src/A.sol"),
            content: content.to_string(),
        }
    }

    fn remapper() -> RemappingPreprocessor {
        RemappingPreprocessor::parse(&[
            "@oz/=lib/openzeppelin-contracts/".to_string(),
            "@oz/token/=lib/oz-token/".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn test_remaps_longest_prefix() {
        let input = "import \"@oz/token/ERC20.sol\";\nimport {Ownable} from '@oz/access/Ownable.sol';\n";
        let output = remapper().preprocess(&source(input)).unwrap().unwrap();
        assert_eq!(
            output,
            "import \"lib/oz-token/ERC20.sol\";\nimport {Ownable} from 'lib/openzeppelin-contracts/access/Ownable.sol';\n"
        );
    }

    #[test]
    fn test_multiline_import() {
        let input = "import {\n    A,\n    B\n} from \"@oz/x.sol\";\ncontract C {}";
        let output = remapper().preprocess(&source(input)).unwrap().unwrap();
        assert!(output.contains("from \"lib/openzeppelin-contracts/x.sol\";"));
        assert!(output.ends_with("contract C {}"));
    }

    #[test]
    fn test_leaves_other_strings_alone() {
        let input = "import \"./Local.sol\";\ncontract C { string s = \"@oz/not-an-import\"; }";
        assert_eq!(remapper().preprocess(&source(input)).unwrap(), None);
    }

    #[test]
    fn test_import_in_comments_is_ignored() {
        let line = "// we import nothing here\ncontract C { string s = \"@oz/not-an-import\"; }";
        assert_eq!(remapper().preprocess(&source(line)).unwrap(), None);

        let block = "/* import \"@oz/a.sol\"; */\ncontract C { string s = \"@oz/b\"; }";
        assert_eq!(remapper().preprocess(&source(block)).unwrap(), None);
    }

    #[test]
    fn test_import_in_string_is_ignored() {
        let input = "contract C { string a = \"import \\\" me\"; string b = \"@oz/x\"; }";
        assert_eq!(remapper().preprocess(&source(input)).unwrap(), None);
    }

    #[test]
    fn test_import_after_comment_is_remapped() {
        let input = "// import '@oz/old.sol';\nimport \"@oz/x.sol\"; /* ; */\ncontract C {}";
        let output = remapper().preprocess(&source(input)).unwrap().unwrap();
        assert_eq!(
            output,
            "// import '@oz/old.sol';\nimport \"lib/openzeppelin-contracts/x.sol\"; /* ; */\ncontract C {}"
        );
    }

    #[test]
    fn test_identifier_containing_import_is_ignored() {
        let input = "contract C { function reimport() public {} string s = \"@oz/x\"; }";
        assert_eq!(remapper().preprocess(&source(input)).unwrap(), None);
    }

    #[test]
    fn test_import_paths() {
        let input = "// import \"Skip.sol\";\nimport \"./B.sol\";\nimport {X} from '../lib/X.sol';\ncontract A {}";
        assert_eq!(import_paths(input), vec!["./B.sol", "../lib/X.sol"]);
    }

    #[test]
    fn test_resolve_import() {
        assert_eq!(resolve_import("src/a/A.sol", "./B.sol"), "src/a/B.sol");
        assert_eq!(resolve_import("src/a/A.sol", "../lib/X.sol"), "src/lib/X.sol");
        assert_eq!(resolve_import("src/A.sol", "lib/shared/M.sol"), "lib/shared/M.sol");
    }

    #[test]
    fn test_inline_sources_follow_imports() {
        let file = |key: &str, content: &str| SourceFile {
            key: key.to_string(),
            path: PathBuf::from(key),
            content: content.to_string(),
        };
        let all = vec![
            file("src/A.sol", "import \"./B.sol\";\ncontract A {}"),
            file("src/B.sol", "import \"./c/C.sol\";\ncontract B {}"),
            file("src/Legacy.sol", "pragma solidity ^0.7.0;\ncontract Legacy {}"),
            file("src/c/C.sol", "contract C {}"),
        ];
        let profile = CompilerProfile::parse("0.8.18").unwrap();
        let job = CompileJob {
            batch_id: "abc",
            profile: &profile,
            sources: vec![&all[0]],
            all_sources: &all,
            base_path: Path::new("."),
        };

        let keys: Vec<&str> = job.inline_sources().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["src/A.sol", "src/B.sol", "src/c/C.sol"]);
    }

    #[test]
    fn test_bad_remapping() {
        let err = RemappingPreprocessor::parse(&["=target".to_string()]).unwrap_err();
        assert!(err.is_config_error());
    }

    struct Flaky {
        failures: AtomicU32,
    }

    impl ArtifactWriter for Flaky {
        fn write(&self, _path: &Path, _contents: &[u8]) -> io::Result<()> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(io::Error::new(io::ErrorKind::Other, "transient"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_retry_recovers() {
        let writer = Flaky {
            failures: AtomicU32::new(2),
        };
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert!(policy.write(&writer, Path::new("x"), b"data").is_ok());
    }

    #[test]
    fn test_retry_exhausted() {
        let writer = Flaky {
            failures: AtomicU32::new(10),
        };
        let policy = RetryPolicy::new(2, Duration::ZERO);
        match policy.write(&writer, Path::new("x"), b"data").unwrap_err() {
            BuildError::ArtifactWriteFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(writer.failures.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_retry_count_saturates() {
        let writer = Flaky {
            failures: AtomicU32::new(1),
        };
        let policy = RetryPolicy::new(u32::MAX, Duration::ZERO);
        assert!(policy.write(&writer, Path::new("x"), b"data").is_ok());
    }

    #[test]
    fn test_fs_writer_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a/b/c.bin");
        FsArtifactWriter.write(&path, b"60806040").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"60806040");
    }
}
