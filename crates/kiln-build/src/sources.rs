//! Source file discovery

use crate::error::{BuildError, BuildResult};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Extension of compilable source files
pub const SOURCE_EXTENSION: &str = "sol";

/// A discovered source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Project-root-relative path with `/` separators, used for override
    /// lookup and as the compiler's source unit name
    pub key: String,
    /// Absolute location on disk
    pub path: PathBuf,
    /// Source text, possibly rewritten by preprocessors
    pub content: String,
}

/// Find every source file under `sources_dir`
///
/// Files come back sorted by key so that every later stage sees the same
/// order on every run.
pub fn discover_sources(project_root: &Path, sources_dir: &Path) -> BuildResult<Vec<SourceFile>> {
    if !sources_dir.is_dir() {
        return Err(BuildError::SourceDiscovery {
            path: sources_dir.to_path_buf(),
            reason: "sources directory not found".to_string(),
        });
    }

    let mut sources = Vec::new();
    for entry in WalkDir::new(sources_dir).follow_links(false) {
        let entry = entry.map_err(|e| BuildError::SourceDiscovery {
            path: sources_dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some(SOURCE_EXTENSION) {
            continue;
        }

        let content = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        sources.push(SourceFile {
            key: source_key(project_root, path),
            path: path.to_path_buf(),
            content,
        });
    }

    sources.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(sources)
}

/// Key for `path`: relative to `project_root` when inside it
fn source_key(project_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(project_root).unwrap_or(path);
    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    segments.join("/")
}

/// Normalize a user-written source path into key form
///
/// Strips a leading `./` and converts `\` separators, so override keys written
/// either way match discovered files.
pub fn normalize_source_key(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");
    unified
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("src/A.sol", "src/A.sol")]
    #[case("./src/A.sol", "src/A.sol")]
    #[case("src\\talos\\B.sol", "src/talos/B.sol")]
    #[case("src//nested/./C.sol", "src/nested/C.sol")]
    fn test_normalize_source_key(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_source_key(raw), expected);
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("talos")).unwrap();
        fs::write(src.join("talos/Vanilla.sol"), "contract Vanilla {}").unwrap();
        fs::write(src.join("Alpha.sol"), "contract Alpha {}").unwrap();
        fs::write(src.join("README.md"), "docs").unwrap();

        let sources = discover_sources(temp.path(), &src).unwrap();
        let keys: Vec<&str> = sources.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["src/Alpha.sol", "src/talos/Vanilla.sol"]);
        assert_eq!(sources[0].content, "contract Alpha {}");
    }

    #[test]
    fn test_missing_sources_dir() {
        let temp = TempDir::new().unwrap();
        let err = discover_sources(temp.path(), &temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, BuildError::SourceDiscovery { .. }));
    }
}
