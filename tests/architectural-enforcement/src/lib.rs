//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code, wait on I/O or timers instead
//! - No blocking I/O inside async functions
//! - stdin/stdout are only touched through the protocol layer
//!
//! The helpers here walk the production sources of every workspace crate and
//! hand each line to a check, skipping comments and `#[cfg(test)]` modules.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["statusbar/core/src", "statusbar/daemon/src"];

/// One line of production code
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Code with any trailing `//` comment removed
    pub code: String,
    /// Line sits inside an `async fn`
    pub in_async_fn: bool,
}

impl SourceLine {
    /// Format as a violation report entry
    #[must_use]
    pub fn violation(&self, what: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.path.display(),
            self.number,
            what,
            self.code.trim()
        )
    }
}

/// Workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every production line under `dir` (relative to the workspace root)
#[must_use]
pub fn production_lines(dir: &str) -> Vec<SourceLine> {
    let root = workspace_root().join(dir);
    let mut lines = Vec::new();

    for entry in walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
            continue;
        }
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        lines.extend(scan_source(entry.path(), &content));
    }
    lines
}

/// Split one file into production lines
///
/// Everything from the first `#[cfg(test)]` on is test code.
#[must_use]
pub fn scan_source(path: &Path, content: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    let mut in_async_fn = false;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }

        let code = line.split("//").next().unwrap_or(line).to_string();
        if code.contains("fn ") {
            in_async_fn = code.contains("async fn ");
        }

        lines.push(SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code,
            in_async_fn,
        });
    }
    lines
}

/// Run `check` over every production line and collect the reports
pub fn find_violations<F>(check: F) -> Vec<String>
where
    F: Fn(&SourceLine) -> Option<String>,
{
    PRODUCTION_DIRS
        .iter()
        .flat_map(|dir| production_lines(dir))
        .filter_map(|line| check(&line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_source_stops_at_test_module() {
        let source = "\
async fn run() {
    let x = 1; // comment with std::fs::read
}
fn sync_helper() {}
#[cfg(test)]
mod tests {
    fn hidden() {}
}
";
        let lines = scan_source(Path::new("x.rs"), source);
        assert_eq!(lines.len(), 4);
        assert!(lines[1].in_async_fn);
        assert!(!lines[1].code.contains("std::fs"));
        assert!(!lines[3].in_async_fn);
    }

    #[test]
    fn test_production_dirs_exist() {
        for dir in PRODUCTION_DIRS {
            assert!(workspace_root().join(dir).is_dir(), "missing {dir}");
        }
    }
}
