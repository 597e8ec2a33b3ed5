//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the curator's production code:
//! - No sleep() calls outside retry backoff
//! - No blocking I/O inside async functions
//!
//! The helpers here load production sources (everything before a file's first
//! `#[cfg(test)]`) and answer simple structural questions about a line.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["curator/core/src"];

/// One source file, cut off at its test module
#[derive(Debug)]
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,
    /// Production lines
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Format a violation at `idx`
    #[must_use]
    pub fn describe(&self, idx: usize, what: &str) -> String {
        format!(
            "{}:{} - {}: {}",
            self.path.display(),
            idx + 1,
            what,
            self.lines[idx].trim()
        )
    }
}

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Every `.rs` file under the production directories
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }

        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            if entry.path().extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(entry.path()) else {
                continue;
            };
            files.push(SourceFile {
                path: entry.path().to_path_buf(),
                lines: production_lines(&content),
            });
        }
    }

    files
}

/// Lines before the first `#[cfg(test)]`
#[must_use]
pub fn production_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .take_while(|line| !line.trim_start().starts_with("#[cfg(test)]"))
        .map(str::to_string)
        .collect()
}

/// The code part of a line, without a trailing `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of the nearest enclosing function header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FnKind {
    /// `async fn`
    Async,
    /// plain `fn`
    Sync,
}

fn fn_header(line: &str) -> Option<FnKind> {
    let line = line.trim_start();
    let stripped = line
        .trim_start_matches("pub(crate) ")
        .trim_start_matches("pub ")
        .trim_start_matches("const ")
        .trim_start_matches("unsafe ");
    if stripped.starts_with("async fn ") {
        Some(FnKind::Async)
    } else if stripped.starts_with("fn ") {
        Some(FnKind::Sync)
    } else {
        None
    }
}

/// Scan backwards for the function a line belongs to
#[must_use]
pub fn enclosing_fn(lines: &[String], current_idx: usize) -> Option<FnKind> {
    for i in (0..=current_idx).rev() {
        if let Some(kind) = fn_header(&lines[i]) {
            return Some(kind);
        }
        let line = lines[i].trim_start();
        // Stop at module/impl boundaries
        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return None;
        }
    }
    None
}

/// Whether a line is inside an async function
#[must_use]
pub fn is_in_async_function(lines: &[String], current_idx: usize) -> bool {
    enclosing_fn(lines, current_idx) == Some(FnKind::Async)
}

/// Whether a sleep at `current_idx` belongs to retry backoff
///
/// Requires both a backoff calculation and retry wording nearby.
#[must_use]
pub fn is_backoff_context(lines: &[String], current_idx: usize) -> bool {
    let range = current_idx.saturating_sub(15)..lines.len().min(current_idx + 5);

    let mut has_backoff_calc = false;
    let mut has_retry_context = false;
    for line in &lines[range] {
        let line = line.to_lowercase();
        if line.contains("backoff") {
            has_backoff_calc = true;
        }
        if line.contains("retry") || line.contains("retries") || line.contains("attempt") {
            has_retry_context = true;
        }
    }
    has_backoff_calc && has_retry_context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(code: &[&str]) -> Vec<String> {
        code.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let content = "fn a() {}\n#[cfg(test)]\nmod tests {}\n";
        assert_eq!(production_lines(content), vec!["fn a() {}".to_string()]);
    }

    #[test]
    fn test_async_function_detection() {
        let code = lines(&[
            "    pub async fn load(&self) {",
            "        let x = std::fs::read_to_string(\"f\");",
            "    }",
        ]);
        assert!(is_in_async_function(&code, 1));

        let code = lines(&["pub(crate) fn load() {", "    let x = 1;", "}"]);
        assert_eq!(enclosing_fn(&code, 1), Some(FnKind::Sync));
    }

    #[test]
    fn test_backoff_context_detection() {
        let code = lines(&[
            "let backoff = self.retry.backoff_for_attempt(attempt);",
            "tokio::time::sleep(backoff).await;",
        ]);
        assert!(is_backoff_context(&code, 1));

        let code = lines(&["loop {", "    tokio::time::sleep(Duration::from_millis(10)).await;", "}"]);
        assert!(!is_backoff_context(&code, 1));
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let a = 1; // std::fs::read"), "let a = 1; ");
    }
}
