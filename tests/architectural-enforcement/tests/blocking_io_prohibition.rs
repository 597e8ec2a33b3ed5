//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async code MUST NOT use blocking I/O.
//! **Required**: `tokio::fs`, `tokio::net`, `tokio::io`, async `reqwest`.
//! **Acceptable**: blocking calls in plain `fn`s that run before the runtime
//! serves requests (config loading).

use architectural_enforcement::{code_part, enclosing_fn, is_in_async_function, production_sources, FnKind};

const BLOCKING_PATTERNS: &[(&str, &str)] = &[
    ("std::fs::", "Blocking file I/O"),
    ("std::net::", "Blocking network I/O"),
    ("std::process::Command", "Blocking process I/O"),
    ("reqwest::blocking", "Blocking HTTP client"),
    ("std::thread::sleep", "Thread sleep"),
];

/// Test that production async code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (idx, line) in file.lines.iter().enumerate() {
            let code = code_part(line);

            for (pattern, what) in BLOCKING_PATTERNS {
                if code.contains(pattern) && enclosing_fn(&file.lines, idx) != Some(FnKind::Sync) {
                    violations.push(file.describe(idx, what));
                }
            }

            if (code.contains("std::io::stdin()") || code.contains("std::io::stdout()"))
                && is_in_async_function(&file.lines, idx)
            {
                violations.push(file.describe(idx, "Blocking stdin/stdout in async"));
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::fs, tokio::net, tokio::io or async reqwest instead.");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}

#[test]
fn test_reqwest_is_async_only() {
    let blocking_users: Vec<String> = production_sources()
        .into_iter()
        .filter(|f| f.lines.iter().any(|l| code_part(l).contains("reqwest::blocking")))
        .map(|f| f.path.display().to_string())
        .collect();

    assert!(blocking_users.is_empty(), "reqwest::blocking used in {blocking_users:?}");
}
