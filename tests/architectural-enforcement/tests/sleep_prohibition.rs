//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Waiting happens on
//! I/O, channels, semaphores or timeouts.
//! **Exception**: exponential backoff between routing retries.

use architectural_enforcement::{code_part, is_backoff_context, production_sources};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (idx, line) in file.lines.iter().enumerate() {
            let code = code_part(line);
            if !(code.contains("::sleep(") || code.contains(".sleep(")) {
                continue;
            }
            if is_backoff_context(&file.lines, idx) {
                continue;
            }
            violations.push(file.describe(idx, "sleep"));
        }
    }

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nAcceptable: retry backoff. Use tokio::time::timeout, Notify or channels instead.");

        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}

/// The scan must actually see the crate, or it proves nothing
#[test]
fn test_scan_covers_pool_sources() {
    let files = production_sources();
    assert!(
        files.iter().any(|f| f.path.ends_with("pool/mod.rs")),
        "production sources not found"
    );
}
