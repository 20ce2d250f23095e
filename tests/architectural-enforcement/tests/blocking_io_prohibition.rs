//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async production code MUST NOT use blocking I/O. The bar
//! protocol owns stdin and stdout, so only the daemon entry point may name
//! them, and only as `tokio::io` handles.
//! **Required**: `tokio::fs`, `tokio::io`, not `std::fs`, `std::io::stdin`

use architectural_enforcement::{find_violations, SourceLine};

fn check_blocking_io(line: &SourceLine) -> Option<String> {
    let code = &line.code;

    if line.in_async_fn && code.contains("std::fs::") {
        return Some(line.violation("Blocking file I/O in async"));
    }
    if line.in_async_fn && code.contains("std::thread::spawn") {
        return Some(line.violation("OS thread spawned from async"));
    }
    if code.contains("std::io::stdin") || code.contains("std::io::stdout") {
        return Some(line.violation("Blocking stdin/stdout"));
    }
    if code.contains("println!") {
        return Some(line.violation("println! writes into the block stream"));
    }
    None
}

/// Test that production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_violations(check_blocking_io);

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read_to_string().await");
        eprintln!("  - tokio::io::stdin(), tokio::io::stdout()");
        eprintln!("  - logging through tracing (stderr)");
        eprintln!("\n✅ ACCEPTABLE blocking I/O:");
        eprintln!("  - Non-async functions (configuration loading before the runtime starts)");
        eprintln!("  - Test code");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
