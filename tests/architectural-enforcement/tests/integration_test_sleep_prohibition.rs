//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Producers tick on
//! `tokio::time::interval`, the supervisor waits on a deadline with
//! `sleep_until`.
//! **Exceptions**: test code

use architectural_enforcement::{find_violations, SourceLine};

fn check_sleep(line: &SourceLine) -> Option<String> {
    let code = &line.code;
    if code.contains("thread::sleep") {
        return Some(line.violation("Blocking thread sleep"));
    }
    if code.contains("time::sleep(") || code.contains(" sleep(") {
        return Some(line.violation("Sleep instead of waiting"));
    }
    None
}

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_violations(check_sleep);

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE:");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("  - Deadlines using tokio::time::sleep_until()");
        eprintln!("  - Test code (#[cfg(test)] modules)");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
