//! The unhandled-throw fatal path, observed from outside the process.
//!
//! A throw with no recovery point anywhere on the thread must print a
//! diagnostic and terminate the process with a non-zero status. The test
//! re-executes its own binary with an environment marker so the fatal
//! exit happens in a child process.

use std::process::Command;

const MARKER: &str = "EXEC_CORE_TRIGGER_FATAL_THROW";

#[test]
fn test_unhandled_throw_terminates_the_process() {
    if std::env::var_os(MARKER).is_some() {
        // Child process: no invocation is active, so there is no
        // recovery point; this must not return.
        let _ = interpreter::exception::throw_value(core_types::Value::Int(3));
        unreachable!("a throw with no recovery point returned");
    }

    let exe = std::env::current_exe().expect("test binary path");
    let output = Command::new(exe)
        .args([
            "--exact",
            "test_unhandled_throw_terminates_the_process",
            "--nocapture",
        ])
        .env(MARKER, "1")
        .output()
        .expect("spawn child test process");

    assert!(
        !output.status.success(),
        "child exited cleanly; stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unhandled"),
        "no diagnostic on stderr: {stderr:?}"
    );
}

#[test]
fn test_unhandled_fault_terminates_the_process() {
    if std::env::var_os(MARKER).is_some() {
        // Covered by the child run of the throw test.
        return;
    }

    let exe = std::env::current_exe().expect("test binary path");
    let output = Command::new(exe)
        .args(["--exact", "child_fault_with_no_recovery_point", "--nocapture"])
        .env(MARKER, "1")
        .env("EXEC_CORE_FAULT_CASE", "1")
        .output()
        .expect("spawn child test process");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unhandled fault"),
        "no fault diagnostic on stderr: {stderr:?}"
    );
}

#[test]
fn child_fault_with_no_recovery_point() {
    // Inert unless spawned by the harness above.
    if std::env::var_os("EXEC_CORE_FAULT_CASE").is_none() {
        return;
    }
    let _ = interpreter::exception::throw_fault(core_types::FaultKind::OutOfMemory);
    unreachable!("a fault with no recovery point returned");
}
