//! End-to-end tests: provoke real failures in a child copy of this test
//! binary and check what the parent observes.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use faultline_core::failure::ModuleName;
use faultline_core::interceptor::{thread, FaultInterceptor};
use faultline_core::provoke;
use faultline_core::snapshot::{SnapshotTarget, SnapshotWriter};

const CHILD_ENV: &str = "FAULTLINE_E2E_CHILD";
const DUMP_DIR_ENV: &str = "FAULTLINE_E2E_DUMP_DIR";

fn run_child(test_name: &str, dump_dir: &std::path::Path) -> Output
{
    Command::new(env::current_exe().unwrap())
        .args([test_name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .env(DUMP_DIR_ENV, dump_dir)
        .output()
        .unwrap()
}

fn is_child() -> bool
{
    env::var_os(CHILD_ENV).is_some()
}

fn arm_reporting_interceptor() -> FaultInterceptor
{
    let dump_dir = PathBuf::from(env::var_os(DUMP_DIR_ENV).unwrap());
    let writer = SnapshotWriter::with_target(SnapshotTarget::new(dump_dir, "e2e"));

    let mut interceptor = FaultInterceptor::new();
    interceptor.on_failure(move |record| {
        eprintln!("Oops: {} at {}", record.title(), record.module_name());
        if writer.write(record) {
            eprintln!("snapshot written");
        }
    });
    interceptor
}

#[test]
fn child_access_violation()
{
    if !is_child() {
        return;
    }
    let _interceptor = arm_reporting_interceptor();
    provoke::access_violation();
}

#[test]
fn child_uncaught_error()
{
    if !is_child() {
        return;
    }
    thread::on_terminate(|message| eprintln!("Terminate: {message}"));
    thread::run(|| panic!("lost request")).exit_on_terminate();
}

#[test]
fn test_access_violation_is_reported_and_snapshotted()
{
    if is_child() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let output = run_child("child_access_violation", scratch.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    let exe = ModuleName::from_path(&env::current_exe().unwrap());
    assert!(
        stderr.contains(&format!("Oops: Access violation at {exe}")),
        "child stderr: {stderr}"
    );
    assert!(stderr.contains("snapshot written"), "child stderr: {stderr}");

    let artifacts: Vec<_> = fs::read_dir(scratch.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".dmp"))
        .collect();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].metadata().unwrap().len() > 0);
}

#[test]
fn test_uncaught_error_exits_with_status_one()
{
    if is_child() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let output = run_child("child_uncaught_error", scratch.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Terminate: Uncaught &str (lost request)"), "child stderr: {stderr}");
}
