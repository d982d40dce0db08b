//! Tests that drive the `faultline` binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn faultline(args: &[&str], dump_dir: &Path) -> Output
{
    Command::new(env!("CARGO_BIN_EXE_faultline"))
        .args(args)
        .env("FAULTLINE_DUMP_DIR", dump_dir)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn dumps_in(dir: &Path) -> usize
{
    fs::read_dir(dir).map_or(0, |entries| {
        entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".dmp"))
            .count()
    })
}

#[test]
fn test_classify()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["classify", "0xC0000005"], scratch.path());
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0xC0000005: Access violation");

    let output = faultline(&["classify", "7"], scratch.path());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "0x00000007: Unknown");
}

#[test]
fn test_classify_rejects_garbage()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["classify", "segfault"], scratch.path());
    assert!(!output.status.success());
}

#[test]
fn test_snapshot_command()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["snapshot"], scratch.path());
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let path = Path::new(stdout.trim());
    assert!(path.exists());
    assert!(path.starts_with(scratch.path()));
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("faultline-"));
}

#[test]
fn test_modules_lists_executable()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["modules"], scratch.path());
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("faultline"));
}

#[test]
fn test_crash_access_violation()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["crash", "access-violation"], scratch.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Oops: Access violation at faultline"), "stderr: {stderr}");
    assert_eq!(dumps_in(scratch.path()), 1);
}

#[test]
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
fn test_crash_breakpoint_attributed_to_executable()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["crash", "breakpoint"], scratch.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Oops: Breakpoint at faultline"), "stderr: {stderr}");
    assert_eq!(dumps_in(scratch.path()), 1);
}

#[test]
fn test_crash_illegal_instruction()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["crash", "illegal-instruction"], scratch.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Oops: Illegal instruction at faultline"), "stderr: {stderr}");
}

#[test]
fn test_crash_invalid_parameter()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["crash", "invalid-parameter"], scratch.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr.contains("Runtime error []: Invalid parameter for 'faultline_core::provoke::invalid_parameter', buffer != NULL"),
        "stderr: {stderr}"
    );
    assert_eq!(dumps_in(scratch.path()), 0);
}

#[test]
fn test_crash_uncaught()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["crash", "uncaught"], scratch.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Uncaught &str (request handler failed)"), "stderr: {stderr}");
    assert!(!stderr.contains("panicked at"), "stderr: {stderr}");
}

#[test]
fn test_crash_pure_call()
{
    let scratch = tempfile::tempdir().unwrap();
    let output = faultline(&["crash", "pure-call"], scratch.path());
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Oops: pure virtual function call"), "stderr: {stderr}");
}
