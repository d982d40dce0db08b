//! Build script for faultline-core
//!
//! Checks the toolchain and target before compilation:
//! - Minimum Rust version (`std::panic::PanicHookInfo` is needed by the
//!   panic report gate, stable since Rust 1.81.0)
//! - Target support (Linux and Windows have fault backends; other targets
//!   build, but interception is a no-op there)

use std::env;

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    match rustc_version::version() {
        Ok(found) => {
            let required = rustc_version::Version::new(1, 81, 0);
            if found < required {
                panic!("faultline-core requires Rust {required} or newer, found {found}");
            }
        }
        // Some build environments hide the compiler; don't fail the build for that
        Err(_) => println!("cargo:warning=could not verify Rust version"),
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    match target_os.as_str() {
        "linux" | "android" => check_linux_arch(&target_arch),
        "windows" => {}
        other => println!("cargo:warning=faultline-core has no fault backend for target os '{other}'"),
    }
}

fn check_linux_arch(arch: &str)
{
    // Register capture in snapshots only exists for these two
    if arch != "x86_64" && arch != "aarch64" {
        println!("cargo:warning=snapshots on {arch} are written without a CPU context");
    }
}
