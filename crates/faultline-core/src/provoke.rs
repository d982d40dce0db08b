//! # Fault Provocation
//!
//! Deliberately trigger each failure class, for demos and end-to-end tests.
//! Every function here ends the process (or the thread, for the contract
//! violation) one way or another; run them in a child process.
//!
//! | Function | Linux | Windows |
//! |----------|-------|---------|
//! | [`access_violation`] | store into a `PROT_NONE` page | store into a `PAGE_NOACCESS` page |
//! | [`illegal_instruction`] | `ud2` / `udf` | `ud2` / `udf` |
//! | [`breakpoint`] | `int3` / `brk #0` | `int3` / `brk #0` |
//! | [`divide_by_zero`] | `div` by zero (x86), `raise(SIGFPE)` elsewhere | `div` by zero (x86), `RaiseException` elsewhere |
//! | [`stack_overflow`] | unbounded recursion | unbounded recursion |
//! | [`pure_virtual_call`] | runtime pure-call path | `_purecall` |
//! | [`invalid_parameter`] | [`contract::invalid_parameter`] | [`contract::invalid_parameter`] |

use std::hint::black_box;

use crate::interceptor::{contract, pure_call};

/// Write to memory the process may not touch
pub fn access_violation() -> !
{
    let page = no_access_page();
    // SAFETY: none; the store is meant to fault
    unsafe {
        std::ptr::write_volatile(page, 0xDEAD_u32);
    }
    std::process::abort()
}

#[cfg(unix)]
fn no_access_page() -> *mut u32
{
    // SAFETY: anonymous mapping, no preconditions
    let page = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            4096,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if page == libc::MAP_FAILED {
        std::process::abort();
    }
    page.cast()
}

#[cfg(windows)]
fn no_access_page() -> *mut u32
{
    use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_COMMIT, MEM_RESERVE, PAGE_NOACCESS};

    // SAFETY: fresh allocation, no preconditions
    let page = unsafe { VirtualAlloc(std::ptr::null(), 4096, MEM_RESERVE | MEM_COMMIT, PAGE_NOACCESS) };
    if page.is_null() {
        std::process::abort();
    }
    page.cast()
}

#[cfg(not(any(unix, windows)))]
fn no_access_page() -> *mut u32
{
    std::process::abort()
}

/// Execute an undefined instruction
pub fn illegal_instruction() -> !
{
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    // SAFETY: traps unconditionally
    unsafe {
        std::arch::asm!("ud2", options(nomem, nostack));
    }

    #[cfg(target_arch = "aarch64")]
    // SAFETY: traps unconditionally
    unsafe {
        std::arch::asm!("udf #0", options(nomem, nostack));
    }

    #[cfg(all(unix, not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))))]
    // SAFETY: raise has no preconditions
    unsafe {
        libc::raise(libc::SIGILL);
    }

    std::process::abort()
}

/// Stop at a breakpoint with no debugger attached
///
/// The trap instruction is emitted inline, so the fault is attributed to the
/// calling module rather than to the C runtime.
pub fn breakpoint() -> !
{
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    // SAFETY: traps unconditionally
    unsafe {
        std::arch::asm!("int3", options(nomem, nostack));
    }

    #[cfg(target_arch = "aarch64")]
    // SAFETY: traps unconditionally
    unsafe {
        std::arch::asm!("brk #0", options(nomem, nostack));
    }

    #[cfg(all(unix, not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))))]
    // SAFETY: raise has no preconditions
    unsafe {
        libc::raise(libc::SIGTRAP);
    }

    #[cfg(all(windows, not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64"))))]
    // SAFETY: no preconditions
    unsafe {
        windows_sys::Win32::System::Diagnostics::Debug::DebugBreak();
    }

    std::process::abort()
}

/// Integer division by zero in hardware
///
/// ARM cores return zero instead of trapping, so there the fault is raised
/// explicitly.
pub fn divide_by_zero() -> !
{
    #[cfg(target_arch = "x86_64")]
    // SAFETY: `div` by zero traps before any register is written
    unsafe {
        std::arch::asm!(
            "div {divisor}",
            divisor = in(reg) black_box(0u64),
            inout("rax") 1u64 => _,
            inout("rdx") 0u64 => _,
            options(nomem, nostack),
        );
    }

    #[cfg(all(unix, not(target_arch = "x86_64")))]
    // SAFETY: raise has no preconditions
    unsafe {
        libc::raise(libc::SIGFPE);
    }

    #[cfg(all(windows, not(target_arch = "x86_64")))]
    // SAFETY: no arguments are passed
    unsafe {
        windows_sys::Win32::System::Diagnostics::Debug::RaiseException(
            windows_sys::Win32::Foundation::EXCEPTION_INT_DIVIDE_BY_ZERO as u32,
            0,
            0,
            std::ptr::null(),
        );
    }

    std::process::abort()
}

/// Recurse until the stack guard page is hit
pub fn stack_overflow() -> !
{
    recurse(0);
    std::process::abort()
}

#[allow(unconditional_recursion)]
#[inline(never)]
fn recurse(depth: u64) -> u64
{
    let frame = black_box([depth as u8; 4096]);
    recurse(depth + 1).wrapping_add(u64::from(frame[usize::from(frame[0])]))
}

/// Call through the runtime's pure virtual slot
pub fn pure_virtual_call() -> !
{
    pure_call::raise()
}

/// Violate an argument contract on the current thread
///
/// Unwinds with a [`ThreadError`](contract::ThreadError); catch it with
/// [`contract::catch`].
pub fn invalid_parameter() -> !
{
    contract::invalid_parameter("faultline_core::provoke::invalid_parameter", "buffer != NULL")
}
