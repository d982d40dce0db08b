//! # Linux Implementation
//!
//! Fault interception and snapshots for Linux (and Android, which shares the
//! kernel interfaces).
//!
//! ## Mechanisms
//!
//! - **Structured faults**: `sigaction(2)` handlers for `SIGSEGV`, `SIGBUS`,
//!   `SIGILL`, `SIGFPE` and `SIGTRAP`, run on an alternate signal stack
//! - **Pure virtual calls**: an exported `__cxa_pure_virtual` (behind the
//!   `cxx-pure-virtual` feature), which the C++ runtime calls for them
//! - **Modules**: `dl_iterate_phdr(3)`
//! - **Snapshots**: an in-process minidump writer fed from procfs
//!
//! ## References
//!
//! - [signal(7) man page](https://man7.org/linux/man-pages/man7/signal.7.html)
//! - [proc(5) man page](https://man7.org/linux/man-pages/man5/proc.5.html)
//! - [Minidump file format](https://learn.microsoft.com/en-us/windows/win32/api/minidumpapiset/)

pub mod constants;
pub mod context;
pub mod minidump;
pub mod modules;
pub mod procfs;
#[cfg(feature = "cxx-pure-virtual")]
pub mod pure_virtual;
pub mod signals;

use once_cell::sync::Lazy;

/// Size of a memory page
static SYSTEM_PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 { 4096 } else { size as usize }
});

pub(crate) fn page_size() -> usize
{
    *SYSTEM_PAGE_SIZE
}
