//! # Windows Implementation
//!
//! - **Structured faults**: a vectored exception handler ([`veh`])
//! - **Pure virtual calls** and **invalid parameters**: the CRT handler
//!   hooks ([`crt`])
//! - **Modules**: PSAPI enumeration ([`modules`])
//! - **Snapshots**: `MiniDumpWriteDump` from `dbghelp` ([`minidump`])
//!
//! ## References
//!
//! - [Structured Exception Handling](https://learn.microsoft.com/en-us/windows/win32/debug/structured-exception-handling)
//! - [Minidump Files](https://learn.microsoft.com/en-us/windows/win32/debug/minidump-files)

pub mod crt;
pub mod minidump;
pub mod modules;
pub mod veh;
