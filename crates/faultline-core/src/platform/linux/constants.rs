//! # Linux Constants
//!
//! Kernel ABI values that the `libc` crate does not export uniformly across
//! glibc and musl targets.
//!
//! See: [sigaction(2) man page](https://man7.org/linux/man-pages/man2/sigaction.2.html)
//! (the "The siginfo_t argument to a SA_SIGINFO handler" section)

/// `si_code` values for `SIGILL`
pub mod ill
{
    /// Illegal opcode
    pub const ILL_ILLOPC: i32 = 1;
    /// Privileged opcode
    pub const ILL_PRVOPC: i32 = 5;
    /// Privileged register
    pub const ILL_PRVREG: i32 = 6;
}

/// `si_code` values for `SIGFPE`
pub mod fpe
{
    /// Integer divide by zero
    pub const FPE_INTDIV: i32 = 1;
    /// Integer overflow
    pub const FPE_INTOVF: i32 = 2;
    /// Floating-point divide by zero
    pub const FPE_FLTDIV: i32 = 3;
    /// Floating-point overflow
    pub const FPE_FLTOVF: i32 = 4;
    /// Floating-point underflow
    pub const FPE_FLTUND: i32 = 5;
    /// Floating-point inexact result
    pub const FPE_FLTRES: i32 = 6;
    /// Floating-point invalid operation
    pub const FPE_FLTINV: i32 = 7;
    /// Subscript out of range
    pub const FPE_FLTSUB: i32 = 8;
}

/// `si_code` values for `SIGBUS`
pub mod bus
{
    /// Invalid address alignment
    pub const BUS_ADRALN: i32 = 1;
}

/// `si_code` values for `SIGTRAP`
pub mod trap
{
    /// Process breakpoint
    pub const TRAP_BRKPT: i32 = 1;
    /// Process trace trap
    pub const TRAP_TRACE: i32 = 2;
}

/// Indices into `mcontext_t::gregs` on x86_64
///
/// From `<sys/ucontext.h>`.
#[cfg(target_arch = "x86_64")]
pub mod greg
{
    pub const REG_R8: usize = 0;
    pub const REG_R9: usize = 1;
    pub const REG_R10: usize = 2;
    pub const REG_R11: usize = 3;
    pub const REG_R12: usize = 4;
    pub const REG_R13: usize = 5;
    pub const REG_R14: usize = 6;
    pub const REG_R15: usize = 7;
    pub const REG_RDI: usize = 8;
    pub const REG_RSI: usize = 9;
    pub const REG_RBP: usize = 10;
    pub const REG_RBX: usize = 11;
    pub const REG_RDX: usize = 12;
    pub const REG_RAX: usize = 13;
    pub const REG_RCX: usize = 14;
    pub const REG_RSP: usize = 15;
    pub const REG_RIP: usize = 16;
    pub const REG_EFL: usize = 17;
    /// `cs | gs << 16 | fs << 32 | ss << 48`
    pub const REG_CSGSFS: usize = 18;
}

/// Size of the signal stack installed for fault handlers
///
/// Large enough for module resolution, a callback that logs, and a full
/// snapshot write.
pub const ALT_STACK_SIZE: usize = 256 * 1024;

/// A `SIGSEGV` whose fault address is this close to the stack pointer is
/// reported as a stack overflow
pub const STACK_OVERFLOW_WINDOW: u64 = 64 * 1024;

/// Bytes below the stack pointer that leaf functions may use (x86_64 ABI
/// red zone); included when capturing the faulting thread's stack
pub const RED_ZONE: u64 = 128;

/// Upper bound on the stack bytes captured for the faulting thread
pub const MAX_STACK_CAPTURE: u64 = 64 * 1024;
