//! # Linux Fault Signals
//!
//! Installs an `SA_SIGINFO | SA_ONSTACK` handler for the synchronous fault
//! signals and restores the previous dispositions when the hook is dropped.
//!
//! ## Delivery
//!
//! The handler builds a [`FaultContext`](crate::failure::FaultContext) and
//! hands it to [`structured::dispatch`]. It then reinstates the disposition
//! that was in place before the hook was armed and lets the signal reach it:
//!
//! - hardware faults (`si_code > 0`) simply return; the faulting instruction
//!   runs again and faults into the previous handler (or the default action)
//! - signals sent by `kill`/`raise` (`si_code <= 0`) and `SIGTRAP`, which do
//!   not repeat on their own, are raised again
//!
//! ## Alternate Stacks
//!
//! Stack overflows can only be reported if the handler runs on a separate
//! stack. [`SignalStack`] installs one for the calling thread; every thread
//! that should survive an overflow long enough to report it needs its own.
//!
//! See: [sigaction(2)](https://man7.org/linux/man-pages/man2/sigaction.2.html),
//! [sigaltstack(2)](https://man7.org/linux/man-pages/man2/sigaltstack.2.html)

use std::mem;
use std::ptr;
use std::sync::Mutex;

use libc::{c_int, c_void, siginfo_t, ucontext_t};
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use tracing::{debug, warn};

use super::constants::ALT_STACK_SIZE;
use super::{context, page_size};
use crate::error::{FaultlineError, FaultlineResult, PlatformError};
use crate::interceptor::structured;

/// Signals treated as structured faults
pub const FAULT_SIGNALS: [c_int; 5] = [libc::SIGSEGV, libc::SIGBUS, libc::SIGILL, libc::SIGFPE, libc::SIGTRAP];

/// Dispositions replaced by the armed hook, in installation order
static PREVIOUS: Lazy<Mutex<SmallVec<[(c_int, libc::sigaction); 5]>>> = Lazy::new(|| Mutex::new(SmallVec::new()));

/// Process-wide fault signal hook
///
/// Arming replaces the handlers of [`FAULT_SIGNALS`]; dropping restores the
/// exact dispositions that were replaced.
#[derive(Debug)]
pub struct SignalHook
{
    _armed: (),
}

impl SignalHook
{
    /// Install the handler for every fault signal
    ///
    /// ## Errors
    ///
    /// - `Platform`: `sigaction` rejected one of the signals; any handlers
    ///   already installed are rolled back first
    pub fn arm() -> FaultlineResult<Self>
    {
        let mut previous = PREVIOUS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        restore(&previous);
        previous.clear();

        for signal in FAULT_SIGNALS {
            match install(signal) {
                Ok(old) => previous.push((signal, old)),
                Err(e) => {
                    warn!("sigaction({signal}) failed: {e}");
                    restore(&previous);
                    previous.clear();
                    return Err(FaultlineError::Platform(e));
                }
            }
        }

        debug!(signals = ?FAULT_SIGNALS, "fault signal handlers installed");
        Ok(Self { _armed: () })
    }
}

impl Drop for SignalHook
{
    fn drop(&mut self)
    {
        let mut previous = PREVIOUS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        restore(&previous);
        previous.clear();
        debug!("fault signal handlers restored");
    }
}

fn install(signal: c_int) -> Result<libc::sigaction, PlatformError>
{
    // SAFETY: both structs are plain data and fully initialized below
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handle_fault as usize;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
        libc::sigemptyset(&mut action.sa_mask);

        let mut old: libc::sigaction = mem::zeroed();
        if libc::sigaction(signal, &action, &mut old) != 0 {
            return Err(PlatformError::last_os_error());
        }
        Ok(old)
    }
}

fn restore(previous: &[(c_int, libc::sigaction)])
{
    for (signal, action) in previous.iter().rev() {
        // SAFETY: `action` was filled in by the kernel
        unsafe {
            libc::sigaction(*signal, action, ptr::null_mut());
        }
    }
}

extern "C" fn handle_fault(signal: c_int, info: *mut siginfo_t, uc: *mut c_void)
{
    // SAFETY: the kernel passes valid pointers for SA_SIGINFO handlers; they
    // stay valid until this function returns
    let info = unsafe { info.as_ref() };
    if let Some(info) = info {
        let ucontext = unsafe { uc.cast::<ucontext_t>().as_ref() };
        let context = context::from_signal(signal, info, ucontext);
        structured::dispatch(&context);
    }

    redeliver(signal, info.map_or(0, |info| info.si_code));
}

fn redeliver(signal: c_int, si_code: c_int)
{
    let restored = match PREVIOUS.try_lock() {
        Ok(previous) => previous
            .iter()
            .find(|(s, _)| *s == signal)
            // SAFETY: see `restore`
            .map(|(_, action)| unsafe { libc::sigaction(signal, action, ptr::null_mut()) } == 0)
            .unwrap_or(false),
        Err(_) => false,
    };

    if !restored {
        // SAFETY: SIG_DFL is always a valid disposition
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
        }
    }

    // Blocked until this handler returns, then delivered to the restored
    // disposition
    if si_code <= 0 || signal == libc::SIGTRAP {
        // SAFETY: raise is async-signal-safe
        unsafe {
            libc::raise(signal);
        }
    }
}

/// Alternate signal stack for the calling thread
///
/// Installed only when the thread has none (or one smaller than
/// [`ALT_STACK_SIZE`]). The mapping has a `PROT_NONE` guard page below it so
/// a handler that overruns it faults instead of corrupting memory. Dropping
/// the guard reinstates the previous stack and unmaps ours.
///
/// Not `Send`: the alternate stack is a property of the thread that
/// installed it.
pub struct SignalStack
{
    mapping: Option<(*mut c_void, usize)>,
    previous: libc::stack_t,
}

impl SignalStack
{
    /// Make sure the calling thread has a usable alternate signal stack
    ///
    /// ## Errors
    ///
    /// - `Platform`: `mmap` or `sigaltstack` failed
    pub fn install() -> FaultlineResult<Self>
    {
        // SAFETY: plain data out-parameter
        let mut current: libc::stack_t = unsafe { mem::zeroed() };
        if unsafe { libc::sigaltstack(ptr::null(), &mut current) } != 0 {
            return Err(FaultlineError::Platform(PlatformError::last_os_error()));
        }

        if current.ss_flags & libc::SS_DISABLE == 0 && current.ss_size >= ALT_STACK_SIZE {
            return Ok(Self {
                mapping: None,
                previous: current,
            });
        }

        let guard = page_size();
        let len = ALT_STACK_SIZE + guard;

        // SAFETY: anonymous private mapping, no aliasing
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(FaultlineError::Platform(PlatformError::last_os_error()));
        }

        unsafe {
            // Stacks grow down; the guard page sits at the low end
            libc::mprotect(base, guard, libc::PROT_NONE);

            let mut stack: libc::stack_t = mem::zeroed();
            stack.ss_sp = base.cast::<u8>().add(guard).cast::<c_void>();
            stack.ss_size = ALT_STACK_SIZE;
            stack.ss_flags = 0;

            if libc::sigaltstack(&stack, ptr::null_mut()) != 0 {
                let error = PlatformError::last_os_error();
                libc::munmap(base, len);
                return Err(FaultlineError::Platform(error));
            }
        }

        debug!(size = ALT_STACK_SIZE, "alternate signal stack installed");
        Ok(Self {
            mapping: Some((base, len)),
            previous: current,
        })
    }

    /// Whether this guard installed (and will remove) a stack
    pub fn is_owned(&self) -> bool
    {
        self.mapping.is_some()
    }
}

impl std::fmt::Debug for SignalStack
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("SignalStack").field("owned", &self.is_owned()).finish()
    }
}

impl Drop for SignalStack
{
    fn drop(&mut self)
    {
        let Some((base, len)) = self.mapping.take() else {
            return;
        };

        let mut previous = self.previous;
        if previous.ss_size < libc::MINSIGSTKSZ {
            previous.ss_flags = libc::SS_DISABLE;
        }

        // SAFETY: restores what `install` read; the mapping is ours
        unsafe {
            if libc::sigaltstack(&previous, ptr::null_mut()) != 0 {
                // Still executing on it (EPERM); leave the mapping alone
                return;
            }
            libc::munmap(base, len);
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_signal_stack_installs_and_restores()
    {
        std::thread::spawn(|| {
            let stack = SignalStack::install().unwrap();
            assert!(stack.is_owned());

            let mut current: libc::stack_t = unsafe { mem::zeroed() };
            unsafe { libc::sigaltstack(ptr::null(), &mut current) };
            assert_eq!(current.ss_size, ALT_STACK_SIZE);

            // A second request reuses the installed stack
            let nested = SignalStack::install().unwrap();
            assert!(!nested.is_owned());
            drop(nested);

            drop(stack);
            unsafe { libc::sigaltstack(ptr::null(), &mut current) };
            assert_ne!(current.ss_size, ALT_STACK_SIZE);
        })
        .join()
        .unwrap();
    }
}
