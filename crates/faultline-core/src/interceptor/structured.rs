//! # Structured Faults
//!
//! Process-wide hook for hardware faults: access violations, illegal and
//! privileged instructions, arithmetic traps, breakpoints, stack overflows.
//!
//! ## Lifecycle
//!
//! 1. [`register`] stores the callback, then arms the platform hook
//!    (`sigaction` on Linux, a vectored exception handler on Windows) if it is
//!    not armed yet. Registering again replaces the callback only.
//! 2. The platform hook builds a [`FaultContext`] and calls [`dispatch`].
//! 3. [`unregister`] disarms the hook, restoring the previous dispositions,
//!    and clears the callback.
//!
//! The callback slot is only ever `try_read` from the hook, so a fault that
//! lands while another thread is re-registering skips the callback rather
//! than deadlocking in the handler.
//!
//! ## Stack overflows
//!
//! A handler cannot run on the stack that just overflowed. Each thread that
//! should report overflows calls [`prepare_thread`] once and keeps the guard
//! alive. [`FaultInterceptor::on_failure`](super::FaultInterceptor::on_failure)
//! does this for the installing thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};

use tracing::{debug, error};

use crate::error::FaultlineResult;
use crate::failure::{FailureRecord, FaultContext};
use crate::platform::{self, StructuredHook, ThreadStack};
use crate::resolver::ModuleResolver;

/// Callback invoked with every reported fault
pub type FailureCallback = Arc<dyn Fn(&FailureRecord<'_>) + Send + Sync>;

static CALLBACK: RwLock<Option<FailureCallback>> = RwLock::new(None);
static HOOK: Mutex<Option<StructuredHook>> = Mutex::new(None);

/// Outcome of one [`dispatch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch
{
    /// The code is ordinary unwinding; nothing was reported
    PassedThrough,
    /// The callback ran
    Reported,
    /// No callback was available (none registered, or the slot was busy)
    Unreported,
}

/// Store `callback` and arm the platform hook
///
/// ## Errors
///
/// Returns [`FaultlineError::Platform`](crate::error::FaultlineError::Platform)
/// when the OS refuses the hook. The callback is cleared in that case.
pub fn register<F>(callback: F) -> FaultlineResult<()>
where
    F: Fn(&FailureRecord<'_>) + Send + Sync + 'static,
{
    *CALLBACK.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));

    let mut hook = HOOK.lock().unwrap_or_else(PoisonError::into_inner);
    if hook.is_some() {
        debug!("structured fault callback replaced");
        return Ok(());
    }

    ModuleResolver::warm_up();
    match StructuredHook::arm() {
        Ok(armed) => {
            *hook = Some(armed);
            debug!("structured fault hook armed");
            Ok(())
        }
        Err(e) => {
            *CALLBACK.write().unwrap_or_else(PoisonError::into_inner) = None;
            Err(e)
        }
    }
}

/// Disarm the platform hook and clear the callback
///
/// Restores the dispositions that were in place before [`register`]. Does
/// nothing if the hook is not armed.
pub fn unregister()
{
    let armed = HOOK.lock().unwrap_or_else(PoisonError::into_inner).take();
    if armed.is_some() {
        drop(armed);
        debug!("structured fault hook disarmed");
    }
    *CALLBACK.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Whether the platform hook is currently armed
pub fn is_armed() -> bool
{
    HOOK.lock().unwrap_or_else(PoisonError::into_inner).is_some()
}

/// Report one fault to the registered callback
///
/// Called by the platform hooks; also usable directly with a
/// [synthetic](FaultContext::synthetic) context. Pass-through codes are
/// ignored. A panic raised by the callback is contained here so it never
/// unwinds into a signal frame.
///
/// ## Example
///
/// ```rust
/// use faultline_core::failure::FaultContext;
/// use faultline_core::interceptor::structured::{self, Dispatch};
/// use faultline_core::types::{Address, FaultCode};
///
/// let ctx = FaultContext::synthetic(FaultCode::UNWIND_PASS_THROUGH, Address::ZERO);
/// assert_eq!(structured::dispatch(&ctx), Dispatch::PassedThrough);
/// ```
pub fn dispatch(context: &FaultContext<'_>) -> Dispatch
{
    if context.code().is_pass_through() {
        return Dispatch::PassedThrough;
    }

    let callback = match CALLBACK.try_read() {
        Ok(slot) => slot.clone(),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().clone(),
        Err(TryLockError::WouldBlock) => None,
    };
    let Some(callback) = callback else {
        return Dispatch::Unreported;
    };

    let Some(record) = FailureRecord::from_context(context) else {
        return Dispatch::PassedThrough;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| callback(&record))).is_err() {
        error!(code = %record.code(), "failure callback panicked");
    }
    Dispatch::Reported
}

/// Make the calling thread able to report stack overflows
///
/// Keep the returned guard alive for as long as the thread runs; dropping it
/// releases the alternate stack.
///
/// ## Errors
///
/// Returns a platform error if the alternate stack cannot be mapped.
pub fn prepare_thread() -> FaultlineResult<ThreadStack>
{
    platform::install_thread_stack()
}

#[cfg(test)]
mod tests
{
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serial_test::serial;

    use super::*;
    use crate::types::{Address, FaultCode};

    #[test]
    #[serial]
    fn test_dispatch_without_callback_is_unreported()
    {
        unregister();
        let ctx = FaultContext::synthetic(FaultCode::ACCESS_VIOLATION, Address::ZERO);
        assert_eq!(dispatch(&ctx), Dispatch::Unreported);
    }

    #[test]
    #[serial]
    fn test_dispatch_reports_and_contains_panics()
    {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        register(|record| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            assert_eq!(record.title(), "Breakpoint");
            panic!("callback failure");
        })
        .unwrap();

        let ctx = FaultContext::synthetic(FaultCode::BREAKPOINT, Address::ZERO);
        assert_eq!(dispatch(&ctx), Dispatch::Reported);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        unregister();
        assert!(!is_armed());
    }

    #[test]
    #[serial]
    fn test_pass_through_skips_callback()
    {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        register(|_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let ctx = FaultContext::synthetic(FaultCode::UNWIND_PASS_THROUGH, Address::ZERO);
        assert_eq!(dispatch(&ctx), Dispatch::PassedThrough);
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        unregister();
    }
}
