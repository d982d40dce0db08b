//! Gating of the process panic report.
//!
//! While at least one lease is held, the process panic hook is replaced by a
//! wrapper that drops the report for panics faultline handles itself and
//! forwards everything else to the hook it replaced. When the last lease is
//! released the replaced hook is put back, so a hook set by the application
//! in between is wrapped afresh on the next acquire.
//!
//! Two kinds of panic are kept quiet:
//! - [`ThreadError`] payloads while violations are muted
//! - any panic on a thread currently inside [`thread::run`](super::thread::run)

use std::cell::Cell;
use std::panic::{self, PanicHookInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::contract::ThreadError;

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

struct Gate
{
    previous: Option<Arc<PanicHook>>,
    leases: usize,
}

static GATE: Mutex<Gate> = Mutex::new(Gate {
    previous: None,
    leases: 0,
});
static VIOLATIONS_MUTED: AtomicBool = AtomicBool::new(false);

thread_local! {
    static HANDLED_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Take a lease on the wrapper, installing it if nobody holds one
pub(crate) fn acquire()
{
    let mut gate = GATE.lock().unwrap_or_else(PoisonError::into_inner);
    gate.leases += 1;
    // Hooks cannot be swapped while this thread unwinds
    if gate.previous.is_some() || std::thread::panicking() {
        return;
    }

    let previous: Arc<PanicHook> = Arc::new(panic::take_hook());
    let forward = Arc::clone(&previous);
    panic::set_hook(Box::new(move |info| {
        if !is_silenced(info) {
            forward(info);
        }
    }));
    gate.previous = Some(previous);
    debug!("panic report gate installed");
}

/// Drop a lease, putting the replaced hook back after the last one
pub(crate) fn release()
{
    let mut gate = GATE.lock().unwrap_or_else(PoisonError::into_inner);
    gate.leases = gate.leases.saturating_sub(1);
    if gate.leases > 0 || std::thread::panicking() {
        return;
    }
    let Some(previous) = gate.previous.take() else {
        return;
    };

    // Dropping the wrapper releases its clone of `previous`
    drop(panic::take_hook());
    match Arc::try_unwrap(previous) {
        Ok(hook) => panic::set_hook(hook),
        Err(shared) => panic::set_hook(Box::new(move |info| shared(info))),
    }
    debug!("panic report gate removed");
}

/// Mute or unmute reports for [`ThreadError`] payloads
///
/// Returns the previous setting.
pub(crate) fn mute_violations(muted: bool) -> bool
{
    VIOLATIONS_MUTED.swap(muted, Ordering::AcqRel)
}

pub(crate) fn violations_muted() -> bool
{
    VIOLATIONS_MUTED.load(Ordering::Acquire)
}

/// Marks the calling thread as having its panics handled by the caller
///
/// Holds a lease for as long as it lives.
pub(crate) struct HandledScope
{
    _not_send: std::marker::PhantomData<*const ()>,
}

impl HandledScope
{
    pub(crate) fn enter() -> Self
    {
        acquire();
        HANDLED_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            _not_send: std::marker::PhantomData,
        }
    }
}

impl Drop for HandledScope
{
    fn drop(&mut self)
    {
        HANDLED_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        release();
    }
}

fn is_silenced(info: &PanicHookInfo<'_>) -> bool
{
    if HANDLED_DEPTH.try_with(Cell::get).unwrap_or(0) > 0 {
        return true;
    }
    violations_muted() && info.payload().is::<ThreadError>()
}

#[cfg(test)]
mod tests
{
    use std::sync::atomic::AtomicUsize;

    use serial_test::serial;

    use super::*;
    use crate::failure::FailureRecord;
    use crate::types::FaultCode;

    static FORWARDED: AtomicUsize = AtomicUsize::new(0);

    fn counting_hook()
    {
        panic::set_hook(Box::new(|_| {
            FORWARDED.fetch_add(1, Ordering::SeqCst);
        }));
        FORWARDED.store(0, Ordering::SeqCst);
    }

    #[test]
    #[serial]
    fn test_handled_scope_silences_and_restores()
    {
        counting_hook();
        {
            let _scope = HandledScope::enter();
            let _ = panic::catch_unwind(|| panic!("handled"));
            assert_eq!(FORWARDED.load(Ordering::SeqCst), 0);
        }

        let _ = panic::catch_unwind(|| panic!("unhandled"));
        assert_eq!(FORWARDED.load(Ordering::SeqCst), 1);
        drop(panic::take_hook());
    }

    #[test]
    #[serial]
    fn test_other_panics_are_forwarded_while_muted()
    {
        counting_hook();
        acquire();
        let was_muted = mute_violations(true);

        let error = ThreadError::new("muted", &FailureRecord::from_code(FaultCode::INVALID_PARAMETER));
        let _ = panic::catch_unwind(move || panic::panic_any(error));
        assert_eq!(FORWARDED.load(Ordering::SeqCst), 0);
        let _ = panic::catch_unwind(|| panic!("plain"));
        assert_eq!(FORWARDED.load(Ordering::SeqCst), 1);

        mute_violations(was_muted);
        release();
        drop(panic::take_hook());
    }

    #[test]
    #[serial]
    fn test_nested_leases_keep_wrapper()
    {
        counting_hook();
        acquire();
        acquire();
        release();
        {
            let _scope = HandledScope::enter();
            let _ = panic::catch_unwind(|| panic!("still wrapped"));
        }
        assert_eq!(FORWARDED.load(Ordering::SeqCst), 0);
        release();

        let _ = panic::catch_unwind(|| panic!("restored"));
        assert_eq!(FORWARDED.load(Ordering::SeqCst), 1);
        drop(panic::take_hook());
    }
}
