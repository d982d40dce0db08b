//! # Pure Virtual Calls
//!
//! A call through a pure virtual slot means an object was used while being
//! constructed or destroyed. The C++ runtime reports it through a single
//! process-wide handler; this module owns that handler.
//!
//! The registered callback runs first, then the process exits with status 1.
//! Without a registration the runtime's default behaviour (abort) applies.
//!
//! On Windows the CRT hook is swapped with `_set_purecall_handler`. On Linux
//! the runtime resolves `__cxa_pure_virtual` at link time, so interception
//! needs the `cxx-pure-virtual` feature; [`raise`] works either way.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, error};

use super::Termination;
use crate::platform::{self, PureCallHook};

pub type PureCallCallback = Arc<dyn Fn() + Send + Sync>;

static CALLBACK: RwLock<Option<PureCallCallback>> = RwLock::new(None);
static HOOK: Mutex<Option<PureCallHook>> = Mutex::new(None);

/// Store `callback` and install the runtime hook
///
/// Registering again replaces the callback; the previous runtime handler
/// saved by the first registration is kept.
pub fn register<F>(callback: F)
where
    F: Fn() + Send + Sync + 'static,
{
    *CALLBACK.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));

    let mut hook = HOOK.lock().unwrap_or_else(PoisonError::into_inner);
    if hook.is_none() {
        *hook = Some(PureCallHook::arm());
        debug!("pure call hook installed");
    }
}

/// Restore the previous runtime handler and clear the callback
pub fn unregister()
{
    if HOOK.lock().unwrap_or_else(PoisonError::into_inner).take().is_some() {
        debug!("pure call hook removed");
    }
    *CALLBACK.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Run the registered callback
///
/// Returns the [`Termination`] the caller must act on, or `None` when
/// nothing is registered (the runtime default should apply).
pub fn dispatch() -> Option<Termination>
{
    let callback = CALLBACK.read().unwrap_or_else(PoisonError::into_inner).clone()?;
    // The process is going down either way
    if panic::catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
        error!("pure call callback panicked");
    }
    Some(Termination::pure_call())
}

/// Go through the runtime's pure virtual call path
///
/// Never returns: the registered callback runs and the process exits with
/// status 1, or the runtime aborts.
pub fn raise() -> !
{
    platform::raise_pure_call()
}
