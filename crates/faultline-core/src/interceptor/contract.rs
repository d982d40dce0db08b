//! # Contract Violations
//!
//! An invalid argument handed to a checked API is a programming error, but a
//! recoverable one: the caller's thread can catch it and carry on. Violations
//! are raised with [`invalid_parameter`] (or [`ensure`]) and unwind as a
//! [`ThreadError`] payload until [`catch`] turns them back into a `Result`.
//!
//! ## Report mode
//!
//! [`install`] wraps the process panic hook so a violation does not print a
//! panic report on its way to [`catch`]; every other panic is forwarded to the
//! hook that was there before. [`uninstall`] puts that hook back. On
//! Windows `install` also routes the CRT's invalid parameter handler here,
//! so e.g. `printf(NULL)` in linked C code becomes a catchable
//! `ThreadError` instead of an immediate fast-fail.
//!
//! ## Example
//!
//! ```rust
//! use faultline_core::interceptor::contract;
//! use faultline_core::types::FaultCode;
//!
//! fn checked_sqrt(value: f64) -> f64
//! {
//!     contract::ensure(value >= 0.0, "checked_sqrt", "value >= 0.0");
//!     value.sqrt()
//! }
//!
//! contract::install();
//! let err = contract::catch(|| checked_sqrt(-1.0)).unwrap_err();
//! assert_eq!(err.failure().code(), FaultCode::INVALID_PARAMETER);
//! assert_eq!(err.message(), "Invalid parameter for 'checked_sqrt', value >= 0.0");
//! contract::uninstall();
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use super::report;
use crate::failure::{FailureRecord, ModuleName};
use crate::platform::InvalidParameterHook;
use crate::types::FaultCode;

static RUNTIME_HOOK: Mutex<Option<InvalidParameterHook>> = Mutex::new(None);

/// A recoverable failure propagating up the current thread
///
/// Carries the human readable message and the [`FailureRecord`] describing
/// it. Travels as a panic payload; use [`catch`] to receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadError
{
    message: String,
    code: FaultCode,
    module_name: ModuleName,
}

impl ThreadError
{
    pub fn new(message: impl Into<String>, failure: &FailureRecord<'_>) -> Self
    {
        Self {
            message: message.into(),
            code: failure.code(),
            module_name: *failure.module_name(),
        }
    }

    pub fn message(&self) -> &str
    {
        &self.message
    }

    /// The failure this error reports (never carries a fault context)
    pub fn failure(&self) -> FailureRecord<'static>
    {
        FailureRecord::with_module(self.code, self.module_name)
    }
}

impl fmt::Display for ThreadError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ThreadError {}

/// Raise an invalid-parameter violation on the current thread
///
/// Unwinds with a [`ThreadError`] whose record has code
/// [`FaultCode::INVALID_PARAMETER`] and whose message is
/// `Invalid parameter for '<function>', <expression>`.
pub fn invalid_parameter(function: &str, expression: &str) -> !
{
    let message = format!("Invalid parameter for '{function}', {expression}");
    debug!("{message}");
    let failure = FailureRecord::from_code(FaultCode::INVALID_PARAMETER);
    panic::panic_any(ThreadError::new(message, &failure))
}

/// Raise [`invalid_parameter`] unless `condition` holds
#[track_caller]
pub fn ensure(condition: bool, function: &str, expression: &str)
{
    if !condition {
        invalid_parameter(function, expression);
    }
}

/// Run `body`, turning a propagating [`ThreadError`] into `Err`
///
/// Any other panic keeps unwinding. `body` is treated as unwind safe: state
/// it mutated before the violation stays as it was left.
///
/// ## Errors
///
/// Returns the [`ThreadError`] raised inside `body`.
pub fn catch<T, F>(body: F) -> Result<T, ThreadError>
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<ThreadError>() {
            Ok(error) => Err(*error),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// Suppress panic reports for violations and hook the runtime's invalid
/// parameter handler
///
/// Idempotent.
pub fn install()
{
    if !report::mute_violations(true) {
        report::acquire();
    }

    let mut hook = RUNTIME_HOOK.lock().unwrap_or_else(PoisonError::into_inner);
    if hook.is_none() {
        *hook = Some(InvalidParameterHook::arm());
        debug!("invalid parameter reporting installed");
    }
}

/// Undo [`install`], restoring the panic hook it wrapped
///
/// A hook set with [`std::panic::set_hook`] while installed is replaced by
/// the one that was current at [`install`].
pub fn uninstall()
{
    if report::mute_violations(false) {
        report::release();
    }
    if RUNTIME_HOOK.lock().unwrap_or_else(PoisonError::into_inner).take().is_some() {
        debug!("invalid parameter reporting removed");
    }
}

/// Whether violations are currently kept out of the panic report
pub fn is_installed() -> bool
{
    report::violations_muted()
}

#[cfg(test)]
mod tests
{
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_violation_is_catchable()
    {
        install();
        let result: Result<(), _> = catch(|| invalid_parameter("open", "path != NULL"));
        let err = result.unwrap_err();
        assert_eq!(err.message(), "Invalid parameter for 'open', path != NULL");
        assert_eq!(err.failure().code(), FaultCode::INVALID_PARAMETER);
        assert_eq!(err.failure().title(), "Invalid parameter");
        assert!(err.failure().module_name().is_empty());
        uninstall();
        assert!(!is_installed());
    }

    #[test]
    fn test_ensure_passes_through_value()
    {
        let value = catch(|| {
            ensure(true, "noop", "true");
            7
        });
        assert_eq!(value, Ok(7));
    }

    #[test]
    #[serial]
    fn test_other_panics_keep_unwinding()
    {
        let outer = panic::catch_unwind(|| catch(|| panic!("not a violation")));
        let payload = outer.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"not a violation"));
    }
}
