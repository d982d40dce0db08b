//! # Uncaught Errors
//!
//! The last chance to report an error before it takes its thread down.
//! [`run`] is the boundary at the top of a thread: a panic escaping the body
//! is described, handed to the callback registered for the *current thread*
//! with [`on_terminate`], and returned as a [`Termination`]. The default panic
//! report is not printed for panics raised inside the body; the callback is
//! the report.
//!
//! Payload descriptions follow the shape `Uncaught <type> (<description>)`:
//!
//! | Payload | Message |
//! |---------|---------|
//! | `&'static str` | `Uncaught &str (boom)` |
//! | `String` | `Uncaught alloc::string::String (boom)` |
//! | [`ThreadError`] | `Uncaught faultline_core::interceptor::contract::ThreadError (...)` |
//! | anything else | `Uncaught exception` |
//!
//! ## Example
//!
//! ```rust
//! use faultline_core::interceptor::thread::{self, ThreadExit};
//!
//! thread::on_terminate(|message| eprintln!("{message}"));
//! let exit = thread::run(|| -> u32 { panic!("boom") });
//! match exit {
//!     ThreadExit::Completed(_) => unreachable!(),
//!     ThreadExit::Terminated(termination) => {
//!         assert_eq!(termination.message(), "Uncaught &str (boom)");
//!         assert_eq!(termination.status(), 1);
//!     }
//! }
//! thread::clear_terminate();
//! ```

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use super::contract::ThreadError;
use super::report::HandledScope;
use super::Termination;

/// Message used when the payload carries no description
pub const OPAQUE_MESSAGE: &str = "Uncaught exception";

type TerminateCallback = Box<dyn Fn(&str)>;

thread_local! {
    static CALLBACK: RefCell<Option<TerminateCallback>> = const { RefCell::new(None) };
}

/// How a [`run`] body ended
#[derive(Debug)]
pub enum ThreadExit<T>
{
    Completed(T),
    /// The body panicked; the callback (if any) has run
    Terminated(Termination),
}

impl<T> ThreadExit<T>
{
    /// Value of a completed body; exits the process on termination
    pub fn exit_on_terminate(self) -> T
    {
        match self {
            ThreadExit::Completed(value) => value,
            ThreadExit::Terminated(termination) => termination.exit(),
        }
    }

    pub fn is_terminated(&self) -> bool
    {
        matches!(self, ThreadExit::Terminated(_))
    }
}

/// Register the terminate callback for the calling thread
///
/// Replaces any earlier registration on this thread. Other threads are
/// unaffected.
pub fn on_terminate<F>(callback: F)
where
    F: Fn(&str) + 'static,
{
    CALLBACK.with(|slot| *slot.borrow_mut() = Some(Box::new(callback)));
}

/// Remove the calling thread's terminate callback
pub fn clear_terminate()
{
    CALLBACK.with(|slot| slot.borrow_mut().take());
}

/// Run `body` as a thread body
///
/// A panic escaping `body` is reported once to this thread's callback and
/// converted into [`ThreadExit::Terminated`]. The callback runs with its
/// own panics contained.
pub fn run<T, F>(body: F) -> ThreadExit<T>
where
    F: FnOnce() -> T,
{
    let outcome = {
        let _scope = HandledScope::enter();
        panic::catch_unwind(AssertUnwindSafe(body))
    };
    match outcome {
        Ok(value) => ThreadExit::Completed(value),
        Err(payload) => {
            let message = describe(payload.as_ref());
            debug!("{message}");
            report(&message);
            ThreadExit::Terminated(Termination::uncaught(message))
        }
    }
}

/// Describe a panic payload the way [`run`] reports it
pub fn describe(payload: &(dyn Any + Send)) -> String
{
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        format!("Uncaught {} ({text})", type_name::<&str>())
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("Uncaught {} ({text})", type_name::<String>())
    } else if let Some(error) = payload.downcast_ref::<ThreadError>() {
        format!("Uncaught {} ({error})", type_name::<ThreadError>())
    } else {
        OPAQUE_MESSAGE.to_string()
    }
}

fn report(message: &str)
{
    CALLBACK.with(|slot| {
        // A callback that re-registers from inside itself would alias the slot
        let Ok(slot) = slot.try_borrow() else {
            return;
        };
        if let Some(callback) = slot.as_ref() {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
                error!("terminate callback panicked");
            }
        }
    });
}

#[cfg(test)]
mod tests
{
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serial_test::serial;

    use super::*;
    use crate::failure::FailureRecord;
    use crate::types::FaultCode;

    #[test]
    fn test_describe_payloads()
    {
        assert_eq!(describe(&"boom"), "Uncaught &str (boom)");
        assert_eq!(
            describe(&String::from("lost")),
            format!("Uncaught {} (lost)", type_name::<String>())
        );

        let error = ThreadError::new("bad input", &FailureRecord::from_code(FaultCode::INVALID_PARAMETER));
        assert_eq!(
            describe(&error),
            format!("Uncaught {} (bad input)", type_name::<ThreadError>())
        );

        assert_eq!(describe(&42u8), "Uncaught exception");
    }

    #[test]
    #[serial]
    fn test_completed_body_skips_callback()
    {
        let exit = run(|| 5);
        assert!(!exit.is_terminated());
        assert_eq!(exit.exit_on_terminate(), 5);
    }

    #[test]
    #[serial]
    fn test_callback_is_thread_local()
    {
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        on_terminate(move |message| {
            assert_eq!(message, "Uncaught exception");
            counter.set(counter.get() + 1);
        });

        std::thread::spawn(|| {
            let exit = run(|| panic::panic_any(17i32));
            assert!(exit.is_terminated());
        })
        .join()
        .unwrap();
        assert_eq!(seen.get(), 0);

        let exit = run(|| panic::panic_any(17i32));
        assert!(exit.is_terminated());
        assert_eq!(seen.get(), 1);
        clear_terminate();
    }

    #[test]
    #[serial]
    fn test_body_panic_skips_panic_report()
    {
        static REPORTS: AtomicUsize = AtomicUsize::new(0);

        panic::set_hook(Box::new(|_| {
            REPORTS.fetch_add(1, Ordering::SeqCst);
        }));

        let exit = run(|| -> u8 { panic!("handled by run") });
        assert!(exit.is_terminated());
        assert_eq!(REPORTS.load(Ordering::SeqCst), 0);

        let _ = panic::catch_unwind(|| panic!("outside run"));
        assert_eq!(REPORTS.load(Ordering::SeqCst), 1);
        drop(panic::take_hook());
    }

    #[test]
    #[serial]
    fn test_panicking_callback_is_contained()
    {
        on_terminate(|_| panic!("callback failed"));
        let exit = run(|| -> u8 { panic!("body failed") });
        match exit {
            ThreadExit::Terminated(termination) => assert_eq!(termination.message(), "Uncaught &str (body failed)"),
            ThreadExit::Completed(_) => panic!("body should not complete"),
        }
        clear_terminate();
    }
}
