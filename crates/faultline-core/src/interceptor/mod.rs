//! # Fault Interception
//!
//! Four independent hooks route failures to caller-supplied callbacks:
//!
//! | Hook | Catches | Afterwards |
//! |------|---------|------------|
//! | [`structured`] | hardware faults (access violation, illegal instruction, ...) | the fault propagates to the OS as if unhandled |
//! | [`pure_call`] | calls through a pure virtual slot | process exits with status 1 |
//! | [`contract`] | invalid parameters passed to checked APIs | a catchable [`ThreadError`](contract::ThreadError) unwinds |
//! | [`thread`] | errors escaping a thread body | thread-local callback, then status 1 |
//!
//! The hooks are process-global (except the terminate callback, which is
//! per thread). [`FaultInterceptor`] bundles them behind one owner that
//! uninstalls everything it installed when dropped.
//!
//! ## Example
//!
//! ```rust,no_run
//! use faultline_core::interceptor::FaultInterceptor;
//! use faultline_core::snapshot::SnapshotWriter;
//!
//! let mut interceptor = FaultInterceptor::new();
//! interceptor
//!     .on_failure(|record| {
//!         eprintln!("Oops: {} at {}", record.title(), record.module_name());
//!         SnapshotWriter::new().write(record);
//!     })
//!     .on_pure_call(|| eprintln!("pure virtual call"))
//!     .on_invalid_parameter()
//!     .on_terminate(|message| eprintln!("{message}"));
//! ```

pub mod contract;
pub mod pure_call;
mod report;
pub mod structured;
pub mod thread;

use std::fmt;
use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::failure::FailureRecord;
use crate::platform::ThreadStack;

/// Exit status used by every fatal termination path
pub const TERMINATION_STATUS: i32 = 1;

/// Which fatal path produced a [`Termination`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationKind
{
    /// A call through a pure virtual slot
    PureCall,
    /// An error escaped a thread body
    Uncaught,
}

impl TerminationKind
{
    pub fn title(self) -> &'static str
    {
        match self {
            TerminationKind::PureCall => "Pure virtual function call",
            TerminationKind::Uncaught => "Uncaught error",
        }
    }
}

/// Request to end the process, returned by the fatal dispatch paths
///
/// The callbacks have already run when one of these exists. The top-level
/// driver decides when to act on it; [`Termination::exit`] is the usual
/// choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination
{
    kind: TerminationKind,
    message: String,
    status: i32,
}

impl Termination
{
    pub fn pure_call() -> Self
    {
        Self {
            kind: TerminationKind::PureCall,
            message: TerminationKind::PureCall.title().to_string(),
            status: TERMINATION_STATUS,
        }
    }

    pub fn uncaught(message: impl Into<String>) -> Self
    {
        Self {
            kind: TerminationKind::Uncaught,
            message: message.into(),
            status: TERMINATION_STATUS,
        }
    }

    pub fn kind(&self) -> TerminationKind
    {
        self.kind
    }

    /// Message handed to the callback (or the kind's title)
    pub fn message(&self) -> &str
    {
        &self.message
    }

    /// Process exit status
    pub fn status(&self) -> i32
    {
        self.status
    }

    /// End the process with [`status`](Self::status)
    pub fn exit(self) -> !
    {
        debug!(kind = ?self.kind, status = self.status, "terminating");
        std::process::exit(self.status)
    }
}

impl fmt::Display for Termination
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}: {}", self.kind.title(), self.message)
    }
}

/// Owner of the installed hooks
///
/// Every `on_*` method installs one hook and records that this interceptor
/// owns it; [`uninstall`](Self::uninstall) (or drop) removes exactly those,
/// restoring what was in place before. Installing a hook twice replaces the
/// callback without chaining a second time.
///
/// Not `Send`: the alternate signal stack and the terminate callback belong
/// to the thread that called [`on_failure`](Self::on_failure) /
/// [`on_terminate`](Self::on_terminate).
///
/// Hook installation failures are logged and otherwise ignored; an
/// interceptor that could not arm still lets the program run.
pub struct FaultInterceptor
{
    structured: bool,
    thread_stack: Option<ThreadStack>,
    pure_call: bool,
    contract: bool,
    terminate: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl FaultInterceptor
{
    pub fn new() -> Self
    {
        Self {
            structured: false,
            thread_stack: None,
            pure_call: false,
            contract: false,
            terminate: false,
            _thread_bound: PhantomData,
        }
    }

    /// Report hardware faults to `callback`
    ///
    /// The callback runs on the faulting thread, inside the signal handler /
    /// exception filter. Once it returns the fault continues to the OS, which
    /// terminates the process. Also prepares the calling thread for stack
    /// overflows (alternate signal stack on Linux, stack guarantee on
    /// Windows); other threads get the same with
    /// [`structured::prepare_thread`].
    pub fn on_failure<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&FailureRecord<'_>) + Send + Sync + 'static,
    {
        if let Err(e) = structured::register(callback) {
            warn!("Structured fault hook not installed: {e}");
            return self;
        }
        self.structured = true;

        if self.thread_stack.is_none() {
            match structured::prepare_thread() {
                Ok(stack) => self.thread_stack = Some(stack),
                Err(e) => warn!("Stack overflows on this thread will not be reported: {e}"),
            }
        }
        self
    }

    /// Report pure virtual calls to `callback`; the process then exits with
    /// status 1
    pub fn on_pure_call<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        pure_call::register(callback);
        self.pure_call = true;
        self
    }

    /// Turn invalid-parameter reports into catchable
    /// [`ThreadError`](contract::ThreadError)s
    pub fn on_invalid_parameter(&mut self) -> &mut Self
    {
        contract::install();
        self.contract = true;
        self
    }

    /// Report errors escaping [`thread::run`] on the calling thread
    pub fn on_terminate<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&str) + 'static,
    {
        thread::on_terminate(callback);
        self.terminate = true;
        self
    }

    /// Whether the structured-fault hook is armed by this interceptor
    pub fn is_armed(&self) -> bool
    {
        self.structured
    }

    /// Remove every hook this interceptor installed
    ///
    /// Idempotent. Hooks are removed in reverse order of importance: report
    /// mode, pure-call handler, fault hook, then the thread stack.
    pub fn uninstall(&mut self)
    {
        if std::mem::take(&mut self.contract) {
            contract::uninstall();
        }
        if std::mem::take(&mut self.pure_call) {
            pure_call::unregister();
        }
        if std::mem::take(&mut self.structured) {
            structured::unregister();
        }
        self.thread_stack = None;
        if std::mem::take(&mut self.terminate) {
            thread::clear_terminate();
        }
    }
}

impl Default for FaultInterceptor
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl Drop for FaultInterceptor
{
    fn drop(&mut self)
    {
        self.uninstall();
    }
}

impl fmt::Debug for FaultInterceptor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("FaultInterceptor")
            .field("structured", &self.structured)
            .field("thread_stack", &self.thread_stack.is_some())
            .field("pure_call", &self.pure_call)
            .field("contract", &self.contract)
            .field("terminate", &self.terminate)
            .finish()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_termination_titles()
    {
        assert_eq!(TerminationKind::PureCall.title(), "Pure virtual function call");
        assert_eq!(TerminationKind::Uncaught.title(), "Uncaught error");
    }

    #[test]
    fn test_termination_status_is_one()
    {
        let pure = Termination::pure_call();
        assert_eq!(pure.status(), 1);
        assert_eq!(pure.message(), "Pure virtual function call");

        let uncaught = Termination::uncaught("Uncaught exception");
        assert_eq!(uncaught.kind(), TerminationKind::Uncaught);
        assert_eq!(uncaught.status(), TERMINATION_STATUS);
        assert_eq!(uncaught.to_string(), "Uncaught error: Uncaught exception");
    }

    #[test]
    fn test_empty_interceptor_uninstall_is_noop()
    {
        let mut interceptor = FaultInterceptor::new();
        assert!(!interceptor.is_armed());
        interceptor.uninstall();
        interceptor.uninstall();
    }
}
