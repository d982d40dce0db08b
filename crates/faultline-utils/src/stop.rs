//! # Stop Requests
//!
//! A process-wide "please stop" flag raised by Ctrl-C (or by the program
//! itself) and polled by long-running loops.
//!
//! [`StopRequest::take_care`] installs the interrupt handler. When the
//! interrupt arrives the handler raises the flag and then holds the
//! interrupt until the program calls [`StopRequest::processed`], polling
//! every [`POLL_INTERVAL`]. On Windows this keeps the console from killing
//! the process while it is still shutting down.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use faultline_utils::StopRequest;
//!
//! StopRequest::take_care().expect("Failed to install the interrupt handler");
//! while !StopRequest::signaled() {
//!     std::thread::sleep(Duration::from_millis(50));
//! }
//! // ... flush, close ...
//! StopRequest::processed();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;

/// How often the interrupt handler checks for [`StopRequest::processed`]
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

static SIGNALED: AtomicBool = AtomicBool::new(false);
static PROCESSED: AtomicBool = AtomicBool::new(false);
static INSTALLED: OnceCell<()> = OnceCell::new();

/// Failure to install the interrupt handler
#[derive(Debug, thiserror::Error)]
pub enum StopError
{
    /// Another interrupt handler already owns Ctrl-C
    #[error("Failed to install interrupt handler: {0}")]
    Handler(#[from] ctrlc::Error),
}

/// Process-wide stop flag; all state is global
#[derive(Debug, Clone, Copy, Default)]
pub struct StopRequest;

impl StopRequest
{
    /// Install the Ctrl-C handler
    ///
    /// Idempotent.
    ///
    /// ## Errors
    ///
    /// Returns [`StopError::Handler`] if a different Ctrl-C handler is
    /// already installed.
    pub fn take_care() -> Result<(), StopError>
    {
        INSTALLED.get_or_try_init(|| {
            ctrlc::set_handler(|| {
                Self::signal();
                tracing::info!("stop requested");
                while !PROCESSED.load(Ordering::Acquire) {
                    thread::sleep(POLL_INTERVAL);
                }
            })
        })?;
        Ok(())
    }

    /// Whether a stop was requested
    pub fn signaled() -> bool
    {
        SIGNALED.load(Ordering::Acquire)
    }

    /// Request a stop from inside the program
    pub fn signal()
    {
        SIGNALED.store(true, Ordering::Release);
    }

    /// Acknowledge the stop, releasing a waiting interrupt handler
    pub fn processed()
    {
        PROCESSED.store(true, Ordering::Release);
    }

    /// Whether [`processed`](Self::processed) was called
    pub fn is_processed() -> bool
    {
        PROCESSED.load(Ordering::Acquire)
    }
}
