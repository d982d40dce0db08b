//! # Faultline Utilities
//!
//! Shared helpers for the Faultline workspace:
//!
//! - [`logging`]: `tracing` subscriber setup driven by environment variables
//!   or explicit options
//! - [`stop`]: a process-wide Ctrl-C / stop flag ([`StopRequest`])

pub mod logging;
pub mod stop;

pub use logging::{init_logging, init_logging_with, init_logging_with_level, LogConfig, LogFormat, LogLevel, LoggingError};
pub use stop::{StopError, StopRequest};
pub use tracing::{debug, error, info, trace, warn};
