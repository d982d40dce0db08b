//! # faultline-core
//!
//! In-process fault interception, failure classification and crash
//! snapshots.
//!
//! This crate provides:
//! - Hooks for four failure classes (hardware faults, pure virtual calls,
//!   invalid parameters, uncaught errors) behind one [`FaultInterceptor`]
//! - [`FailureRecord`]s naming the fault and the module it happened in
//! - Address-to-module lookup ([`ModuleResolver`])
//! - Minidump snapshots of the running process ([`SnapshotWriter`])
//!
//! ## Platform Support
//!
//! - **Linux**: `sigaction` + alternate signal stacks, `dl_iterate_phdr`, and
//!   an in-process minidump writer
//! - **Windows**: vectored exception handling, the CRT handler hooks and
//!   `MiniDumpWriteDump`
//! - **Other**: builds, but hooks fail to arm and snapshots are unsupported
//!
//! ## Why unsafe code is needed
//!
//! Signal handlers, exception filters and CRT hooks are installed through
//! raw OS interfaces and receive raw pointers to kernel-owned structures. The
//! unsafe code is confined to `platform` and [`provoke`]; everything above
//! it works on borrowed, safe views such as
//! [`FaultContext`](failure::FaultContext).
//!
//! ## Example
//!
//! ```rust,no_run
//! use faultline_core::prelude::*;
//!
//! let mut interceptor = FaultInterceptor::new();
//! interceptor.on_failure(|record| {
//!     eprintln!("Oops: {} at {}", record.title(), record.module_name());
//!     SnapshotWriter::new().write(record);
//! });
//! ```

#![allow(unsafe_code)] // Required for signal handlers, CRT hooks and minidump capture

pub mod error;
pub mod failure;
pub mod interceptor;
pub mod platform;
pub mod prelude;
pub mod provoke;
pub mod resolver;
pub mod snapshot;
pub mod types;

pub use error::{FaultlineError, FaultlineResult, PlatformError};
pub use failure::{FailureRecord, FaultContext, ModuleName};
pub use interceptor::FaultInterceptor;
pub use resolver::ModuleResolver;
pub use snapshot::SnapshotWriter;
pub use types::FaultCode;
