//! Common module for library exports

pub use crate::error::{FaultlineError, FaultlineResult, PlatformError};
pub use crate::failure::{FailureRecord, FaultContext, ModuleName};
pub use crate::interceptor::contract::ThreadError;
pub use crate::interceptor::thread::ThreadExit;
pub use crate::interceptor::{FaultInterceptor, Termination, TerminationKind};
pub use crate::resolver::{ModuleInfo, ModuleList, ModuleResolver};
pub use crate::snapshot::{SnapshotTarget, SnapshotWriter};
pub use crate::types::{Address, FaultCode, ProcessId, ThreadId};
