//! # Types
//!
//! Platform-agnostic types used throughout faultline.
//!
//! These keep OS-specific representations (signal numbers, NT status codes,
//! kernel thread IDs) behind small newtypes so the interceptor and snapshot
//! code can be written once.

pub mod address;
pub mod code;
pub mod process;

pub use address::Address;
pub use code::FaultCode;
pub use process::{Architecture, MemoryRegion, MemoryRegionId, ProcessId, ThreadId};
