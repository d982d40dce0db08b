//! # Platform-Specific Implementations
//!
//! Each supported OS has its own submodule implementing the same small set
//! of primitives the portable code is written against:
//!
//! | Primitive | Linux | Windows |
//! |-----------|-------|---------|
//! | structured fault hook | `sigaction` + alternate stack | vectored exception handler |
//! | pure virtual call hook | `__cxa_pure_virtual` (feature) | `_set_purecall_handler` |
//! | invalid parameter hook | (no CRT equivalent) | `_set_invalid_parameter_handler` |
//! | module enumeration | `dl_iterate_phdr` | `K32EnumProcessModules` |
//! | snapshot | in-process minidump writer | `MiniDumpWriteDump` |
//!
//! On any other OS the hooks fail to arm (logged, never fatal), module
//! lookups come back empty and snapshots report `ErrorKind::Unsupported`.
//!
//! - See: [signal(7) man page](https://man7.org/linux/man-pages/man7/signal.7.html)
//! - See: [Structured Exception Handling](https://learn.microsoft.com/en-us/windows/win32/debug/structured-exception-handling)

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod linux;

#[cfg(windows)]
pub mod windows;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod imp
{
    use super::linux;
    use crate::error::FaultlineResult;

    pub(crate) use linux::minidump::write_snapshot;
    pub(crate) use linux::modules::{for_each_module, warm_up_modules};
    pub use linux::signals::{SignalHook as StructuredHook, SignalStack as ThreadStack};

    pub(crate) fn install_thread_stack() -> FaultlineResult<ThreadStack>
    {
        ThreadStack::install()
    }

    /// The C++ runtime finds `__cxa_pure_virtual` at link time; there is
    /// nothing to swap at run time
    #[derive(Debug)]
    pub struct PureCallHook;

    impl PureCallHook
    {
        pub fn arm() -> Self
        {
            PureCallHook
        }
    }

    /// glibc has no invalid parameter handler; violations are reported
    /// through `contract::invalid_parameter` only
    #[derive(Debug)]
    pub struct InvalidParameterHook;

    impl InvalidParameterHook
    {
        pub fn arm() -> Self
        {
            InvalidParameterHook
        }
    }

    pub(crate) fn raise_pure_call() -> !
    {
        #[cfg(feature = "cxx-pure-virtual")]
        linux::pure_virtual::__cxa_pure_virtual();

        match crate::interceptor::pure_call::dispatch() {
            Some(termination) => termination.exit(),
            None => {
                eprintln!("pure virtual method called");
                std::process::abort()
            }
        }
    }
}

#[cfg(windows)]
mod imp
{
    use super::windows;
    use crate::error::FaultlineResult;

    pub(crate) use windows::crt::raise_pure_call;
    pub use windows::crt::{InvalidParameterHook, PureCallHook};
    pub(crate) use windows::minidump::write_snapshot;
    pub(crate) use windows::modules::{for_each_module, warm_up_modules};
    pub use windows::veh::VectoredHook as StructuredHook;

    /// Stack guarantee for overflow handling on the calling thread
    #[derive(Debug)]
    pub struct ThreadStack;

    pub(crate) fn install_thread_stack() -> FaultlineResult<ThreadStack>
    {
        windows::veh::reserve_overflow_stack();
        Ok(ThreadStack)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
mod imp
{
    use std::fs::File;
    use std::io;
    use std::ops::ControlFlow;

    use crate::error::{FaultlineError, FaultlineResult, PlatformError};
    use crate::failure::FailureRecord;
    use crate::resolver::ModuleEntry;

    fn unsupported() -> FaultlineError
    {
        FaultlineError::Platform(PlatformError {
            code: 0,
            message: format!("fault interception is not supported on {}", std::env::consts::OS),
        })
    }

    #[derive(Debug)]
    pub struct StructuredHook;

    impl StructuredHook
    {
        pub fn arm() -> FaultlineResult<Self>
        {
            Err(unsupported())
        }
    }

    #[derive(Debug)]
    pub struct ThreadStack;

    pub(crate) fn install_thread_stack() -> FaultlineResult<ThreadStack>
    {
        Ok(ThreadStack)
    }

    #[derive(Debug)]
    pub struct PureCallHook;

    impl PureCallHook
    {
        pub fn arm() -> Self
        {
            PureCallHook
        }
    }

    #[derive(Debug)]
    pub struct InvalidParameterHook;

    impl InvalidParameterHook
    {
        pub fn arm() -> Self
        {
            InvalidParameterHook
        }
    }

    pub(crate) fn raise_pure_call() -> !
    {
        match crate::interceptor::pure_call::dispatch() {
            Some(termination) => termination.exit(),
            None => std::process::abort(),
        }
    }

    pub(crate) fn for_each_module(_visit: &mut dyn FnMut(&ModuleEntry<'_>) -> ControlFlow<()>) -> Option<usize>
    {
        None
    }

    pub(crate) fn warm_up_modules() {}

    pub(crate) fn write_snapshot(_file: &File, _record: &FailureRecord<'_>) -> io::Result<()>
    {
        Err(io::Error::new(io::ErrorKind::Unsupported, unsupported()))
    }
}

pub use imp::{InvalidParameterHook, PureCallHook, StructuredHook, ThreadStack};
pub(crate) use imp::{for_each_module, install_thread_stack, raise_pure_call, warm_up_modules, write_snapshot};
