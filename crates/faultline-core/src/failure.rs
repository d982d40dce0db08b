//! # Failure Records
//!
//! [`FailureRecord`] is the value handed to a registered failure callback: a
//! classification code, its title, and the short name of the module the
//! faulting instruction belongs to. A record captured by a hook also borrows
//! the OS fault context ([`FaultContext`]), which is only valid while the hook
//! runs; the borrow keeps the record from escaping the callback.
//!
//! Records built from a bare code ([`FailureRecord::from_code`]) carry no
//! context and are `'static`, so they can travel inside a propagating error
//! such as [`ThreadError`](crate::interceptor::contract::ThreadError).
//!
//! ## Example
//!
//! ```rust
//! use faultline_core::failure::FailureRecord;
//! use faultline_core::types::FaultCode;
//!
//! let record = FailureRecord::from_code(FaultCode::INVALID_PARAMETER);
//! assert_eq!(record.title(), "Invalid parameter");
//! assert!(record.module_name().is_empty());
//! assert!(record.context().is_none());
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::path::Path;

use crate::resolver::ModuleResolver;
use crate::types::{Address, FaultCode, ThreadId};

/// Longest module name a record stores, in bytes
pub const MODULE_NAME_CAPACITY: usize = 63;

/// Short file name of a loaded module, at most [`MODULE_NAME_CAPACITY`] bytes
///
/// Stored inline so it can be filled in from inside a signal handler without
/// touching the allocator. Directory components are stripped on
/// construction; longer names are truncated on a UTF-8 character boundary.
///
/// ## Example
///
/// ```rust
/// use faultline_core::failure::ModuleName;
///
/// let name = ModuleName::from_path_bytes(b"/usr/lib/libc.so.6");
/// assert_eq!(name.as_str(), "libc.so.6");
///
/// let name = ModuleName::from_path_bytes(br"C:\Windows\System32\ntdll.dll");
/// assert_eq!(name.as_str(), "ntdll.dll");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleName
{
    buf: [u8; MODULE_NAME_CAPACITY],
    len: u8,
}

impl ModuleName
{
    /// The empty name, used when no module contains the address
    pub const EMPTY: Self = ModuleName {
        buf: [0; MODULE_NAME_CAPACITY],
        len: 0,
    };

    /// Build a name from a full path, keeping only the last component
    ///
    /// Both `/` and `\` are treated as separators. Invalid UTF-8 is cut at the
    /// first bad byte.
    pub fn from_path_bytes(path: &[u8]) -> Self
    {
        let start = path.iter().rposition(|b| *b == b'/' || *b == b'\\').map_or(0, |i| i + 1);
        Self::from_bytes_truncated(&path[start..])
    }

    /// Build a name from a file system path
    pub fn from_path(path: &Path) -> Self
    {
        #[cfg(unix)]
        {
            use std::os::unix::ffi::OsStrExt;
            Self::from_path_bytes(path.as_os_str().as_bytes())
        }

        #[cfg(not(unix))]
        {
            Self::from_path_bytes(path.to_string_lossy().as_bytes())
        }
    }

    fn from_bytes_truncated(bytes: &[u8]) -> Self
    {
        let mut end = bytes.len().min(MODULE_NAME_CAPACITY);
        // Cut back to the longest valid UTF-8 prefix
        if let Err(e) = std::str::from_utf8(&bytes[..end]) {
            end = e.valid_up_to();
        }

        let mut name = Self::EMPTY;
        name.buf[..end].copy_from_slice(&bytes[..end]);
        name.len = end as u8;
        name
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str
    {
        // Only ever filled with a validated UTF-8 prefix
        std::str::from_utf8(&self.buf[..usize::from(self.len)]).unwrap_or_default()
    }

    /// Whether no module was resolved
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }
}

impl Default for ModuleName
{
    fn default() -> Self
    {
        Self::EMPTY
    }
}

impl Deref for ModuleName
{
    type Target = str;

    fn deref(&self) -> &str
    {
        self.as_str()
    }
}

impl PartialEq<str> for ModuleName
{
    fn eq(&self, other: &str) -> bool
    {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ModuleName
{
    fn eq(&self, other: &&str) -> bool
    {
        self.as_str() == *other
    }
}

impl fmt::Debug for ModuleName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ModuleName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.as_str())
    }
}

/// Raw OS data behind a [`FaultContext`]
///
/// Borrowed from the kernel (signal frame) or the OS exception dispatcher;
/// valid only for the duration of the hook invocation.
pub enum RawContext<'a>
{
    /// No OS data: an on-demand snapshot or a test
    Synthetic,

    /// A signal delivered with `SA_SIGINFO`
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Signal
    {
        /// Signal number (`SIGSEGV`, `SIGILL`, ...)
        signal: libc::c_int,
        /// Kernel-provided `siginfo_t`
        info: &'a libc::siginfo_t,
        /// Interrupted machine state, when the kernel supplied one
        ucontext: Option<&'a libc::ucontext_t>,
    },

    /// Exception pointers passed to a vectored exception handler
    #[cfg(windows)]
    Exception(&'a windows_sys::Win32::System::Diagnostics::Debug::EXCEPTION_POINTERS),

    #[doc(hidden)]
    #[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
    Unsupported(PhantomData<&'a ()>),
}

impl fmt::Debug for RawContext<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            RawContext::Synthetic => f.write_str("Synthetic"),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            RawContext::Signal { signal, ucontext, .. } => f
                .debug_struct("Signal")
                .field("signal", signal)
                .field("has_ucontext", &ucontext.is_some())
                .finish_non_exhaustive(),
            #[cfg(windows)]
            RawContext::Exception(pointers) => {
                let ptr: *const windows_sys::Win32::System::Diagnostics::Debug::EXCEPTION_POINTERS = *pointers;
                f.debug_tuple("Exception").field(&ptr).finish()
            }
            #[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
            RawContext::Unsupported(_) => f.write_str("Unsupported"),
        }
    }
}

/// Non-owning view of one fault occurrence
///
/// Platform hooks build this from the OS data they receive and pass it to
/// [`structured::dispatch`](crate::interceptor::structured::dispatch). The
/// portable fields (code, addresses, thread) are extracted once at
/// construction; [`FaultContext::raw`] gives access to the full OS structure.
#[derive(Debug)]
pub struct FaultContext<'a>
{
    code: FaultCode,
    instruction_address: Address,
    stack_pointer: Address,
    fault_address: Option<Address>,
    thread_id: ThreadId,
    raw: RawContext<'a>,
    _borrow: PhantomData<&'a ()>,
}

impl FaultContext<'static>
{
    /// Context without OS data
    ///
    /// Used for on-demand snapshots and for driving the dispatch path in
    /// tests. The thread is the calling thread.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use faultline_core::failure::FaultContext;
    /// use faultline_core::types::{Address, FaultCode};
    ///
    /// let ctx = FaultContext::synthetic(FaultCode::BREAKPOINT, Address::ZERO);
    /// assert_eq!(ctx.code(), FaultCode::BREAKPOINT);
    /// ```
    pub fn synthetic(code: FaultCode, instruction_address: Address) -> Self
    {
        FaultContext::new(code, instruction_address, Address::ZERO, None, RawContext::Synthetic)
    }
}

impl<'a> FaultContext<'a>
{
    pub(crate) fn new(
        code: FaultCode,
        instruction_address: Address,
        stack_pointer: Address,
        fault_address: Option<Address>,
        raw: RawContext<'a>,
    ) -> Self
    {
        Self {
            code,
            instruction_address,
            stack_pointer,
            fault_address,
            thread_id: ThreadId::current(),
            raw,
            _borrow: PhantomData,
        }
    }

    /// Classification of the fault
    pub fn code(&self) -> FaultCode
    {
        self.code
    }

    /// Address of the faulting instruction
    pub fn instruction_address(&self) -> Address
    {
        self.instruction_address
    }

    /// Stack pointer at the time of the fault (zero if unknown)
    pub fn stack_pointer(&self) -> Address
    {
        self.stack_pointer
    }

    /// Data address involved in the fault, for memory faults
    pub fn fault_address(&self) -> Option<Address>
    {
        self.fault_address
    }

    /// Thread the fault was delivered on
    pub fn thread_id(&self) -> ThreadId
    {
        self.thread_id
    }

    /// The OS structures this context was built from
    pub fn raw(&self) -> &RawContext<'a>
    {
        &self.raw
    }
}

/// Structured description of one fault occurrence
///
/// Immutable once built. The module name is resolved exactly once, at
/// construction, from the context's instruction address.
#[derive(Debug, Clone, Copy)]
pub struct FailureRecord<'a>
{
    code: FaultCode,
    module_name: ModuleName,
    context: Option<&'a FaultContext<'a>>,
}

impl FailureRecord<'static>
{
    /// Record without a fault context
    ///
    /// The module name is empty.
    pub fn from_code(code: FaultCode) -> Self
    {
        Self {
            code,
            module_name: ModuleName::EMPTY,
            context: None,
        }
    }

    pub(crate) fn with_module(code: FaultCode, module_name: ModuleName) -> Self
    {
        Self {
            code,
            module_name,
            context: None,
        }
    }
}

impl<'a> FailureRecord<'a>
{
    /// Build a record for a captured fault
    ///
    /// Returns `None` for [pass-through](FaultCode::is_pass_through) codes,
    /// which are ordinary unwinding rather than faults.
    pub fn from_context(context: &'a FaultContext<'a>) -> Option<Self>
    {
        if context.code().is_pass_through() {
            return None;
        }

        Some(Self {
            code: context.code(),
            module_name: ModuleResolver::resolve(context.instruction_address()),
            context: Some(context),
        })
    }

    /// Classification code
    pub fn code(&self) -> FaultCode
    {
        self.code
    }

    /// Human readable title for [`code`](Self::code)
    pub fn title(&self) -> &'static str
    {
        self.code.title()
    }

    /// Short file name of the module containing the faulting instruction
    ///
    /// Empty when there is no context or no module contains the address.
    pub fn module_name(&self) -> &ModuleName
    {
        &self.module_name
    }

    /// The borrowed OS fault context, if this record was captured by a hook
    pub fn context(&self) -> Option<&'a FaultContext<'a>>
    {
        self.context
    }

    /// Copy of this record without the borrowed context
    ///
    /// Keeps code and module name; the result may outlive the hook.
    pub fn detach(&self) -> FailureRecord<'static>
    {
        FailureRecord::with_module(self.code, self.module_name)
    }
}

impl fmt::Display for FailureRecord<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.module_name.is_empty() {
            write!(f, "{} ({})", self.title(), self.code)
        } else {
            write!(f, "{} ({}) in {}", self.title(), self.code, self.module_name)
        }
    }
}
