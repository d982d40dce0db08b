//! Process, thread, memory region and architecture types.

use std::fmt;

use super::Address;

/// Process identifier (PID)
///
/// ## Example
///
/// ```rust
/// use faultline_core::types::ProcessId;
///
/// let pid = ProcessId::current();
/// assert_eq!(pid.0, std::process::id());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl ProcessId
{
    /// PID of the running process
    pub fn current() -> Self
    {
        ProcessId(std::process::id())
    }
}

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

/// Operating system thread identifier
///
/// The exact representation is platform-specific:
///
/// - **Linux**: kernel thread ID (TID), as returned by `gettid(2)`
/// - **Windows**: thread ID from `GetCurrentThreadId()`
///
/// Minidumps store thread IDs as 32-bit values; [`ThreadId::as_u32`] performs
/// that narrowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// ID of the calling thread
    ///
    /// Safe to call from a signal handler on Linux (a single raw syscall).
    pub fn current() -> Self
    {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            // SAFETY: gettid takes no arguments and cannot fail
            let tid = unsafe { libc::syscall(libc::SYS_gettid) };
            ThreadId(tid as u64)
        }

        #[cfg(windows)]
        {
            // SAFETY: no preconditions
            let tid = unsafe { windows_sys::Win32::System::Threading::GetCurrentThreadId() };
            ThreadId(u64::from(tid))
        }

        #[cfg(not(any(target_os = "linux", target_os = "android", windows)))]
        {
            ThreadId(0)
        }
    }

    /// Get the raw `u64` representation of the thread identifier
    ///
    /// ## Example
    ///
    /// ```rust
    /// use faultline_core::types::ThreadId;
    ///
    /// let thread = ThreadId::from(12345);
    /// assert_eq!(thread.raw(), 12345);
    /// ```
    pub fn raw(&self) -> u64
    {
        self.0
    }

    /// The identifier narrowed to the 32 bits minidump streams store
    pub fn as_u32(&self) -> u32
    {
        self.0 as u32
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Identifier for memory regions
///
/// Assigned sequentially (0, 1, 2, ...) in the order regions are enumerated.
/// Stable only within one enumeration: mapping or unmapping memory shifts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRegionId(pub usize);

impl MemoryRegionId
{
    /// Get the raw `usize` value of this memory region identifier
    pub fn value(self) -> usize
    {
        self.0
    }
}

/// Memory region in the current process
///
/// One line of `/proc/self/maps` on Linux. Snapshots use these to describe
/// the address space and to pick which memory to capture.
///
/// ## Examples
///
/// ```
/// use faultline_core::types::{Address, MemoryRegion, MemoryRegionId};
///
/// let heap = MemoryRegion::new(
///     MemoryRegionId(1),
///     Address::new(0x2000),
///     Address::new(0x3000),
///     "rw-p".to_string(),
///     Some("[heap]".to_string()),
/// );
/// assert!(heap.is_writable());
/// assert!(heap.is_private());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion
{
    /// Stable identifier for the region.
    pub id: MemoryRegionId,
    /// Start address of the memory region (inclusive)
    pub start: Address,

    /// End address of the memory region (exclusive)
    pub end: Address,

    /// Memory permissions as a string
    ///
    /// Same layout as `/proc/<pid>/maps`: `r`, `w`, `x` or `-` in the first
    /// three positions, then `p` (private, copy-on-write) or `s` (shared).
    pub permissions: String,

    /// Optional name/description of the region
    ///
    /// A file path for file-backed mappings, `[heap]`, `[stack]`, `[vdso]`
    /// and so on for special ones, `None` for anonymous memory.
    pub name: Option<String>,
}

impl MemoryRegion
{
    /// Create a new memory region
    ///
    /// ## Parameters
    ///
    /// - `start`: Start address of the region (inclusive)
    /// - `end`: End address of the region (exclusive)
    /// - `permissions`: Permission string (e.g., `"r-xp"`, `"rw-s"`)
    /// - `name`: Optional name/description of the region
    pub fn new(id: MemoryRegionId, start: Address, end: Address, permissions: String, name: Option<String>) -> Self
    {
        Self {
            id,
            start,
            end,
            permissions,
            name,
        }
    }

    /// Get the size of the memory region in bytes
    ///
    /// Returns 0 if `end <= start`.
    pub fn size(&self) -> u64
    {
        self.end.value().saturating_sub(self.start.value())
    }

    /// Check whether `address` falls inside `[start, end)`
    pub fn contains(&self, address: Address) -> bool
    {
        address.within(self.start, self.size())
    }

    /// Returns `true` if the permissions string contains `'r'`.
    pub fn is_readable(&self) -> bool
    {
        self.permissions.contains('r')
    }

    /// Returns `true` if the permissions string contains `'w'`.
    pub fn is_writable(&self) -> bool
    {
        self.permissions.contains('w')
    }

    /// Returns `true` if the permissions string contains `'x'`.
    pub fn is_executable(&self) -> bool
    {
        self.permissions.contains('x')
    }

    /// Returns `true` for private (copy-on-write) mappings
    pub fn is_private(&self) -> bool
    {
        self.permissions.ends_with('p')
    }

    /// Whether this region backs a file on disk (as opposed to anonymous or
    /// kernel-provided memory such as `[heap]` or `[vdso]`)
    pub fn is_file_backed(&self) -> bool
    {
        self.name.as_deref().is_some_and(|name| name.starts_with('/'))
    }
}

/// CPU architecture of the running process
///
/// Decides which CPU context layout is written into snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture
{
    /// 64-bit ARM (AArch64)
    ///
    /// See: [ARM64 Architecture Reference Manual](https://developer.arm.com/documentation/ddi0487/latest)
    Arm64,
    /// 64-bit x86 (Intel/AMD)
    ///
    /// See: [Intel 64 and IA-32 Architectures Software Developer's Manual](https://www.intel.com/content/www/us/en/developer/articles/technical/intel-sdm.html)
    X86_64,
    /// Any other architecture
    ///
    /// The `&'static str` contains the architecture name (e.g., "riscv64").
    /// Snapshots for these are written without a CPU context.
    Unknown(&'static str),
}

impl Architecture
{
    /// Architecture this crate was compiled for
    ///
    /// ## Example
    ///
    /// ```rust
    /// use faultline_core::types::Architecture;
    ///
    /// let arch = Architecture::current();
    /// println!("running on {arch}");
    /// ```
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }

        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }

        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
        {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Unknown(name) => write!(f, "{name}"),
        }
    }
}
