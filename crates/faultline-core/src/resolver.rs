//! # Module Resolution
//!
//! Maps a code address to the short file name of the loaded module (the
//! executable or a shared library) whose image contains it.
//!
//! Enumeration is bounded: at most [`MODULE_CAPACITY`] modules are examined.
//! Processes with more modules get a best-effort answer, and
//! [`ModuleList::is_truncated`] tells callers when that happened.
//!
//! ## Platform Support
//!
//! - **Linux**: `dl_iterate_phdr(3)`; a module's extent is the span of its
//!   `PT_LOAD` segments. The main executable (reported with an empty name)
//!   is named after `/proc/self/exe`.
//! - **Windows**: `K32EnumProcessModules` + `K32GetModuleInformation`.
//!
//! ## Example
//!
//! ```rust
//! use faultline_core::resolver::ModuleResolver;
//! use faultline_core::types::Address;
//!
//! // Null is never inside a module
//! assert!(ModuleResolver::resolve(Address::ZERO).is_empty());
//! ```

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use crate::failure::ModuleName;
use crate::platform;
use crate::types::Address;

/// Maximum number of modules examined per enumeration
pub const MODULE_CAPACITY: usize = 512;

/// Borrowed view of one loaded module, handed to enumeration visitors
#[derive(Debug, Clone, Copy)]
pub struct ModuleEntry<'p>
{
    /// Lowest mapped address of the image
    pub base: Address,
    /// Size of the mapped image in bytes
    pub size: u64,
    /// Full path of the module file
    pub path: &'p Path,
}

/// One loaded module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo
{
    /// Lowest mapped address of the image
    pub base: Address,
    /// Size of the mapped image in bytes
    pub size: u64,
    /// Full path of the module file
    pub path: PathBuf,
}

impl ModuleInfo
{
    /// Whether `address` falls inside `[base, base + size)`
    pub fn contains(&self, address: Address) -> bool
    {
        address.within(self.base, self.size)
    }

    /// Short file name, as stored in failure records
    pub fn name(&self) -> ModuleName
    {
        ModuleName::from_path(&self.path)
    }

    /// One past the last mapped address
    pub fn end(&self) -> Address
    {
        self.base + self.size
    }
}

impl From<&ModuleEntry<'_>> for ModuleInfo
{
    fn from(entry: &ModuleEntry<'_>) -> Self
    {
        Self {
            base: entry.base,
            size: entry.size,
            path: entry.path.to_path_buf(),
        }
    }
}

/// Fixed-capacity snapshot of the loaded modules
#[derive(Debug, Clone, Default)]
pub struct ModuleList
{
    modules: Vec<ModuleInfo>,
    truncated: bool,
}

impl ModuleList
{
    /// Modules in enumeration order
    pub fn iter(&self) -> impl Iterator<Item = &ModuleInfo>
    {
        self.modules.iter()
    }

    /// Number of modules captured
    pub fn len(&self) -> usize
    {
        self.modules.len()
    }

    /// Whether the list is empty (enumeration failed or nothing is loaded)
    pub fn is_empty(&self) -> bool
    {
        self.modules.is_empty()
    }

    /// `true` when the process had more than [`MODULE_CAPACITY`] modules
    pub fn is_truncated(&self) -> bool
    {
        self.truncated
    }

    /// First module whose range contains `address`
    pub fn find(&self, address: Address) -> Option<&ModuleInfo>
    {
        self.modules.iter().find(|module| module.contains(address))
    }
}

impl<'a> IntoIterator for &'a ModuleList
{
    type Item = &'a ModuleInfo;
    type IntoIter = std::slice::Iter<'a, ModuleInfo>;

    fn into_iter(self) -> Self::IntoIter
    {
        self.modules.iter()
    }
}

/// Stateless address-to-module lookup
pub struct ModuleResolver;

impl ModuleResolver
{
    /// Short name of the module containing `address`
    ///
    /// Returns an empty name when enumeration fails or no module matches.
    /// Never fails and, on Linux, never allocates once the executable path
    /// has been cached by [`ModuleResolver::warm_up`].
    pub fn resolve(address: Address) -> ModuleName
    {
        let mut name = ModuleName::EMPTY;
        platform::for_each_module(&mut |entry: &ModuleEntry<'_>| {
            if address.within(entry.base, entry.size) {
                name = ModuleName::from_path(entry.path);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        name
    }

    /// Enumerate loaded modules into an owned list
    ///
    /// At most [`MODULE_CAPACITY`] entries are kept; the truncation flag is
    /// set when the process had more.
    pub fn loaded_modules() -> ModuleList
    {
        let mut modules = Vec::with_capacity(MODULE_CAPACITY);
        let total = platform::for_each_module(&mut |entry: &ModuleEntry<'_>| {
            modules.push(ModuleInfo::from(entry));
            ControlFlow::Continue(())
        });

        ModuleList {
            modules,
            truncated: total.is_some_and(|count| count > MODULE_CAPACITY),
        }
    }

    /// Cache anything resolution would otherwise compute lazily
    ///
    /// Called when the structured-fault hook is armed so the handler does not
    /// have to read `/proc/self/exe` while the process is crashing.
    pub fn warm_up()
    {
        platform::warm_up_modules();
    }
}
