//! # Linux Module Enumeration
//!
//! Walks the dynamic loader's list of loaded objects with
//! `dl_iterate_phdr(3)`.
//!
//! A module's extent is the span of its `PT_LOAD` segments, relocated by the
//! load bias (`dlpi_addr`). The loader reports the main executable with an
//! empty name, so it is named after `/proc/self/exe` instead; that path is
//! cached on first use (see [`warm_up_modules`]) so a crashing thread does
//! not have to allocate.
//!
//! See: [dl_iterate_phdr(3) man page](https://man7.org/linux/man-pages/man3/dl_iterate_phdr.3.html)

use std::ffi::{CStr, OsStr};
use std::ops::ControlFlow;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use libc::{c_int, c_void, dl_phdr_info, size_t};
use once_cell::sync::Lazy;

use crate::resolver::{ModuleEntry, MODULE_CAPACITY};
use crate::types::Address;

static EXECUTABLE: Lazy<PathBuf> = Lazy::new(|| std::env::current_exe().unwrap_or_default());

struct Walk<'v>
{
    visit: &'v mut dyn FnMut(&ModuleEntry<'_>) -> ControlFlow<()>,
    seen: usize,
}

/// Visit up to [`MODULE_CAPACITY`] loaded modules
///
/// Returns the number of modules the loader reported (which may exceed the
/// capacity), or `None` if enumeration did not run.
pub(crate) fn for_each_module(visit: &mut dyn FnMut(&ModuleEntry<'_>) -> ControlFlow<()>) -> Option<usize>
{
    let mut walk = Walk { visit, seen: 0 };

    // SAFETY: the callback only runs during this call, while `walk` is alive
    unsafe {
        libc::dl_iterate_phdr(Some(visit_object), std::ptr::addr_of_mut!(walk).cast::<c_void>());
    }

    Some(walk.seen)
}

/// Resolve the executable path ahead of any fault
pub(crate) fn warm_up_modules()
{
    Lazy::force(&EXECUTABLE);
}

unsafe extern "C" fn visit_object(info: *mut dl_phdr_info, _size: size_t, data: *mut c_void) -> c_int
{
    // SAFETY: `data` is the `Walk` passed by `for_each_module`; `info` is
    // valid for the duration of the callback
    let walk = unsafe { &mut *data.cast::<Walk<'_>>() };
    let Some(info) = (unsafe { info.as_ref() }) else {
        return 0;
    };

    walk.seen += 1;
    if walk.seen > MODULE_CAPACITY {
        // Keep counting so callers learn the list was truncated
        return 0;
    }

    let Some((low, high)) = (unsafe { load_extent(info) }) else {
        return 0;
    };

    let name = if info.dlpi_name.is_null() {
        &[][..]
    } else {
        // SAFETY: the loader hands out NUL-terminated names
        unsafe { CStr::from_ptr(info.dlpi_name) }.to_bytes()
    };
    let path = if name.is_empty() {
        EXECUTABLE.as_path()
    } else {
        Path::new(OsStr::from_bytes(name))
    };

    #[allow(clippy::useless_conversion)]
    let bias = u64::from(info.dlpi_addr);
    let entry = ModuleEntry {
        base: Address::new(bias.wrapping_add(low)),
        size: high - low,
        path,
    };

    match (walk.visit)(&entry) {
        ControlFlow::Continue(()) => 0,
        ControlFlow::Break(()) => 1,
    }
}

/// Lowest and highest (exclusive) unrelocated address of the `PT_LOAD`
/// segments, or `None` for objects without any
unsafe fn load_extent(info: &dl_phdr_info) -> Option<(u64, u64)>
{
    if info.dlpi_phdr.is_null() || info.dlpi_phnum == 0 {
        return None;
    }

    // SAFETY: the loader guarantees `dlpi_phnum` headers at `dlpi_phdr`
    let headers = unsafe { std::slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum)) };

    #[allow(clippy::useless_conversion)]
    let extent = headers
        .iter()
        .filter(|header| header.p_type == libc::PT_LOAD)
        .map(|header| {
            let start = u64::from(header.p_vaddr);
            (start, start.saturating_add(u64::from(header.p_memsz)))
        })
        .fold(None, |acc: Option<(u64, u64)>, (start, end)| match acc {
            Some((low, high)) => Some((low.min(start), high.max(end))),
            None => Some((start, end)),
        });

    extent.filter(|(low, high)| high > low)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_enumeration_includes_executable()
    {
        warm_up_modules();

        let mut names = Vec::new();
        let total = for_each_module(&mut |entry| {
            names.push(entry.path.to_path_buf());
            ControlFlow::Continue(())
        });

        assert!(total.is_some_and(|count| count >= names.len()));
        assert!(names.iter().any(|path| path == EXECUTABLE.as_path()));
    }

    #[test]
    fn test_break_stops_enumeration()
    {
        let mut visited = 0;
        for_each_module(&mut |_| {
            visited += 1;
            ControlFlow::Break(())
        });
        assert_eq!(visited, 1);
    }
}
