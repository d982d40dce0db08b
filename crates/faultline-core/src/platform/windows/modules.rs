//! # Windows Module Enumeration
//!
//! `K32EnumProcessModules` into a fixed array of [`MODULE_CAPACITY`] handles,
//! then `K32GetModuleInformation` and `GetModuleFileNameW` per module.

use std::ffi::{c_void, OsString};
use std::mem;
use std::ops::ControlFlow;
use std::os::windows::ffi::OsStringExt;
use std::path::PathBuf;

use windows_sys::Win32::Foundation::HMODULE;
use windows_sys::Win32::System::LibraryLoader::GetModuleFileNameW;
use windows_sys::Win32::System::ProcessStatus::{K32EnumProcessModules, K32GetModuleInformation, MODULEINFO};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

use crate::resolver::{ModuleEntry, MODULE_CAPACITY};
use crate::types::Address;

const MAX_PATH_UNITS: usize = 32 * 1024;

pub(crate) fn for_each_module(visit: &mut dyn FnMut(&ModuleEntry<'_>) -> ControlFlow<()>) -> Option<usize>
{
    let mut handles: [HMODULE; MODULE_CAPACITY] = [std::ptr::null_mut(); MODULE_CAPACITY];
    let mut needed = 0u32;

    // SAFETY: the buffer size passed matches `handles`
    let process = unsafe { GetCurrentProcess() };
    let ok = unsafe {
        K32EnumProcessModules(
            process,
            handles.as_mut_ptr(),
            mem::size_of_val(&handles) as u32,
            &mut needed,
        )
    };
    if ok == 0 {
        return None;
    }

    let total = needed as usize / mem::size_of::<HMODULE>();
    for module in handles.iter().take(total.min(MODULE_CAPACITY)) {
        let mut info = MODULEINFO {
            lpBaseOfDll: std::ptr::null_mut(),
            SizeOfImage: 0,
            EntryPoint: std::ptr::null_mut(),
        };
        // SAFETY: `module` was returned by K32EnumProcessModules
        let ok = unsafe { K32GetModuleInformation(process, *module, &mut info, mem::size_of::<MODULEINFO>() as u32) };
        if ok == 0 {
            continue;
        }

        let path = module_path(*module);
        let entry = ModuleEntry {
            base: Address::from_ptr(info.lpBaseOfDll as *const c_void),
            size: u64::from(info.SizeOfImage),
            path: &path,
        };
        if visit(&entry).is_break() {
            break;
        }
    }

    Some(total)
}

/// Nothing to cache: paths are read per lookup
pub(crate) fn warm_up_modules() {}

fn module_path(module: HMODULE) -> PathBuf
{
    let mut buf = vec![0u16; 260];
    loop {
        // SAFETY: the length passed matches `buf`
        let len = unsafe { GetModuleFileNameW(module, buf.as_mut_ptr(), buf.len() as u32) } as usize;
        if len == 0 {
            return PathBuf::new();
        }
        // A full buffer means the path was truncated
        if len < buf.len() || buf.len() >= MAX_PATH_UNITS {
            buf.truncate(len);
            return PathBuf::from(OsString::from_wide(&buf));
        }
        buf.resize(buf.len() * 2, 0);
    }
}
