//! Snapshots through `MiniDumpWriteDump`.
//!
//! See: [MiniDumpWriteDump](https://learn.microsoft.com/en-us/windows/win32/api/minidumpapiset/nf-minidumpapiset-minidumpwritedump)

use std::fs::File;
use std::io;
use std::os::windows::io::AsRawHandle;
use std::ptr;

use windows_sys::Win32::System::Diagnostics::Debug::{
    MiniDumpWithDataSegs, MiniDumpWithFullMemoryInfo, MiniDumpWithHandleData, MiniDumpWithPrivateReadWriteMemory,
    MiniDumpWithThreadInfo, MiniDumpWriteDump, EXCEPTION_POINTERS, MINIDUMP_EXCEPTION_INFORMATION, MINIDUMP_TYPE,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, GetCurrentProcessId, GetCurrentThreadId};

use crate::failure::{FailureRecord, RawContext};

const DUMP_TYPE: MINIDUMP_TYPE = MiniDumpWithPrivateReadWriteMemory
    | MiniDumpWithDataSegs
    | MiniDumpWithHandleData
    | MiniDumpWithFullMemoryInfo
    | MiniDumpWithThreadInfo;

pub(crate) fn write_snapshot(file: &File, record: &FailureRecord<'_>) -> io::Result<()>
{
    let pointers = record.context().and_then(|ctx| match ctx.raw() {
        RawContext::Exception(pointers) => Some(*pointers),
        _ => None,
    });

    // SAFETY: no preconditions
    let thread_id = unsafe { GetCurrentThreadId() };
    let exception = pointers.map(|pointers| MINIDUMP_EXCEPTION_INFORMATION {
        ThreadId: thread_id,
        ExceptionPointers: pointers as *const EXCEPTION_POINTERS as *mut EXCEPTION_POINTERS,
        ClientPointers: 0,
    });
    let exception_param = exception
        .as_ref()
        .map_or(ptr::null(), |info| info as *const MINIDUMP_EXCEPTION_INFORMATION);

    // SAFETY: all pointers are valid or null for the duration of the call;
    // the file handle is open for writing
    let ok = unsafe {
        MiniDumpWriteDump(
            GetCurrentProcess(),
            GetCurrentProcessId(),
            file.as_raw_handle(),
            DUMP_TYPE,
            exception_param,
            ptr::null(),
            ptr::null(),
        )
    };

    if ok == 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
}
