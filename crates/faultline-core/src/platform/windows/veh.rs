//! Vectored exception handler.
//!
//! Registered with "call first" priority so it sees every structured
//! exception before frame-based handlers get a chance to swallow it. It only
//! observes: the result is always `EXCEPTION_CONTINUE_SEARCH`.
//!
//! See: [AddVectoredExceptionHandler](https://learn.microsoft.com/en-us/windows/win32/api/errhandlingapi/nf-errhandlingapi-addvectoredexceptionhandler)

use std::ffi::c_void;

use tracing::debug;
use windows_sys::Win32::System::Diagnostics::Debug::{
    AddVectoredExceptionHandler, RemoveVectoredExceptionHandler, EXCEPTION_POINTERS, EXCEPTION_RECORD,
};
use windows_sys::Win32::System::Threading::SetThreadStackGuarantee;

use crate::error::{FaultlineError, FaultlineResult, PlatformError};
use crate::failure::{FaultContext, RawContext};
use crate::interceptor::structured;
use crate::types::{Address, FaultCode};

const CALL_FIRST: u32 = 1;
const EXCEPTION_CONTINUE_SEARCH: i32 = 0;

/// Stack kept in reserve for the handler when a thread overflows its stack
pub const STACK_GUARANTEE: u32 = 64 * 1024;

/// Process-wide vectored exception handler registration
#[derive(Debug)]
pub struct VectoredHook
{
    handle: usize,
}

impl VectoredHook
{
    /// Register the handler
    ///
    /// ## Errors
    ///
    /// - `Platform`: the registration was refused
    pub fn arm() -> FaultlineResult<Self>
    {
        // SAFETY: the handler is a plain function with the expected ABI
        let handle = unsafe { AddVectoredExceptionHandler(CALL_FIRST, Some(handle_exception)) };
        if handle.is_null() {
            return Err(FaultlineError::Platform(PlatformError::last_os_error()));
        }

        reserve_overflow_stack();
        debug!("vectored exception handler installed");
        Ok(Self { handle: handle as usize })
    }
}

impl Drop for VectoredHook
{
    fn drop(&mut self)
    {
        // SAFETY: the handle came from AddVectoredExceptionHandler
        unsafe {
            RemoveVectoredExceptionHandler(self.handle as *const c_void);
        }
        debug!("vectored exception handler removed");
    }
}

/// Keep [`STACK_GUARANTEE`] bytes available to the calling thread's handlers
/// after a stack overflow
pub fn reserve_overflow_stack()
{
    let mut size = STACK_GUARANTEE;
    // SAFETY: in/out parameter
    unsafe {
        SetThreadStackGuarantee(&mut size);
    }
}

unsafe extern "system" fn handle_exception(pointers: *mut EXCEPTION_POINTERS) -> i32
{
    // SAFETY: the OS passes valid pointers for the duration of the call
    let Some(pointers) = (unsafe { pointers.as_ref() }) else {
        return EXCEPTION_CONTINUE_SEARCH;
    };
    let Some(record) = (unsafe { pointers.ExceptionRecord.as_ref() }) else {
        return EXCEPTION_CONTINUE_SEARCH;
    };

    let context = from_exception(pointers, record);
    structured::dispatch(&context);
    EXCEPTION_CONTINUE_SEARCH
}

fn from_exception<'a>(pointers: &'a EXCEPTION_POINTERS, record: &EXCEPTION_RECORD) -> FaultContext<'a>
{
    let code = FaultCode::new(record.ExceptionCode as u32);
    let ip = Address::from_ptr(record.ExceptionAddress);

    // For access violations and in-page errors the second parameter is the
    // data address
    let fault_address = match code {
        FaultCode::ACCESS_VIOLATION | FaultCode::IN_PAGE_ERROR if record.NumberParameters >= 2 => {
            Some(Address::from(record.ExceptionInformation[1]))
        }
        _ => None,
    };

    FaultContext::new(code, ip, stack_pointer(pointers), fault_address, RawContext::Exception(pointers))
}

fn stack_pointer(pointers: &EXCEPTION_POINTERS) -> Address
{
    // SAFETY: ContextRecord is valid alongside ExceptionRecord
    let Some(context) = (unsafe { pointers.ContextRecord.as_ref() }) else {
        return Address::ZERO;
    };

    #[cfg(target_arch = "x86_64")]
    {
        Address::new(context.Rsp)
    }

    #[cfg(target_arch = "aarch64")]
    {
        Address::new(context.Sp)
    }

    #[cfg(target_arch = "x86")]
    {
        Address::new(u64::from(context.Esp))
    }
}
