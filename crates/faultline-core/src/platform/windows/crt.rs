//! C runtime hooks: pure virtual calls and invalid parameters.
//!
//! Both handlers are process-wide CRT state. Installing returns a guard that
//! puts the previous handler back when dropped.
//!
//! See: [_set_purecall_handler](https://learn.microsoft.com/en-us/cpp/c-runtime-library/reference/get-purecall-handler-set-purecall-handler),
//! [_set_invalid_parameter_handler](https://learn.microsoft.com/en-us/cpp/c-runtime-library/reference/set-invalid-parameter-handler-set-thread-local-invalid-parameter-handler)

use tracing::debug;

use crate::interceptor::{contract, pure_call};

type PurecallHandler = Option<unsafe extern "C" fn()>;
type InvalidParameterHandler = Option<unsafe extern "C-unwind" fn(*const u16, *const u16, *const u16, u32, usize)>;

extern "C" {
    fn _set_purecall_handler(handler: PurecallHandler) -> PurecallHandler;
    fn _set_invalid_parameter_handler(handler: InvalidParameterHandler) -> InvalidParameterHandler;
    fn _purecall() -> i32;
}

/// Routes CRT pure virtual call errors to the registered callback
#[derive(Debug)]
pub struct PureCallHook
{
    previous: PurecallHandler,
}

impl PureCallHook
{
    pub fn arm() -> Self
    {
        // SAFETY: swaps a function pointer in CRT state
        let previous = unsafe { _set_purecall_handler(Some(pure_call_dispatcher)) };
        debug!("purecall handler installed");
        Self { previous }
    }
}

impl Drop for PureCallHook
{
    fn drop(&mut self)
    {
        // SAFETY: restores the pointer we replaced
        unsafe {
            _set_purecall_handler(self.previous);
        }
    }
}

unsafe extern "C" fn pure_call_dispatcher()
{
    match pure_call::dispatch() {
        Some(termination) => termination.exit(),
        None => std::process::abort(),
    }
}

/// Invoke the CRT's pure virtual call error path
pub fn raise_pure_call() -> !
{
    // SAFETY: _purecall calls the installed handler, then aborts
    unsafe {
        _purecall();
    }
    std::process::abort()
}

/// Turns CRT invalid-parameter reports into
/// [`contract::invalid_parameter`] unwinds
#[derive(Debug)]
pub struct InvalidParameterHook
{
    previous: InvalidParameterHandler,
}

impl InvalidParameterHook
{
    pub fn arm() -> Self
    {
        // SAFETY: swaps a function pointer in CRT state
        let previous = unsafe { _set_invalid_parameter_handler(Some(invalid_parameter_dispatcher)) };
        debug!("invalid parameter handler installed");
        Self { previous }
    }
}

impl Drop for InvalidParameterHook
{
    fn drop(&mut self)
    {
        // SAFETY: restores the pointer we replaced
        unsafe {
            _set_invalid_parameter_handler(self.previous);
        }
    }
}

unsafe extern "C-unwind" fn invalid_parameter_dispatcher(
    expression: *const u16,
    function: *const u16,
    _file: *const u16,
    _line: u32,
    _reserved: usize,
)
{
    // Release builds of the CRT pass null for all strings
    let function = unsafe { wide_to_string(function) };
    let expression = unsafe { wide_to_string(expression) };
    contract::invalid_parameter(&function, &expression)
}

/// Copy a NUL-terminated UTF-16 string; null yields an empty string
unsafe fn wide_to_string(ptr: *const u16) -> String
{
    if ptr.is_null() {
        return String::new();
    }

    let mut len = 0;
    // SAFETY: the CRT passes NUL-terminated strings
    while unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    let units = unsafe { std::slice::from_raw_parts(ptr, len) };
    String::from_utf16_lossy(units)
}
