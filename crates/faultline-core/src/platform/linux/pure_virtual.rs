//! Pure virtual call hook.
//!
//! The Itanium C++ ABI fills unimplemented vtable slots with
//! `__cxa_pure_virtual`. Exporting our own definition from the executable
//! takes precedence over the one in a dynamically linked `libstdc++`, so
//! C++ code linked into the process reaches
//! [`pure_call::dispatch`](crate::interceptor::pure_call::dispatch).
//!
//! Only built with the `cxx-pure-virtual` feature: a statically linked C++
//! runtime would define the symbol twice.

use crate::interceptor::pure_call;

/// Called by C++ code through an unimplemented vtable slot
#[no_mangle]
pub extern "C" fn __cxa_pure_virtual()
{
    match pure_call::dispatch() {
        Some(termination) => termination.exit(),
        None => {
            eprintln!("pure virtual method called");
            std::process::abort();
        }
    }
}
