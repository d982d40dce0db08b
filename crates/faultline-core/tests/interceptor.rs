//! Tests for hook installation, dispatch and teardown
//!
//! Hooks are process-global, so every test here runs serially.

use std::sync::atomic::{AtomicUsize, Ordering};

use faultline_core::failure::FaultContext;
use faultline_core::interceptor::structured::{self, Dispatch};
use faultline_core::interceptor::{contract, pure_call, FaultInterceptor, TerminationKind};
use faultline_core::types::{Address, FaultCode};
use serial_test::serial;

#[test]
#[serial]
fn test_pass_through_is_not_reported()
{
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    let mut interceptor = FaultInterceptor::new();
    interceptor.on_failure(|_| {
        CALLS.fetch_add(1, Ordering::SeqCst);
    });
    assert!(interceptor.is_armed());

    let ctx = FaultContext::synthetic(FaultCode::UNWIND_PASS_THROUGH, Address::ZERO);
    assert_eq!(structured::dispatch(&ctx), Dispatch::PassedThrough);
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);

    let ctx = FaultContext::synthetic(FaultCode::ACCESS_VIOLATION, Address::ZERO);
    assert_eq!(structured::dispatch(&ctx), Dispatch::Reported);
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn test_rearm_replaces_callback()
{
    static FIRST: AtomicUsize = AtomicUsize::new(0);
    static SECOND: AtomicUsize = AtomicUsize::new(0);

    let mut interceptor = FaultInterceptor::new();
    interceptor.on_failure(|_| {
        FIRST.fetch_add(1, Ordering::SeqCst);
    });
    interceptor.on_failure(|_| {
        SECOND.fetch_add(1, Ordering::SeqCst);
    });

    let ctx = FaultContext::synthetic(FaultCode::ILLEGAL_INSTRUCTION, Address::ZERO);
    structured::dispatch(&ctx);
    assert_eq!(FIRST.load(Ordering::SeqCst), 0);
    assert_eq!(SECOND.load(Ordering::SeqCst), 1);

    drop(interceptor);
    assert!(!structured::is_armed());
    assert_eq!(structured::dispatch(&ctx), Dispatch::Unreported);
}

#[test]
#[serial]
fn test_uninstall_clears_every_hook()
{
    let mut interceptor = FaultInterceptor::new();
    interceptor
        .on_failure(|_| {})
        .on_pure_call(|| {})
        .on_invalid_parameter()
        .on_terminate(|_| {});

    assert!(structured::is_armed());
    assert!(contract::is_installed());
    assert_eq!(pure_call::dispatch().map(|t| t.kind()), Some(TerminationKind::PureCall));

    interceptor.uninstall();
    assert!(!structured::is_armed());
    assert!(!contract::is_installed());
    assert!(pure_call::dispatch().is_none());
}

#[test]
#[serial]
fn test_invalid_parameter_is_catchable()
{
    let mut interceptor = FaultInterceptor::new();
    interceptor.on_invalid_parameter();

    let err = contract::catch(|| contract::ensure(false, "strlen", "str != NULL")).unwrap_err();
    assert_eq!(err.failure().code(), FaultCode::INVALID_PARAMETER);
    assert_eq!(err.failure().title(), "Invalid parameter");
    assert_eq!(err.to_string(), "Invalid parameter for 'strlen', str != NULL");
}

static VIOLATION_REPORTS: AtomicUsize = AtomicUsize::new(0);

fn count_violation_reports()
{
    std::panic::set_hook(Box::new(|info| {
        if info.payload().is::<contract::ThreadError>() {
            VIOLATION_REPORTS.fetch_add(1, Ordering::SeqCst);
        }
    }));
    VIOLATION_REPORTS.store(0, Ordering::SeqCst);
}

fn violate()
{
    let _ = contract::catch(|| contract::invalid_parameter("fopen", "mode != NULL"));
}

#[test]
#[serial]
fn test_uninstall_restores_application_panic_hook()
{
    count_violation_reports();

    contract::install();
    violate();
    assert_eq!(VIOLATION_REPORTS.load(Ordering::SeqCst), 0);

    contract::uninstall();
    violate();
    assert_eq!(VIOLATION_REPORTS.load(Ordering::SeqCst), 1);

    drop(std::panic::take_hook());
}

#[test]
#[serial]
fn test_hook_set_between_installs_is_wrapped()
{
    contract::install();
    contract::uninstall();

    count_violation_reports();
    contract::install();
    assert!(contract::is_installed());
    violate();
    assert_eq!(VIOLATION_REPORTS.load(Ordering::SeqCst), 0);

    contract::uninstall();
    violate();
    assert_eq!(VIOLATION_REPORTS.load(Ordering::SeqCst), 1);

    drop(std::panic::take_hook());
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod signals
{
    use std::{mem, ptr};

    use super::*;

    static THIRD_PARTY: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn third_party_handler(_signal: libc::c_int, _info: *mut libc::siginfo_t, _context: *mut libc::c_void)
    {
        THIRD_PARTY.fetch_add(1, Ordering::SeqCst);
    }

    fn install_third_party() -> libc::sigaction
    {
        // SAFETY: a zeroed sigaction is a valid starting point
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        action.sa_sigaction = third_party_handler as usize;
        action.sa_flags = libc::SA_SIGINFO;
        let mut previous: libc::sigaction = unsafe { mem::zeroed() };
        assert_eq!(unsafe { libc::sigaction(libc::SIGTRAP, &action, &mut previous) }, 0);
        previous
    }

    fn current_trap_handler() -> usize
    {
        let mut current: libc::sigaction = unsafe { mem::zeroed() };
        assert_eq!(unsafe { libc::sigaction(libc::SIGTRAP, ptr::null(), &mut current) }, 0);
        current.sa_sigaction
    }

    #[test]
    #[serial]
    fn test_teardown_restores_third_party_handler()
    {
        let original = install_third_party();

        let mut interceptor = FaultInterceptor::new();
        interceptor.on_failure(|_| {});
        assert_ne!(current_trap_handler(), third_party_handler as usize);

        interceptor.on_failure(|_| {});
        drop(interceptor);
        assert_eq!(current_trap_handler(), third_party_handler as usize);

        unsafe { libc::sigaction(libc::SIGTRAP, &original, ptr::null_mut()) };
    }

    #[test]
    #[serial]
    fn test_breakpoint_reaches_callback_then_previous_handler()
    {
        static REPORTED: AtomicUsize = AtomicUsize::new(0);

        let original = install_third_party();
        THIRD_PARTY.store(0, Ordering::SeqCst);

        let mut interceptor = FaultInterceptor::new();
        interceptor.on_failure(|record| {
            assert_eq!(record.title(), "Breakpoint");
            REPORTED.fetch_add(1, Ordering::SeqCst);
        });

        unsafe { libc::raise(libc::SIGTRAP) };

        assert_eq!(REPORTED.load(Ordering::SeqCst), 1);
        assert_eq!(THIRD_PARTY.load(Ordering::SeqCst), 1);

        drop(interceptor);
        unsafe { libc::sigaction(libc::SIGTRAP, &original, ptr::null_mut()) };
    }
}
